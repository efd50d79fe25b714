// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::mpsc;

use ema_tools::EmaReply;

/// Terminal outcome of one agent run.  Exactly one is emitted per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    pub ok: bool,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunOutcome {
    pub fn success(msg: impl Into<String>) -> Self {
        Self {
            ok: true,
            msg: msg.into(),
            error: None,
        }
    }

    pub fn failure(msg: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            ok: false,
            msg: msg.into(),
            error: Some(error.into()),
        }
    }

    pub fn aborted() -> Self {
        Self::failure("Aborted", "Aborted")
    }
}

/// Events emitted by the agent during a run.
///
/// Serialises to the wire shape `{"type": "...", "content": ...}` consumed
/// by edge layers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "content", rename_all = "camelCase")]
pub enum AgentEvent {
    /// The run reached its terminal state.
    RunFinished(RunOutcome),
    /// The structured-reply tool succeeded; `reply` is the user-visible payload.
    EmaReplyReceived { reply: EmaReply },
    StepStarted {
        step: u32,
    },
    LlmResponseReceived {
        finish_reason: String,
        total_tokens: u64,
        tool_calls: usize,
    },
    ToolCallStarted {
        id: String,
        name: String,
    },
    ToolCallFinished {
        id: String,
        name: String,
        success: bool,
    },
    SummarizeMessagesStarted,
    SummarizeMessagesFinished {
        rounds: usize,
        fallback_rounds: usize,
        degraded_rounds: usize,
    },
    /// The token estimator fell back to the character heuristic.
    TokenEstimationFallbacked,
}

/// Events broadcast by an actor worker: plain messages plus the agent-side
/// set re-exported under the same tags.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "content", rename_all = "camelCase")]
pub enum ActorEvent {
    Message(String),
    RunFinished(RunOutcome),
    EmaReplyReceived { reply: EmaReply },
    StepStarted {
        step: u32,
    },
    LlmResponseReceived {
        finish_reason: String,
        total_tokens: u64,
        tool_calls: usize,
    },
    ToolCallStarted {
        id: String,
        name: String,
    },
    ToolCallFinished {
        id: String,
        name: String,
        success: bool,
    },
    SummarizeMessagesStarted,
    SummarizeMessagesFinished {
        rounds: usize,
        fallback_rounds: usize,
        degraded_rounds: usize,
    },
    TokenEstimationFallbacked,
}

impl From<AgentEvent> for ActorEvent {
    fn from(event: AgentEvent) -> Self {
        match event {
            AgentEvent::RunFinished(outcome) => Self::RunFinished(outcome),
            AgentEvent::EmaReplyReceived { reply } => Self::EmaReplyReceived { reply },
            AgentEvent::StepStarted { step } => Self::StepStarted { step },
            AgentEvent::LlmResponseReceived {
                finish_reason,
                total_tokens,
                tool_calls,
            } => Self::LlmResponseReceived {
                finish_reason,
                total_tokens,
                tool_calls,
            },
            AgentEvent::ToolCallStarted { id, name } => Self::ToolCallStarted { id, name },
            AgentEvent::ToolCallFinished { id, name, success } => {
                Self::ToolCallFinished { id, name, success }
            }
            AgentEvent::SummarizeMessagesStarted => Self::SummarizeMessagesStarted,
            AgentEvent::SummarizeMessagesFinished {
                rounds,
                fallback_rounds,
                degraded_rounds,
            } => Self::SummarizeMessagesFinished {
                rounds,
                fallback_rounds,
                degraded_rounds,
            },
            AgentEvent::TokenEstimationFallbacked => Self::TokenEstimationFallbacked,
        }
    }
}

/// Lifecycle state of one actor worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorStatus {
    Idle,
    Preparing,
    Running,
}

/// One broadcast to an actor subscriber: the current status plus the events
/// that happened since the previous broadcast to that subscriber.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActorSnapshot {
    pub status: ActorStatus,
    pub events: Vec<ActorEvent>,
}

pub type SubscriberId = u64;

/// Typed publish/subscribe with replay.
///
/// The bus keeps the full event log for its lifetime (bounded by session
/// length).  A new subscriber's channel is pre-loaded with every past event
/// before it sees live ones.  Delivery is in registration order; a closed
/// receiver is pruned and never blocks the others; subscriber code runs on
/// the receiving side of an unbounded channel, so nothing a subscriber does
/// can propagate back into the emitter.
pub struct EventBus<E> {
    inner: Mutex<BusInner<E>>,
}

struct BusInner<E> {
    log: Vec<E>,
    subscribers: Vec<(SubscriberId, mpsc::UnboundedSender<E>)>,
    next_id: SubscriberId,
}

impl<E: Clone> EventBus<E> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BusInner {
                log: Vec::new(),
                subscribers: Vec::new(),
                next_id: 1,
            }),
        }
    }

    pub fn emit(&self, event: E) {
        let mut inner = self.inner.lock().unwrap();
        inner.log.push(event.clone());
        inner
            .subscribers
            .retain(|(_, tx)| tx.send(event.clone()).is_ok());
    }

    /// Register a subscriber.  The returned receiver is pre-loaded with a
    /// replay of all events emitted so far.
    pub fn subscribe(&self) -> (SubscriberId, mpsc::UnboundedReceiver<E>) {
        let mut inner = self.inner.lock().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        for event in &inner.log {
            let _ = tx.send(event.clone());
        }
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push((id, tx));
        (id, rx)
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.inner
            .lock()
            .unwrap()
            .subscribers
            .retain(|(sub_id, _)| *sub_id != id);
    }

    /// Deliver a single event, then unsubscribe.  Replay applies: on a bus
    /// with history this resolves immediately with the earliest logged
    /// event.
    pub async fn once(&self) -> Option<E> {
        let (id, mut rx) = self.subscribe();
        let event = rx.recv().await;
        self.unsubscribe(id);
        event
    }

    /// Snapshot of the full event log.
    pub fn log(&self) -> Vec<E> {
        self.inner.lock().unwrap().log.clone()
    }
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
