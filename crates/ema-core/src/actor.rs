// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, warn};

use ema_config::{ActorConfig, Config};
use ema_memory::{
    BufferMessage, BufferPayload, LongTermMemory, LongTermStore, MemoryError, MessageBuffer,
    SearchResult, ShortTermMemory, ShortTermStore,
};
use ema_model::{ActorId, Content, LlmClient};
use ema_tools::ToolSet;

use crate::{
    agent::{Agent, AgentState, AlreadyRunning},
    events::{ActorEvent, ActorSnapshot, ActorStatus, AgentEvent, SubscriberId},
    prompts::expand_memory_buffer,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActorError {
    #[error("inputs must not be empty")]
    EmptyInput,
    #[error("only text content is accepted")]
    NonTextInput,
}

/// Handle returned by [`Actor::subscribe`].  The first snapshot received is
/// the replay of everything broadcast before the subscription; every later
/// snapshot carries the events since the previous one.
pub struct ActorSubscription {
    pub id: SubscriberId,
    pub rx: mpsc::UnboundedReceiver<ActorSnapshot>,
}

/// Per-identity worker: queues input batches, serialises agent runs,
/// preempts on new input and fans lifecycle snapshots out to subscribers.
///
/// Cheap to clone; all clones share the same worker.
#[derive(Clone)]
pub struct Actor {
    inner: Arc<ActorInner>,
}

struct ActorInner {
    id: ActorId,
    config: ActorConfig,
    tools: Arc<ToolSet>,
    buffer: Arc<dyn MessageBuffer>,
    short_term: Arc<dyn ShortTermStore>,
    long_term: Arc<dyn LongTermStore>,
    agent: Arc<Agent>,
    ctl: Mutex<Ctl>,
    /// FIFO gate serialising buffer appends; lock acquisition order is
    /// arrival order, so the persisted log matches it.
    write_gate: tokio::sync::Mutex<()>,
    subs: Mutex<Subscribers>,
}

/// Queue and run-lifecycle state.  Guarded by one mutex so the dispatch
/// decisions in `work` and the pickup decisions in `process_queue` are
/// atomic; never held across an await.
struct Ctl {
    status: ActorStatus,
    /// True while a queue-processor task is alive.
    processing: bool,
    /// Resume the cached state on the next pickup instead of building fresh.
    resume: bool,
    /// A structured reply was emitted during the current run.
    has_reply_in_run: bool,
    queue: VecDeque<Vec<Content>>,
    cached_state: Option<AgentState>,
}

struct Subscribers {
    log: Vec<ActorEvent>,
    senders: Vec<(SubscriberId, mpsc::UnboundedSender<ActorSnapshot>)>,
    next_id: SubscriberId,
}

impl Actor {
    pub fn new(
        id: ActorId,
        config: Config,
        llm: Arc<dyn LlmClient>,
        tools: Arc<ToolSet>,
        buffer: Arc<dyn MessageBuffer>,
        short_term: Arc<dyn ShortTermStore>,
        long_term: Arc<dyn LongTermStore>,
    ) -> Self {
        let agent = Arc::new(Agent::new(llm, config.agent));
        let inner = Arc::new(ActorInner {
            id,
            config: config.actor,
            tools,
            buffer,
            short_term,
            long_term,
            agent,
            ctl: Mutex::new(Ctl {
                status: ActorStatus::Idle,
                processing: false,
                resume: false,
                has_reply_in_run: false,
                queue: VecDeque::new(),
                cached_state: None,
            }),
            write_gate: tokio::sync::Mutex::new(()),
            subs: Mutex::new(Subscribers {
                log: Vec::new(),
                senders: Vec::new(),
                next_id: 1,
            }),
        });

        // Forward agent events into the actor's broadcast stream.  The weak
        // reference lets the task wind down once the actor is dropped.
        let (_, mut agent_events) = inner.agent.events().subscribe();
        let weak = Arc::downgrade(&inner);
        tokio::spawn(async move {
            while let Some(event) = agent_events.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                inner.on_agent_event(event).await;
            }
        });

        Self { inner }
    }

    pub fn id(&self) -> ActorId {
        self.inner.id
    }

    pub fn status(&self) -> ActorStatus {
        self.inner.ctl.lock().unwrap().status
    }

    /// The agent driving this actor's runs; exposed for idle-waits and
    /// task binding.
    pub fn agent(&self) -> &Arc<Agent> {
        &self.inner.agent
    }

    /// Accept one batch of user input.
    ///
    /// Validates the batch, persists it to the buffer, then either kicks the
    /// queue processor or, when a run is active, preempts it: the current
    /// run is aborted, and the resume flag is set unless the run has already
    /// produced a structured reply.
    pub async fn work(&self, inputs: Vec<Content>) -> Result<(), ActorError> {
        if inputs.is_empty() {
            return Err(ActorError::EmptyInput);
        }
        if inputs.iter().any(|c| !c.is_text()) {
            return Err(ActorError::NonTextInput);
        }

        self.inner
            .append_buffer(
                &self.inner.config.user_name,
                BufferPayload::User {
                    contents: inputs.clone(),
                },
            )
            .await;

        let preempt = {
            let mut ctl = self.inner.ctl.lock().unwrap();
            ctl.queue.push_back(inputs);
            if ctl.processing {
                if !ctl.has_reply_in_run {
                    ctl.resume = true;
                }
                true
            } else {
                ctl.processing = true;
                false
            }
        };

        if preempt {
            self.inner.agent.abort();
        } else {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.process_queue().await });
        }
        Ok(())
    }

    /// Register a subscriber.  Immediately delivers a replay snapshot with
    /// the current status and all past events.
    pub fn subscribe(&self) -> ActorSubscription {
        let status = self.status();
        let mut subs = self.inner.subs.lock().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(ActorSnapshot {
            status,
            events: subs.log.clone(),
        });
        let id = subs.next_id;
        subs.next_id += 1;
        subs.senders.push((id, tx));
        ActorSubscription { id, rx }
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.inner
            .subs
            .lock()
            .unwrap()
            .senders
            .retain(|(sub_id, _)| *sub_id != id);
    }

    /// Broadcast a plain message event to subscribers.
    pub fn post_message(&self, content: impl Into<String>) {
        self.inner.broadcast(vec![ActorEvent::Message(content.into())]);
    }

    /// Full buffer transcript for this actor.
    pub async fn transcript(&self) -> Result<Vec<BufferMessage>, MemoryError> {
        self.inner.buffer.all(self.inner.id).await
    }

    // ── Memory pass-throughs ─────────────────────────────────────────────────

    pub async fn search(&self, keywords: &[String]) -> Result<SearchResult, MemoryError> {
        self.inner
            .long_term
            .search(self.inner.id.actor_id, keywords)
            .await
    }

    pub async fn add_short_term_memory(
        &self,
        content: impl Into<String> + Send,
    ) -> Result<(), MemoryError> {
        self.inner
            .short_term
            .add(ShortTermMemory::new(self.inner.id.actor_id, content))
            .await
    }

    pub async fn add_long_term_memory(
        &self,
        content: impl Into<String> + Send,
        keywords: Vec<String>,
    ) -> Result<(), MemoryError> {
        self.inner
            .long_term
            .add(LongTermMemory::new(
                self.inner.id.actor_id,
                content,
                keywords,
            ))
            .await
    }
}

impl ActorInner {
    async fn on_agent_event(&self, event: AgentEvent) {
        if let AgentEvent::EmaReplyReceived { reply } = &event {
            self.ctl.lock().unwrap().has_reply_in_run = true;
            self.append_buffer(
                &self.config.actor_name,
                BufferPayload::Ema {
                    reply: reply.clone(),
                },
            )
            .await;
        }
        self.broadcast(vec![ActorEvent::from(event)]);
    }

    /// Serialised buffer append.  Write errors are logged and swallowed so
    /// one failing write never blocks the log or the run.
    async fn append_buffer(&self, name: &str, payload: BufferPayload) {
        let _gate = self.write_gate.lock().await;
        if let Err(e) = self.buffer.append(self.id, name, payload).await {
            warn!(error = %e, "buffer write failed");
        }
    }

    fn broadcast(&self, events: Vec<ActorEvent>) {
        let status = self.ctl.lock().unwrap().status;
        let mut subs = self.subs.lock().unwrap();
        subs.log.extend(events.iter().cloned());
        let snapshot = ActorSnapshot { status, events };
        subs.senders
            .retain(|(_, tx)| tx.send(snapshot.clone()).is_ok());
    }

    fn set_status(&self, status: ActorStatus) {
        self.ctl.lock().unwrap().status = status;
        self.broadcast(vec![]);
    }

    /// Drain the queue serially.  One instance of this task is alive per
    /// actor at any time; it exits when the queue is empty.
    async fn process_queue(&self) {
        loop {
            let batch = {
                let mut ctl = self.ctl.lock().unwrap();
                match ctl.queue.pop_front() {
                    Some(batch) => Some(batch),
                    None => {
                        ctl.processing = false;
                        ctl.status = ActorStatus::Idle;
                        if !ctl.resume {
                            // Run complete, nothing pending: the cached
                            // state's lifecycle ends here.
                            ctl.cached_state = None;
                        }
                        None
                    }
                }
            };
            let Some(batch) = batch else {
                self.broadcast(vec![]);
                return;
            };
            self.set_status(ActorStatus::Preparing);

            let (resume, cached) = {
                let mut ctl = self.ctl.lock().unwrap();
                let resume = std::mem::take(&mut ctl.resume);
                let cached = ctl.cached_state.take();
                ctl.has_reply_in_run = false;
                (resume, cached)
            };

            let state = match (resume, cached) {
                (true, Some(mut state)) => {
                    state.push_user(batch);
                    state
                }
                _ => self.build_state(batch).await,
            };

            self.set_status(ActorStatus::Running);
            match self.agent.run_with_state(state).await {
                Ok(final_state) => {
                    self.ctl.lock().unwrap().cached_state = Some(final_state);
                }
                Err(AlreadyRunning(state)) => {
                    // Unreachable under per-actor serialisation; keep the
                    // state rather than losing it.
                    error!("agent rejected a run while the actor believed it idle");
                    self.ctl.lock().unwrap().cached_state = Some(state);
                }
            }
        }
    }

    /// Fresh run state: expanded system prompt plus the batch as the
    /// initial user message.
    async fn build_state(&self, batch: Vec<Content>) -> AgentState {
        let recent = match self
            .buffer
            .recent(self.id, self.config.buffer_window)
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                warn!(error = %e, "reading buffer for prompt injection failed");
                Vec::new()
            }
        };
        let system_prompt = expand_memory_buffer(&self.config.system_prompt, &recent);
        let mut state = AgentState::new(system_prompt, Arc::clone(&self.tools));
        state.push_user(batch);
        state
    }
}
