// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{Content, LlmClient, LlmError, LlmResponse, Message, ToolCall, ToolSchema};

/// Deterministic mock client for tests and dry runs.  Echoes the last user
/// message back as the model response.
#[derive(Default)]
pub struct MockLlm;

#[async_trait]
impl LlmClient for MockLlm {
    fn name(&self) -> &str {
        "mock"
    }
    fn model_name(&self) -> &str {
        "mock-model"
    }

    async fn generate(
        &self,
        messages: &[Message],
        _tools: &[ToolSchema],
        _system_prompt: Option<&str>,
        _cancel: &CancellationToken,
    ) -> Result<LlmResponse, LlmError> {
        let reply = messages
            .iter()
            .rev()
            .find_map(|m| match m {
                Message::User { contents } => Some(crate::join_contents(contents)),
                _ => None,
            })
            .unwrap_or_else(|| "[no input]".to_string());
        Ok(LlmResponse {
            contents: vec![Content::text(format!("MOCK: {reply}"))],
            tool_calls: vec![],
            finish_reason: "stop".into(),
            total_tokens: 10,
        })
    }
}

/// One pre-programmed model turn for [`ScriptedLlm`].
#[derive(Debug, Clone)]
pub enum ScriptedTurn {
    /// A full response returned as-is.
    Respond(ScriptedResponse),
    /// An adapter failure with the given message.
    Fail(String),
    /// Park on the cancel token, then return `Cancelled`.  Drives abort
    /// scenarios where the caller cancels an in-flight call.
    WaitForCancel,
}

#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    pub contents: Vec<Content>,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: String,
    pub total_tokens: u64,
}

impl ScriptedTurn {
    /// Plain text reply with `finish_reason: "stop"`.
    pub fn text(text: impl Into<String>, total_tokens: u64) -> Self {
        Self::Respond(ScriptedResponse {
            contents: vec![Content::text(text)],
            tool_calls: vec![],
            finish_reason: "stop".into(),
            total_tokens,
        })
    }

    /// A turn consisting of the given tool calls and no text.
    pub fn tool_calls(calls: Vec<ToolCall>, total_tokens: u64) -> Self {
        Self::Respond(ScriptedResponse {
            contents: vec![],
            tool_calls: calls,
            finish_reason: "tool_calls".into(),
            total_tokens,
        })
    }

    /// Single tool call with JSON arguments.
    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        args: serde_json::Value,
        total_tokens: u64,
    ) -> Self {
        Self::tool_calls(vec![ToolCall::new(id, name, args)], total_tokens)
    }
}

/// What one `generate` call received, recorded for assertions.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub messages: Vec<Message>,
    pub tool_names: Vec<String>,
    pub system_prompt: Option<String>,
}

/// A pre-scripted client.  Each `generate` call pops the next turn from the
/// front of the queue, so tests can specify exact multi-turn sequences
/// (tool calls, failures, cancel-waits) without network access.
pub struct ScriptedLlm {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    /// Every request seen, in call order.
    pub requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedLlm {
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Convenience: a client that always answers with one text reply.
    pub fn always_text(text: impl Into<String>) -> Self {
        Self::new(vec![ScriptedTurn::text(text, 10)])
    }

    /// Append a turn after construction (e.g. to feed summarisation calls).
    pub fn push_turn(&self, turn: ScriptedTurn) {
        self.turns.lock().unwrap().push_back(turn);
    }

    pub fn recorded_requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted-mock"
    }
    fn model_name(&self) -> &str {
        "scripted-mock-model"
    }

    async fn generate(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        system_prompt: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            messages: messages.to_vec(),
            tool_names: tools.iter().map(|t| t.name.clone()).collect(),
            system_prompt: system_prompt.map(str::to_string),
        });

        let turn = self.turns.lock().unwrap().pop_front();
        match turn {
            // Default fallback when all scripts are consumed.
            None => Ok(LlmResponse {
                contents: vec![Content::text("[no more scripts]")],
                tool_calls: vec![],
                finish_reason: "stop".into(),
                total_tokens: 1,
            }),
            Some(ScriptedTurn::Respond(r)) => Ok(LlmResponse {
                contents: r.contents,
                tool_calls: r.tool_calls,
                finish_reason: r.finish_reason,
                total_tokens: r.total_tokens,
            }),
            Some(ScriptedTurn::Fail(msg)) => Err(LlmError::Adapter(anyhow::anyhow!(msg))),
            Some(ScriptedTurn::WaitForCancel) => {
                cancel.cancelled().await;
                Err(LlmError::Cancelled)
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
