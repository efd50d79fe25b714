// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use ema_model::{join_contents, Content, LlmClient, LlmError, LlmResponse, Message, ToolResult};
use ema_tools::ToolSet;

use crate::agent::AgentState;

// ─── Summarisation prompt ─────────────────────────────────────────────────────

const SUMMARIZE_ROUND_PROMPT: &str =
    "Summarise the execution round below concisely. Focus on what was done, \
     which tools were called, and what they returned. Keep the summary under \
     1000 words and write it in the same language as the conversation.";

/// Prefix on every synthetic summary message so the model can tell condensed
/// history from live user input.
const SUMMARY_PREFIX: &str = "[Assistant Execution Summary]";

/// Summaries shorter than this are treated as degraded and surfaced through
/// the summarisation diagnostics.
const DEGRADED_SUMMARY_FLOOR: usize = 40;

/// Per-message token overhead added on top of the character heuristic.
const PER_MESSAGE_OVERHEAD: u64 = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SummariseStats {
    /// Execution rounds condensed in this pass.
    pub rounds: usize,
    /// Rounds where the summarising call failed and the raw text was kept.
    pub fallback_rounds: usize,
    /// Rounds whose summary came back suspiciously short.
    pub degraded_rounds: usize,
}

/// Mutable conversation state for one agent run: system prompt, history and
/// tool set, plus the token accounting that drives summarisation.
pub struct ContextManager {
    system_prompt: String,
    messages: Vec<Message>,
    tools: Arc<ToolSet>,
    token_limit: u64,
    /// Set after a summarisation pass so the next loop entry does not
    /// re-trigger before a fresh adapter-reported total is observed.
    skip_summarise_once: bool,
    /// Last cumulative total reported by the adapter.
    reported_total_tokens: u64,
    estimator_used: bool,
    estimator_noted: bool,
}

impl ContextManager {
    pub fn from_state(state: AgentState, token_limit: u64) -> Self {
        Self {
            system_prompt: state.system_prompt,
            messages: state.messages,
            tools: state.tools,
            token_limit,
            skip_summarise_once: false,
            reported_total_tokens: 0,
            estimator_used: false,
            estimator_noted: false,
        }
    }

    pub fn into_state(self) -> AgentState {
        AgentState {
            system_prompt: self.system_prompt,
            messages: self.messages,
            tools: self.tools,
        }
    }

    pub fn add_user(&mut self, contents: Vec<Content>) {
        self.messages.push(Message::User { contents });
    }

    /// Append the model message and record the adapter-reported total.
    pub fn add_model(&mut self, response: &LlmResponse) {
        self.messages.push(response.to_message());
        self.reported_total_tokens = response.total_tokens;
    }

    pub fn add_tool(&mut self, result: ToolResult, name: &str, call_id: Option<String>) {
        self.messages.push(Message::tool(result, name, call_id));
    }

    /// Shallow snapshot of the history.
    pub fn history(&self) -> &[Message] {
        &self.messages
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn tools(&self) -> &Arc<ToolSet> {
        &self.tools
    }

    /// Heuristic token estimate: rendered characters divided by 2.5 plus a
    /// flat per-message overhead.  A real BPE count is not available, so
    /// this *is* the documented fallback estimator; its first use is
    /// surfaced through [`Self::take_estimator_fallback_note`].
    pub fn estimate_tokens(&mut self) -> u64 {
        self.estimator_used = true;
        let chars: usize = self.messages.iter().map(Message::approx_chars).sum();
        (chars as f64 / 2.5).ceil() as u64 + PER_MESSAGE_OVERHEAD * self.messages.len() as u64
    }

    /// True exactly once, after the heuristic estimator has first been used.
    pub fn take_estimator_fallback_note(&mut self) -> bool {
        if self.estimator_used && !self.estimator_noted {
            self.estimator_noted = true;
            true
        } else {
            false
        }
    }

    /// Whether the next loop entry must summarise before calling the model.
    /// Consumes the skip-once flag.
    pub fn should_summarise(&mut self) -> bool {
        if self.skip_summarise_once {
            self.skip_summarise_once = false;
            return false;
        }
        if self.token_limit == 0 {
            return false;
        }
        self.reported_total_tokens > self.token_limit || self.estimate_tokens() > self.token_limit
    }

    /// Condense the history: every user message is preserved verbatim, and
    /// the messages between it and the next user message (one *execution
    /// round*) are replaced by an LLM-written summary appended as a
    /// synthetic user message.  A failed or empty summarising call keeps the
    /// raw textual join of the round instead; execution history is never
    /// dropped silently.  The replacement is atomic: a cancellation mid-pass
    /// leaves the original history untouched.
    pub async fn summarise(
        &mut self,
        llm: &dyn LlmClient,
        cancel: &CancellationToken,
    ) -> Result<SummariseStats, LlmError> {
        let mut stats = SummariseStats::default();

        let mut segments: Vec<(Message, Vec<Message>)> = Vec::new();
        for message in &self.messages {
            if message.is_user() {
                segments.push((message.clone(), Vec::new()));
            } else if let Some((_, round)) = segments.last_mut() {
                round.push(message.clone());
            }
        }
        if segments.is_empty() {
            self.skip_summarise_once = true;
            return Ok(stats);
        }

        let mut rebuilt = Vec::with_capacity(segments.len() * 2);
        for (user, round) in segments {
            rebuilt.push(user);
            if round.is_empty() {
                continue;
            }
            stats.rounds += 1;
            let round_text = render_round(&round);
            let summary = match self.summarise_round(llm, cancel, &round_text).await {
                Ok(Some(text)) => {
                    if text.len() < DEGRADED_SUMMARY_FLOOR {
                        stats.degraded_rounds += 1;
                        warn!(chars = text.len(), "round summary is suspiciously short");
                    }
                    text
                }
                Ok(None) => {
                    warn!("round summary came back empty; keeping raw round text");
                    stats.fallback_rounds += 1;
                    round_text
                }
                Err(LlmError::Cancelled) => return Err(LlmError::Cancelled),
                Err(e) => {
                    warn!(error = %e, "summarisation call failed; keeping raw round text");
                    stats.fallback_rounds += 1;
                    round_text
                }
            };
            rebuilt.push(Message::user(format!("{SUMMARY_PREFIX} {summary}")));
        }

        self.messages = rebuilt;
        self.skip_summarise_once = true;
        Ok(stats)
    }

    async fn summarise_round(
        &self,
        llm: &dyn LlmClient,
        cancel: &CancellationToken,
        round_text: &str,
    ) -> Result<Option<String>, LlmError> {
        let request = format!("{SUMMARIZE_ROUND_PROMPT}\n\n---\n\n{round_text}");
        let response = llm
            .generate(&[Message::user(request)], &[], None, cancel)
            .await?;
        let text = join_contents(&response.contents);
        if text.trim().is_empty() {
            Ok(None)
        } else {
            Ok(Some(text))
        }
    }
}

/// Render an execution round as role-labelled plain text for the summary
/// request (and for the fallback join).
fn render_round(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|message| match message {
            Message::User { contents } => format!("User: {}", join_contents(contents)),
            Message::Model {
                contents,
                tool_calls,
            } => {
                let mut lines = Vec::new();
                let text = join_contents(contents);
                if !text.is_empty() {
                    lines.push(format!("Assistant: {text}"));
                }
                for call in tool_calls {
                    lines.push(format!(
                        "Assistant (tool call): {}({})",
                        call.name,
                        serde_json::to_string(&call.args).unwrap_or_default()
                    ));
                }
                lines.join("\n")
            }
            Message::Tool { name, result, .. } => {
                let body = result
                    .content
                    .clone()
                    .or_else(|| result.error.clone())
                    .unwrap_or_default();
                format!("Tool result ({name}): {body}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
