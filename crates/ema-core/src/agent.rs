// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use ema_config::AgentConfig;
use ema_model::{Content, LlmClient, LlmError, ToolResult};
use ema_tools::{EmaReply, ToolSet, REPLY_TOOL_NAME};

use crate::{
    context::ContextManager,
    events::{AgentEvent, EventBus, RunOutcome},
};

/// Everything one run needs: prompt, history and tool set.
///
/// Exclusively owned by the driving agent while a run is active; the run
/// returns it so the caller may cache it for resume after preemption.
#[derive(Debug)]
pub struct AgentState {
    pub system_prompt: String,
    pub messages: Vec<ema_model::Message>,
    pub tools: Arc<ToolSet>,
}

impl AgentState {
    pub fn new(system_prompt: impl Into<String>, tools: Arc<ToolSet>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            messages: Vec::new(),
            tools,
        }
    }

    /// Append one user message built from an input batch.
    pub fn push_user(&mut self, contents: Vec<Content>) {
        self.messages.push(ema_model::Message::User { contents });
    }
}

/// Returned when a run is requested while another is still active.
/// Carries the rejected state back to the caller.
#[derive(Debug, Error)]
#[error("agent is already driving a run")]
pub struct AlreadyRunning(pub AgentState);

/// Drives one cancellable, step-bounded run at a time: model call, tool
/// batch, repeat.  Every run terminates with exactly one
/// [`AgentEvent::RunFinished`] on the event bus.
pub struct Agent {
    llm: Arc<dyn LlmClient>,
    config: AgentConfig,
    events: EventBus<AgentEvent>,
    /// Cancel token of the current run; replaced at every run start.
    cancel: Mutex<CancellationToken>,
    running: watch::Sender<bool>,
}

impl Agent {
    pub fn new(llm: Arc<dyn LlmClient>, config: AgentConfig) -> Self {
        let (running, _) = watch::channel(false);
        Self {
            llm,
            config,
            events: EventBus::new(),
            cancel: Mutex::new(CancellationToken::new()),
            running,
        }
    }

    pub fn events(&self) -> &EventBus<AgentEvent> {
        &self.events
    }

    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    /// Watch channel mirroring `is_running`; used for idle-waits.
    pub fn running_watch(&self) -> watch::Receiver<bool> {
        self.running.subscribe()
    }

    /// Request cancellation of the current run.  Idempotent; returns once
    /// the request is delivered.  The running loop observes it at its next
    /// checkpoint, and an in-flight LLM call receives the token directly.
    pub fn abort(&self) {
        self.cancel.lock().unwrap().cancel();
    }

    /// Drive the main loop over `state`.  The (possibly mutated) state is
    /// handed back when the run terminates so it can be resumed later.
    pub async fn run_with_state(&self, state: AgentState) -> Result<AgentState, AlreadyRunning> {
        if self.running.send_replace(true) {
            return Err(AlreadyRunning(state));
        }
        let cancel = {
            let mut guard = self.cancel.lock().unwrap();
            *guard = CancellationToken::new();
            guard.clone()
        };
        let final_state = self.main_loop(state, &cancel).await;
        self.running.send_replace(false);
        Ok(final_state)
    }

    async fn main_loop(&self, state: AgentState, cancel: &CancellationToken) -> AgentState {
        let mut ctx = ContextManager::from_state(state, self.config.token_limit);
        let schemas = ctx.tools().schemas();

        for step in 1..=self.config.max_steps {
            if cancel.is_cancelled() {
                self.events.emit(AgentEvent::RunFinished(RunOutcome::aborted()));
                return ctx.into_state();
            }
            self.events.emit(AgentEvent::StepStarted { step });

            // Context-length defence before the model call.
            if ctx.should_summarise() {
                self.events.emit(AgentEvent::SummarizeMessagesStarted);
                match ctx.summarise(self.llm.as_ref(), cancel).await {
                    Ok(stats) => {
                        self.events.emit(AgentEvent::SummarizeMessagesFinished {
                            rounds: stats.rounds,
                            fallback_rounds: stats.fallback_rounds,
                            degraded_rounds: stats.degraded_rounds,
                        });
                    }
                    Err(_cancelled) => {
                        self.events.emit(AgentEvent::RunFinished(RunOutcome::aborted()));
                        return ctx.into_state();
                    }
                }
            }
            if ctx.take_estimator_fallback_note() {
                self.events.emit(AgentEvent::TokenEstimationFallbacked);
            }

            let response = match self
                .llm
                .generate(ctx.history(), &schemas, Some(ctx.system_prompt()), cancel)
                .await
            {
                Ok(response) => response,
                Err(LlmError::Cancelled) => {
                    self.events.emit(AgentEvent::RunFinished(RunOutcome::aborted()));
                    return ctx.into_state();
                }
                Err(e @ LlmError::RetryExhausted { .. }) => {
                    self.events.emit(AgentEvent::RunFinished(RunOutcome::failure(
                        "LLM retry exhausted",
                        e.to_string(),
                    )));
                    return ctx.into_state();
                }
                Err(e) => {
                    error!(error = %e, "llm call failed");
                    self.events.emit(AgentEvent::RunFinished(RunOutcome::failure(
                        "LLM call failed",
                        e.to_string(),
                    )));
                    return ctx.into_state();
                }
            };

            ctx.add_model(&response);
            self.events.emit(AgentEvent::LlmResponseReceived {
                finish_reason: response.finish_reason.clone(),
                total_tokens: response.total_tokens,
                tool_calls: response.tool_calls.len(),
            });

            // No tool calls: the success terminal.
            if response.tool_calls.is_empty() {
                self.events.emit(AgentEvent::RunFinished(RunOutcome::success(
                    response.finish_reason.clone(),
                )));
                return ctx.into_state();
            }

            // Execute tool calls sequentially in the order the model emitted
            // them; each must be answered before the next model call.
            for call in &response.tool_calls {
                if cancel.is_cancelled() {
                    self.events.emit(AgentEvent::RunFinished(RunOutcome::aborted()));
                    return ctx.into_state();
                }
                self.events.emit(AgentEvent::ToolCallStarted {
                    id: call.id.clone(),
                    name: call.name.clone(),
                });

                let mut result = match ctx.tools().get(&call.name) {
                    None => {
                        warn!(tool = %call.name, "model requested an unregistered tool");
                        ToolResult::err(format!("Unknown tool: {}", call.name))
                    }
                    Some(tool) => {
                        let args = call.args_object();
                        match tool.execute(&args).await {
                            Ok(result) => result,
                            Err(e) => ToolResult::err(format!("{}: {e:#}", call.name)),
                        }
                    }
                };

                // Privileged structured-reply interception: surface the
                // payload to subscribers, then redact it from history so the
                // model does not see its own reply echoed back.
                if call.name == REPLY_TOOL_NAME && result.success {
                    match result
                        .content
                        .as_deref()
                        .map(serde_json::from_str::<EmaReply>)
                    {
                        Some(Ok(reply)) => {
                            self.events.emit(AgentEvent::EmaReplyReceived { reply });
                            result = result.redacted();
                        }
                        _ => warn!("structured reply content was not valid reply JSON"),
                    }
                }

                self.events.emit(AgentEvent::ToolCallFinished {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    success: result.success,
                });
                ctx.add_tool(result, &call.name, Some(call.id.clone()));
            }
            debug!(step, "tool batch complete");
        }

        let msg = format!(
            "Task couldn't be completed after {} steps",
            self.config.max_steps
        );
        self.events
            .emit(AgentEvent::RunFinished(RunOutcome::failure(msg.clone(), msg)));
        ctx.into_state()
    }
}
