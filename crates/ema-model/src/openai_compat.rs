// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Driver for OpenAI-compatible chat completion APIs.
//!
//! Dozens of providers and local servers (llama.cpp, Ollama, vLLM, LiteLLM)
//! speak the same `/chat/completions` wire format; one driver covers them
//! all.  Streaming is deliberately not used: the agent loop consumes whole
//! turns, and a plain awaited POST keeps cancellation a simple race against
//! the token.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use ema_config::{LlmConfig, RetryConfig};

use crate::{
    retry::with_retry, Content, LlmClient, LlmError, LlmResponse, Message, ToolCall, ToolSchema,
};

pub struct OpenAiCompatClient {
    model: String,
    /// Pre-resolved API key; `None` for local servers.
    api_key: Option<String>,
    chat_url: String,
    max_tokens: u32,
    temperature: f32,
    retry: RetryConfig,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    pub fn new(cfg: &LlmConfig) -> Self {
        let base = cfg
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        let api_key = cfg.api_key.clone().or_else(|| {
            cfg.api_key_env
                .as_deref()
                .and_then(|var| std::env::var(var).ok())
        });
        Self {
            model: cfg.name.clone(),
            api_key,
            chat_url: format!("{}/chat/completions", base.trim_end_matches('/')),
            max_tokens: cfg.max_tokens.unwrap_or(4096),
            temperature: cfg.temperature.unwrap_or(0.7),
            retry: cfg.retry.clone(),
            client: reqwest::Client::new(),
        }
    }

    async fn post_once(&self, body: &Value, cancel: &CancellationToken) -> Result<Value, LlmError> {
        let mut req = self.client.post(&self.chat_url).json(body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let send = async {
            let resp = req.send().await.context("sending completion request")?;
            let status = resp.status();
            let payload: Value = resp.json().await.context("reading completion body")?;
            if !status.is_success() {
                return Err(anyhow!("completion request failed ({status}): {payload}"));
            }
            Ok::<Value, anyhow::Error>(payload)
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(LlmError::Cancelled),
            result = send => result.map_err(LlmError::Adapter),
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    fn name(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        system_prompt: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<LlmResponse, LlmError> {
        let mut body = json!({
            "model": self.model,
            "messages": build_wire_messages(messages, system_prompt),
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.iter().map(tool_schema_to_wire).collect());
        }

        let payload = with_retry(&self.retry, cancel, |_| self.post_once(&body, cancel)).await?;
        parse_response(&payload).map_err(LlmError::Adapter)
    }
}

// ─── Internal → wire ─────────────────────────────────────────────────────────

fn tool_schema_to_wire(schema: &ToolSchema) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": schema.name,
            "description": schema.description,
            "parameters": schema.parameters,
        }
    })
}

fn content_parts_to_wire(contents: &[Content]) -> Value {
    Value::Array(
        contents
            .iter()
            .map(|c| match c {
                Content::Text { text } => json!({ "type": "text", "text": text }),
            })
            .collect(),
    )
}

/// Translate the internal history into the provider message list.
/// The system prompt, when present, becomes a separate leading entry.
fn build_wire_messages(messages: &[Message], system_prompt: Option<&str>) -> Vec<Value> {
    let mut wire = Vec::with_capacity(messages.len() + 1);
    if let Some(system) = system_prompt {
        wire.push(json!({ "role": "system", "content": system }));
    }
    for message in messages {
        wire.push(match message {
            Message::User { contents } => json!({
                "role": "user",
                "content": content_parts_to_wire(contents),
            }),
            Message::Model {
                contents,
                tool_calls,
            } => {
                let mut entry = json!({
                    "role": "assistant",
                    "content": content_parts_to_wire(contents),
                });
                if !tool_calls.is_empty() {
                    entry["tool_calls"] = Value::Array(
                        tool_calls
                            .iter()
                            .map(|call| {
                                json!({
                                    "id": call.id,
                                    "type": "function",
                                    "function": {
                                        "name": call.name,
                                        "arguments": call.args.to_string(),
                                    }
                                })
                            })
                            .collect(),
                    );
                }
                entry
            }
            Message::Tool {
                call_id,
                name,
                result,
            } => json!({
                "role": "tool",
                "tool_call_id": call_id.clone().unwrap_or_default(),
                "name": name,
                "content": serde_json::to_string(result).unwrap_or_default(),
            }),
        });
    }
    wire
}

// ─── Wire → internal ─────────────────────────────────────────────────────────

/// Extract the assistant message, tool calls, finish reason and usage from a
/// chat-completions response body.
fn parse_response(payload: &Value) -> anyhow::Result<LlmResponse> {
    let choice = payload["choices"]
        .get(0)
        .ok_or_else(|| anyhow!("response carries no choices: {payload}"))?;
    let message = &choice["message"];

    let mut contents = Vec::new();
    match &message["content"] {
        Value::String(text) if !text.is_empty() => contents.push(Content::text(text.clone())),
        Value::Array(parts) => {
            for part in parts {
                if let Some(text) = part["text"].as_str() {
                    contents.push(Content::text(text));
                }
            }
        }
        _ => {}
    }

    let mut tool_calls = Vec::new();
    if let Some(calls) = message["tool_calls"].as_array() {
        for call in calls {
            let id = call["id"].as_str().unwrap_or_default().to_string();
            let name = call["function"]["name"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            let raw_args = call["function"]["arguments"].as_str().unwrap_or("{}");
            let args = match serde_json::from_str(raw_args) {
                Ok(v) => v,
                Err(e) => {
                    warn!(
                        tool_name = %name,
                        call_id = %id,
                        error = %e,
                        "tool call arguments are not valid JSON; substituting {{}}"
                    );
                    Value::Object(Default::default())
                }
            };
            tool_calls.push(ToolCall { id, name, args });
        }
    }

    let finish_reason = choice["finish_reason"]
        .as_str()
        .unwrap_or("stop")
        .to_string();
    let total_tokens = payload["usage"]["total_tokens"].as_u64().unwrap_or(0);

    Ok(LlmResponse {
        contents,
        tool_calls,
        finish_reason,
        total_tokens,
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
