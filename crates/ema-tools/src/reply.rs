// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The structured-reply tool, the only sanctioned terminal output shape.
//!
//! The agent loop treats this tool as privileged: on success it parses the
//! JSON content, emits the reply to subscribers, and redacts the content
//! from the tool message appended to history so the user-visible payload is
//! not repeated back to the model.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use ema_model::ToolResult;

use crate::{Tool, ToolArgs};

/// Fixed name the agent loop intercepts.
pub const REPLY_TOOL_NAME: &str = "ema_reply";

/// Facial expression accompanying a reply.  Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Expression {
    Neutral,
    Smile,
    Serious,
    Confused,
    Surprised,
    Sad,
}

/// Gesture accompanying a reply.  Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    None,
    Nod,
    Shake,
    Wave,
    Jump,
    Point,
}

/// The structured reply delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmaReply {
    pub think: String,
    pub expression: Expression,
    pub action: ActionKind,
    pub response: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReplyError {
    #[error("field `{0}` must not be empty")]
    EmptyField(&'static str),
}

impl EmaReply {
    /// All fields are required by the schema; `think` and `response` must be
    /// non-empty after trimming.
    pub fn validate(&self) -> Result<(), ReplyError> {
        if self.think.trim().is_empty() {
            return Err(ReplyError::EmptyField("think"));
        }
        if self.response.trim().is_empty() {
            return Err(ReplyError::EmptyField("response"));
        }
        Ok(())
    }
}

/// Tool implementation backing [`REPLY_TOOL_NAME`].
///
/// Parses and validates the model's arguments, then echoes the canonical
/// JSON as successful content for the agent loop to intercept.
#[derive(Default)]
pub struct EmaReplyTool;

#[async_trait]
impl Tool for EmaReplyTool {
    fn name(&self) -> &str {
        REPLY_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Deliver your reply to the user. Call this exactly once per turn; \
         the response field is what the user sees."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "think": {
                    "type": "string",
                    "description": "Private reasoning behind the reply"
                },
                "expression": {
                    "type": "string",
                    "enum": ["neutral", "smile", "serious", "confused", "surprised", "sad"]
                },
                "action": {
                    "type": "string",
                    "enum": ["none", "nod", "shake", "wave", "jump", "point"]
                },
                "response": {
                    "type": "string",
                    "description": "The user-visible reply text"
                }
            },
            "required": ["think", "expression", "action", "response"]
        })
    }

    async fn execute(&self, args: &ToolArgs) -> anyhow::Result<ToolResult> {
        let reply: EmaReply = serde_json::from_value(Value::Object(args.clone()))
            .map_err(|e| anyhow::anyhow!("invalid reply arguments: {e}"))?;
        reply.validate()?;
        Ok(ToolResult::ok(serde_json::to_string(&reply)?))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
