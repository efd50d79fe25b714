// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::Value;

use ema_model::ToolResult;

/// Keyed argument map handed to [`Tool::execute`].
///
/// Arguments arrive by name, never positionally; the JSON object from the
/// model's tool call is passed through as-is.
pub type ToolArgs = serde_json::Map<String, Value>;

/// Trait that every tool available to an agent must implement.
///
/// Tools are free to block and do not receive cancellation; the agent loop
/// checks its abort flag between tool calls, not inside them.  An `Err`
/// return is converted by the agent into a failed [`ToolResult`] carrying
/// the tool name and the error chain; it never terminates the run.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for the parameters object.
    fn parameters_schema(&self) -> Value;
    async fn execute(&self, args: &ToolArgs) -> anyhow::Result<ToolResult>;
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
