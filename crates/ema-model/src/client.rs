// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{LlmError, LlmResponse, Message, ToolSchema};

/// The adapter contract between the agent loop and a model provider.
///
/// Implementations translate the internal message shapes into the provider
/// wire format and back, wrap the transport with the configured retry
/// policy, and honour `cancel` so the agent observes an in-flight abort as
/// [`LlmError::Cancelled`].  A response without tool calls is a normal
/// terminal, never an error.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Human-readable driver name for status display.
    fn name(&self) -> &str;

    /// Model identifier as reported to users.
    fn model_name(&self) -> &str;

    async fn generate(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        system_prompt: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<LlmResponse, LlmError>;
}
