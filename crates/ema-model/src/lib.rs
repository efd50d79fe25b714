// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod client;
mod error;
mod mock;
mod openai_compat;
pub mod retry;
mod types;

use std::sync::Arc;

use anyhow::bail;
use ema_config::LlmConfig;

pub use client::LlmClient;
pub use error::LlmError;
pub use mock::{MockLlm, RecordedRequest, ScriptedLlm, ScriptedResponse, ScriptedTurn};
pub use openai_compat::OpenAiCompatClient;
pub use types::*;

/// Construct a shared [`LlmClient`] from configuration.
///
/// Selects the driver implementation based on `cfg.provider`:
/// - `"openai"`: any endpoint speaking the OpenAI chat-completions format
/// - `"mock"`: deterministic echo client for tests and dry runs
pub fn from_config(cfg: &LlmConfig) -> anyhow::Result<Arc<dyn LlmClient>> {
    match cfg.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiCompatClient::new(cfg))),
        "mock" => Ok(Arc::new(MockLlm)),
        other => bail!("unknown llm provider: {other}"),
    }
}
