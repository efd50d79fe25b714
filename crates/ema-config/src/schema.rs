// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// Serde default helper — returns `true`.
///
/// `#[serde(default)]` on a `bool` always falls back to `bool::default()`
/// (i.e. `false`), so fields that should be enabled unless the user turns
/// them off need a named function.
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub actor: ActorConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

/// Per-actor behaviour: prompt template, buffer injection, display names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorConfig {
    /// System prompt template.  Every `{MEMORY_BUFFER}` placeholder is
    /// expanded with the most recent buffer messages before each run.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// How many trailing buffer messages are injected into the prompt.
    #[serde(default = "default_buffer_window")]
    pub buffer_window: usize,
    /// Name recorded on buffer entries written for incoming user input.
    #[serde(default = "default_user_name")]
    pub user_name: String,
    /// Name recorded on buffer entries written for structured replies.
    #[serde(default = "default_actor_name")]
    pub actor_name: String,
}

fn default_system_prompt() -> String {
    "You are a conversational actor. Reply to the user by calling the \
     ema_reply tool exactly once.\n\nRecent conversation:\n{MEMORY_BUFFER}"
        .to_string()
}

fn default_buffer_window() -> usize {
    10
}

fn default_user_name() -> String {
    "user".to_string()
}

fn default_actor_name() -> String {
    "ema".to_string()
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            buffer_window: default_buffer_window(),
            user_name: default_user_name(),
            actor_name: default_actor_name(),
        }
    }
}

/// Agent main-loop bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum loop iterations (LLM call + tool batch) per run.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    /// Token ceiling above which the history is summarised before the next
    /// model call.
    #[serde(default = "default_token_limit")]
    pub token_limit: u64,
}

fn default_max_steps() -> u32 {
    20
}

fn default_token_limit() -> u64 {
    100_000
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            token_limit: default_token_limit(),
        }
    }
}

/// LLM adapter selection and transport knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Adapter identifier: "openai" (any OpenAI-compatible endpoint) or
    /// "mock" (deterministic echo client, tests and dry runs).
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Model name forwarded to the provider API.
    #[serde(default = "default_model_name")]
    pub name: String,
    /// Environment variable that holds the API key (read at runtime).
    pub api_key_env: Option<String>,
    /// Explicit API key; prefer `api_key_env` in config files so secrets
    /// stay out of version control.
    pub api_key: Option<String>,
    /// Base URL override, e.g. a local llama.cpp or LiteLLM proxy.
    pub base_url: Option<String>,
    /// Maximum tokens to request in a single completion.
    pub max_tokens: Option<u32>,
    /// Sampling temperature (0.0–2.0).
    pub temperature: Option<f32>,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model_name() -> String {
    "gpt-4o-mini".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            name: default_model_name(),
            api_key_env: None,
            api_key: None,
            base_url: None,
            max_tokens: None,
            temperature: None,
            retry: RetryConfig::default(),
        }
    }
}

/// Bounded-retry policy for LLM calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Total attempts, including the first one.
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    /// Delay before the second attempt; doubles on each further attempt.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Ceiling for the doubling backoff.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    10_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            attempts: default_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
