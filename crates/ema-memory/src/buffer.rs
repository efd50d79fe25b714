// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use ema_model::{join_contents, ActorId, Content};
use ema_tools::EmaReply;

use crate::MemoryError;

/// What one buffer entry records: either raw user input or a structured
/// reply the actor produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum BufferPayload {
    User { contents: Vec<Content> },
    Ema { reply: EmaReply },
}

impl BufferPayload {
    pub fn role_label(&self) -> &'static str {
        match self {
            Self::User { .. } => "user",
            Self::Ema { .. } => "ema",
        }
    }

    /// Human-readable text for prompt injection and transcripts.
    pub fn text(&self) -> String {
        match self {
            Self::User { contents } => join_contents(contents),
            Self::Ema { reply } => reply.response.clone(),
        }
    }
}

/// One persisted log entry.  `id` is the per-actor sequence number assigned
/// by the store; `time` is epoch milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BufferMessage {
    pub id: i64,
    pub name: String,
    pub time: i64,
    pub message: BufferPayload,
}

/// Append-only store of buffer messages keyed by actor identity.
/// Ordering is preserved; callers serialise concurrent appends.
#[async_trait]
pub trait MessageBuffer: Send + Sync {
    async fn append(
        &self,
        actor: ActorId,
        name: &str,
        payload: BufferPayload,
    ) -> Result<BufferMessage, MemoryError>;

    /// The last `limit` messages in append order.
    async fn recent(&self, actor: ActorId, limit: usize) -> Result<Vec<BufferMessage>, MemoryError>;

    async fn all(&self, actor: ActorId) -> Result<Vec<BufferMessage>, MemoryError>;
}

/// Process-local buffer implementation.
#[derive(Default)]
pub struct InMemoryBuffer {
    entries: Mutex<HashMap<ActorId, Vec<BufferMessage>>>,
}

impl InMemoryBuffer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageBuffer for InMemoryBuffer {
    async fn append(
        &self,
        actor: ActorId,
        name: &str,
        payload: BufferPayload,
    ) -> Result<BufferMessage, MemoryError> {
        let mut entries = self.entries.lock().await;
        let log = entries.entry(actor).or_default();
        let message = BufferMessage {
            id: log.len() as i64 + 1,
            name: name.to_string(),
            time: Utc::now().timestamp_millis(),
            message: payload,
        };
        log.push(message.clone());
        Ok(message)
    }

    async fn recent(
        &self,
        actor: ActorId,
        limit: usize,
    ) -> Result<Vec<BufferMessage>, MemoryError> {
        let entries = self.entries.lock().await;
        let log = entries.get(&actor).map(Vec::as_slice).unwrap_or_default();
        let start = log.len().saturating_sub(limit);
        Ok(log[start..].to_vec())
    }

    async fn all(&self, actor: ActorId) -> Result<Vec<BufferMessage>, MemoryError> {
        let entries = self.entries.lock().await;
        Ok(entries.get(&actor).cloned().unwrap_or_default())
    }
}

/// Format buffer messages for `{MEMORY_BUFFER}` prompt injection, one per
/// line.  An empty slice renders as `"None."`.
pub fn format_buffer_lines(messages: &[BufferMessage]) -> String {
    if messages.is_empty() {
        return "None.".to_string();
    }
    messages
        .iter()
        .map(|m| {
            let timestamp = Utc
                .timestamp_millis_opt(m.time)
                .single()
                .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "????-??-?? ??:??:??".to_string());
            format!(
                "- [{timestamp}][role:{}][id:{}][name:{}] {}",
                m.message.role_label(),
                m.id,
                m.name,
                m.message.text()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
