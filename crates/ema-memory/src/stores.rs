// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::MemoryError;

/// A short-lived note attached to one actor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShortTermMemory {
    pub id: String,
    pub actor_id: i64,
    pub content: String,
    pub time: i64,
}

impl ShortTermMemory {
    pub fn new(actor_id: i64, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            actor_id,
            content: content.into(),
            time: Utc::now().timestamp_millis(),
        }
    }
}

/// A durable, keyword-indexed memory attached to one actor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LongTermMemory {
    pub id: String,
    pub actor_id: i64,
    pub content: String,
    pub keywords: Vec<String>,
    pub time: i64,
}

impl LongTermMemory {
    pub fn new(actor_id: i64, content: impl Into<String>, keywords: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            actor_id,
            content: content.into(),
            keywords,
            time: Utc::now().timestamp_millis(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResult {
    pub items: Vec<LongTermMemory>,
}

#[async_trait]
pub trait ShortTermStore: Send + Sync {
    async fn add(&self, memory: ShortTermMemory) -> Result<(), MemoryError>;
    async fn list(&self, actor_id: i64) -> Result<Vec<ShortTermMemory>, MemoryError>;
}

#[async_trait]
pub trait LongTermStore: Send + Sync {
    async fn add(&self, memory: LongTermMemory) -> Result<(), MemoryError>;
    /// Items owned by `actor_id` whose content or keywords contain any of
    /// the given keywords.
    async fn search(&self, actor_id: i64, keywords: &[String])
        -> Result<SearchResult, MemoryError>;
}

/// Process-local short-term store.
#[derive(Default)]
pub struct InMemoryShortTermStore {
    items: Mutex<Vec<ShortTermMemory>>,
}

impl InMemoryShortTermStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ShortTermStore for InMemoryShortTermStore {
    async fn add(&self, memory: ShortTermMemory) -> Result<(), MemoryError> {
        self.items.lock().await.push(memory);
        Ok(())
    }

    async fn list(&self, actor_id: i64) -> Result<Vec<ShortTermMemory>, MemoryError> {
        Ok(self
            .items
            .lock()
            .await
            .iter()
            .filter(|m| m.actor_id == actor_id)
            .cloned()
            .collect())
    }
}

/// Process-local long-term store with case-insensitive containment search.
#[derive(Default)]
pub struct InMemoryLongTermStore {
    items: Mutex<Vec<LongTermMemory>>,
}

impl InMemoryLongTermStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LongTermStore for InMemoryLongTermStore {
    async fn add(&self, memory: LongTermMemory) -> Result<(), MemoryError> {
        self.items.lock().await.push(memory);
        Ok(())
    }

    async fn search(
        &self,
        actor_id: i64,
        keywords: &[String],
    ) -> Result<SearchResult, MemoryError> {
        let needles: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
        let items = self
            .items
            .lock()
            .await
            .iter()
            .filter(|m| m.actor_id == actor_id)
            .filter(|m| {
                needles.iter().any(|needle| {
                    m.content.to_lowercase().contains(needle)
                        || m.keywords.iter().any(|k| k.to_lowercase().contains(needle))
                })
            })
            .cloned()
            .collect();
        Ok(SearchResult { items })
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn short_term_list_filters_by_actor() {
        let store = InMemoryShortTermStore::new();
        store.add(ShortTermMemory::new(1, "a")).await.unwrap();
        store.add(ShortTermMemory::new(2, "b")).await.unwrap();
        let listed = store.list(1).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].content, "a");
    }

    #[tokio::test]
    async fn search_matches_content_case_insensitively() {
        let store = InMemoryLongTermStore::new();
        store
            .add(LongTermMemory::new(1, "Likes green tea", vec![]))
            .await
            .unwrap();
        let result = store.search(1, &["TEA".to_string()]).await.unwrap();
        assert_eq!(result.items.len(), 1);
    }

    #[tokio::test]
    async fn search_matches_keywords() {
        let store = InMemoryLongTermStore::new();
        store
            .add(LongTermMemory::new(
                1,
                "conversation notes",
                vec!["birthday".into()],
            ))
            .await
            .unwrap();
        let result = store.search(1, &["birthday".to_string()]).await.unwrap();
        assert_eq!(result.items.len(), 1);
    }

    #[tokio::test]
    async fn search_is_scoped_to_the_actor() {
        let store = InMemoryLongTermStore::new();
        store
            .add(LongTermMemory::new(1, "tea", vec![]))
            .await
            .unwrap();
        let result = store.search(2, &["tea".to_string()]).await.unwrap();
        assert!(result.items.is_empty());
    }

    #[tokio::test]
    async fn search_with_no_keywords_matches_nothing() {
        let store = InMemoryLongTermStore::new();
        store
            .add(LongTermMemory::new(1, "tea", vec![]))
            .await
            .unwrap();
        let result = store.search(1, &[]).await.unwrap();
        assert!(result.items.is_empty());
    }

    #[test]
    fn records_get_unique_ids() {
        let a = ShortTermMemory::new(1, "x");
        let b = ShortTermMemory::new(1, "x");
        assert_ne!(a.id, b.id);
    }
}
