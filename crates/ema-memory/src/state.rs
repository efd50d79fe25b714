// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;

use ema_model::ActorId;

use crate::MemoryError;

/// Durable per-actor state blob.
///
/// The contract exists so edges can program against stable signatures; no
/// backend currently implements it.
#[async_trait]
pub trait ActorStateStore: Send + Sync {
    async fn get_state(&self, actor: ActorId) -> Result<serde_json::Value, MemoryError>;
    async fn update_state(
        &self,
        actor: ActorId,
        state: serde_json::Value,
    ) -> Result<(), MemoryError>;
}

/// Placeholder implementation: every call reports
/// [`MemoryError::Unimplemented`].
pub struct UnimplementedStateStore;

#[async_trait]
impl ActorStateStore for UnimplementedStateStore {
    async fn get_state(&self, _actor: ActorId) -> Result<serde_json::Value, MemoryError> {
        Err(MemoryError::Unimplemented("ActorStateStore::get_state"))
    }

    async fn update_state(
        &self,
        _actor: ActorId,
        _state: serde_json::Value,
    ) -> Result<(), MemoryError> {
        Err(MemoryError::Unimplemented("ActorStateStore::update_state"))
    }
}
