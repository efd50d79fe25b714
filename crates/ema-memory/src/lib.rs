// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod buffer;
mod state;
mod stores;

use thiserror::Error;

pub use buffer::{format_buffer_lines, BufferMessage, BufferPayload, InMemoryBuffer, MessageBuffer};
pub use state::{ActorStateStore, UnimplementedStateStore};
pub use stores::{
    InMemoryLongTermStore, InMemoryShortTermStore, LongTermMemory, LongTermStore, SearchResult,
    ShortTermMemory, ShortTermStore,
};

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("store error: {0}")]
    Store(String),

    #[error("{0} is not implemented")]
    Unimplemented(&'static str),
}
