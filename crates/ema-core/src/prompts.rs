// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use ema_memory::{format_buffer_lines, BufferMessage};

/// Placeholder expanded with recent buffer messages before each run.
pub const MEMORY_BUFFER_PLACEHOLDER: &str = "{MEMORY_BUFFER}";

/// Expand every `{MEMORY_BUFFER}` placeholder in a system prompt template
/// with the formatted recent buffer messages.
pub fn expand_memory_buffer(template: &str, recent: &[BufferMessage]) -> String {
    if !template.contains(MEMORY_BUFFER_PLACEHOLDER) {
        return template.to_string();
    }
    template.replace(MEMORY_BUFFER_PLACEHOLDER, &format_buffer_lines(recent))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
