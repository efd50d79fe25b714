// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Bounded-attempt retry with exponential backoff.
//!
//! Wraps any async operation that yields `Result<T, LlmError>`.
//! Cancellation is observed before every attempt and during backoff sleeps;
//! a `Cancelled` result short-circuits immediately and is never retried.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::LlmError;

pub use ema_config::RetryConfig;

/// Run `op` up to `retry.attempts` times.
///
/// `op` receives the 1-based attempt number.  After the final failed attempt
/// the error is folded into [`LlmError::RetryExhausted`] carrying the attempt
/// count and the last cause.  When the policy is disabled the operation runs
/// exactly once and its error passes through untouched.
pub async fn with_retry<T, F, Fut>(
    retry: &RetryConfig,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, LlmError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    if !retry.enabled {
        return op(1).await;
    }

    let attempts = retry.attempts.max(1);
    let max_delay = Duration::from_millis(retry.max_delay_ms);
    let mut delay = Duration::from_millis(retry.base_delay_ms).min(max_delay);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        if cancel.is_cancelled() {
            return Err(LlmError::Cancelled);
        }
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(LlmError::Cancelled) => return Err(LlmError::Cancelled),
            Err(e) => {
                warn!(attempt, attempts, error = %e, "llm call failed");
                last_error = e.to_string();
            }
        }
        if attempt < attempts {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(LlmError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            delay = (delay * 2).min(max_delay);
        }
    }

    Err(LlmError::RetryExhausted {
        attempts,
        last_error,
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
