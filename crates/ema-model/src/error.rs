use thiserror::Error;

/// Failure modes of one LLM call, as seen by the agent loop.
///
/// `Cancelled` is terminal and never retried; `RetryExhausted` is produced
/// by the retry wrapper after its attempt budget is spent; everything else
/// surfaces as `Adapter`.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("cancelled")]
    Cancelled,

    #[error("retry exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted { attempts: u32, last_error: String },

    #[error("adapter error: {0:#}")]
    Adapter(#[from] anyhow::Error),
}

impl LlmError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
