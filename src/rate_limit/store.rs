use super::types::{CounterRecord, RateLimitKey};
use async_trait::async_trait;
use thiserror::Error;

/// Counter store failure, resolved by the limiter's per-bucket fail mode
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(String),

    #[error("store call timed out after {0} ms")]
    Timeout(u64),
}

/// Atomic fixed-window counter.
///
/// `increment` bumps the counter for `key` within its current window, creating
/// the window if absent or expired, and reports the resulting state. The
/// increment and the limit comparison happen against the post-increment count,
/// so two concurrent requests at `count = limit - 1` observe `limit` and
/// `limit + 1` respectively and exactly one is allowed.
///
/// Fixed windows reset at window boundaries rather than sliding; a client can
/// burst up to roughly twice the nominal limit across a boundary. This is an
/// accepted trade-off for deterministic, cheap accounting.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn increment(
        &self,
        key: &RateLimitKey,
        limit: u32,
        window_secs: u64,
    ) -> Result<CounterRecord, StoreError>;
}
