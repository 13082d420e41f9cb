//! Per-bucket rate limiting
//!
//! Fixed-window quota enforcement over a pluggable counter store:
//!
//! - **Memory backend**: per-key locked windows, single process
//! - **Redis backend**: Lua-scripted atomic increment, multi-instance
//!
//! Requests are classified into buckets (admin, auth, public, image) by a
//! static route mapping; each bucket carries its own limit, window, and
//! fail-open/closed policy for store outages. Responses get `X-RateLimit-*`
//! headers on success as well as on denial.

pub mod limiter;
pub mod lua_scripts;
pub mod memory;
pub mod middleware;
pub mod redis;
pub mod store;
pub mod types;

pub use limiter::RateLimiter;
pub use memory::MemoryCounterStore;
pub use middleware::{rate_limit_middleware, RateLimitState};
pub use redis::RedisCounterStore;
pub use store::{CounterStore, StoreError};
pub use types::{
    CounterRecord, FailMode, QuotaPolicy, QuotaSnapshot, RateLimitDecision, RateLimitKey,
    RouteBucket,
};
