use super::lua_scripts::FIXED_WINDOW_SCRIPT;
use super::store::{CounterStore, StoreError};
use super::types::{CounterRecord, RateLimitKey};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, Script};
use std::time::Duration;
use tracing::{debug, error};

/// Redis-backed fixed-window counter store, consistent across processes.
///
/// The increment runs as a Lua script so count and expiry move together
/// atomically. Every call is bounded by a timeout: a blocked Redis must
/// surface as `StoreError` and let the limiter apply its fail-open/closed
/// policy rather than stall the request pipeline.
pub struct RedisCounterStore {
    connection: ConnectionManager,
    script: Script,
    call_timeout: Duration,
}

impl RedisCounterStore {
    pub async fn new(redis_url: &str, call_timeout: Duration) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(redis_url)?;
        let connection = ConnectionManager::new(client).await?;

        Ok(Self {
            connection,
            script: Script::new(FIXED_WINDOW_SCRIPT),
            call_timeout,
        })
    }

    /// Test the Redis connection
    pub async fn ping(&self) -> Result<(), redis::RedisError> {
        let mut conn = self.connection.clone();
        redis::cmd("PING").query_async(&mut conn).await
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(
        &self,
        key: &RateLimitKey,
        limit: u32,
        window_secs: u64,
    ) -> Result<CounterRecord, StoreError> {
        let storage_key = key.storage_key();
        let mut conn = self.connection.clone();

        // The invocation must outlive the future it produces
        let mut invocation = self.script.key(&storage_key);
        invocation.arg(window_secs);
        let call = invocation.invoke_async::<_, Vec<i64>>(&mut conn);

        let result = tokio::time::timeout(self.call_timeout, call)
            .await
            .map_err(|_| StoreError::Timeout(self.call_timeout.as_millis() as u64))?;

        match result {
            Ok(values) if values.len() >= 2 => {
                let count = values[0].max(0) as u64;
                let reset_after = values[1].max(1) as u64;

                debug!(
                    key = %storage_key,
                    count,
                    reset_after,
                    "fixed window increment"
                );

                Ok(CounterRecord {
                    count,
                    limit,
                    window_secs,
                    reset_after,
                })
            }
            Ok(values) => Err(StoreError::Backend(format!(
                "unexpected script reply of {} values",
                values.len()
            ))),
            Err(e) => {
                error!(key = %storage_key, "redis error during counter increment: {}", e);
                Err(StoreError::Backend(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::types::RouteBucket;

    // These tests require a running Redis instance.
    // They are ignored by default. Run with: cargo test -- --ignored

    async fn create_test_store() -> Option<RedisCounterStore> {
        RedisCounterStore::new("redis://127.0.0.1:6379", Duration::from_millis(500))
            .await
            .ok()
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_fixed_window() {
        let store = create_test_store().await.expect("Failed to connect to Redis");

        let key = RateLimitKey::new(
            RouteBucket::Public,
            format!("test-fw-{}", rand::random::<u32>()),
        );

        for i in 1..=10u64 {
            let record = store.increment(&key, 10, 60).await.unwrap();
            assert_eq!(record.count, i);
            assert!(record.allowed(), "request {} should be allowed", i);
        }

        let record = store.increment(&key, 10, 60).await.unwrap();
        assert!(!record.allowed());
        assert_eq!(record.remaining(), 0);
        assert!(record.reset_after >= 1 && record.reset_after <= 60);
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_connection() {
        let store = create_test_store().await.expect("Failed to connect to Redis");
        assert!(store.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_redis_is_a_store_error() {
        // Connection refused fast enough on a closed local port
        let store = RedisCounterStore::new(
            "redis://127.0.0.1:1/", // port 1 is never a Redis
            Duration::from_millis(200),
        )
        .await;

        // ConnectionManager::new may itself fail; either way no panic
        if let Ok(store) = store {
            let key = RateLimitKey::new(RouteBucket::Public, "10.0.0.1");
            assert!(store.increment(&key, 10, 60).await.is_err());
        }
    }
}
