use super::store::{CounterStore, StoreError};
use super::types::{CounterRecord, RateLimitKey};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::debug;

/// How often the stale-key sweep may run, at minimum
const GC_MIN_INTERVAL_SECS: u64 = 60;

/// One client's fixed window
#[derive(Debug)]
struct WindowSlot {
    window_start: Instant,
    window_secs: u64,
    count: u64,
}

/// In-process fixed-window counter store.
///
/// Each key owns a `WindowSlot` behind its own mutex, so increment-and-compare
/// is serialized per key while different keys proceed independently. Correct
/// within a single process only; horizontally scaled deployments need the
/// shared backend.
pub struct MemoryCounterStore {
    slots: DashMap<String, Arc<Mutex<WindowSlot>>>,
    /// Next time the stale-key sweep may run
    gc_next: Mutex<Instant>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
            gc_next: Mutex::new(Instant::now()),
        }
    }

    /// Drop slots whose window has fully expired, keeping memory bounded
    /// under churning client addresses. Runs at most once per
    /// `max(GC_MIN_INTERVAL_SECS, window_secs)`.
    async fn maybe_sweep(&self, now: Instant, window_secs: u64) {
        let mut next = self.gc_next.lock().await;
        if now < *next {
            return;
        }
        *next = now + std::time::Duration::from_secs(GC_MIN_INTERVAL_SECS.max(window_secs));
        drop(next);

        let before = self.slots.len();
        self.slots.retain(|_, slot| match slot.try_lock() {
            Ok(guard) => {
                now.duration_since(guard.window_start).as_secs() < guard.window_secs
            }
            // Contended slots are in active use
            Err(_) => true,
        });
        let swept = before.saturating_sub(self.slots.len());
        if swept > 0 {
            debug!(swept, "swept expired rate limit windows");
        }
    }

    /// Number of live window slots (for testing/monitoring)
    pub fn active_slots(&self) -> usize {
        self.slots.len()
    }
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(
        &self,
        key: &RateLimitKey,
        limit: u32,
        window_secs: u64,
    ) -> Result<CounterRecord, StoreError> {
        let now = Instant::now();
        self.maybe_sweep(now, window_secs).await;

        let slot = self
            .slots
            .entry(key.storage_key())
            .or_insert_with(|| {
                Arc::new(Mutex::new(WindowSlot {
                    window_start: now,
                    window_secs,
                    count: 0,
                }))
            })
            .clone();

        let mut slot = slot.lock().await;

        let elapsed = now.duration_since(slot.window_start).as_secs();
        if elapsed >= slot.window_secs {
            // Window boundary: the next request opens a fresh epoch
            slot.window_start = now;
            slot.window_secs = window_secs;
            slot.count = 0;
        }

        slot.count += 1;

        let elapsed = now.duration_since(slot.window_start).as_secs();
        let reset_after = slot.window_secs.saturating_sub(elapsed).max(1);

        Ok(CounterRecord {
            count: slot.count,
            limit,
            window_secs: slot.window_secs,
            reset_after,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::types::RouteBucket;
    use std::time::Duration;

    fn key(client: &str) -> RateLimitKey {
        RateLimitKey::new(RouteBucket::Public, client)
    }

    #[tokio::test]
    async fn test_counts_monotonic_within_window() {
        let store = MemoryCounterStore::new();
        let k = key("192.168.1.1");

        for expected in 1..=5u64 {
            let record = store.increment(&k, 10, 60).await.unwrap();
            assert_eq!(record.count, expected);
            assert!(record.allowed());
            assert_eq!(record.remaining(), 10 - expected);
        }
    }

    #[tokio::test]
    async fn test_nth_allowed_n_plus_first_denied() {
        let store = MemoryCounterStore::new();
        let k = key("192.168.1.2");

        for _ in 0..5 {
            let record = store.increment(&k, 5, 60).await.unwrap();
            assert!(record.allowed());
        }

        let record = store.increment(&k, 5, 60).await.unwrap();
        assert!(!record.allowed());
        assert_eq!(record.count, 6);
        assert_eq!(record.remaining(), 0);
        assert!(record.reset_after >= 1 && record.reset_after <= 60);
    }

    #[tokio::test]
    async fn test_window_reset() {
        let store = MemoryCounterStore::new();
        let k = key("192.168.1.3");

        for _ in 0..2 {
            assert!(store.increment(&k, 2, 1).await.unwrap().allowed());
        }
        assert!(!store.increment(&k, 2, 1).await.unwrap().allowed());

        tokio::time::sleep(Duration::from_millis(1100)).await;

        let record = store.increment(&k, 2, 1).await.unwrap();
        assert!(record.allowed());
        assert_eq!(record.count, 1);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let store = MemoryCounterStore::new();
        let k1 = key("192.168.1.4");
        let k2 = key("192.168.1.5");

        for _ in 0..2 {
            assert!(store.increment(&k1, 2, 60).await.unwrap().allowed());
        }
        assert!(!store.increment(&k1, 2, 60).await.unwrap().allowed());

        assert!(store.increment(&k2, 2, 60).await.unwrap().allowed());
        assert_eq!(store.active_slots(), 2);
    }

    #[tokio::test]
    async fn test_last_unit_race_single_allow() {
        let store = Arc::new(MemoryCounterStore::new());
        let k = key("192.168.1.6");

        // Burn down to count = limit - 1
        for _ in 0..4 {
            assert!(store.increment(&k, 5, 60).await.unwrap().allowed());
        }

        let a = {
            let store = store.clone();
            let k = k.clone();
            tokio::spawn(async move { store.increment(&k, 5, 60).await.unwrap().allowed() })
        };
        let b = {
            let store = store.clone();
            let k = k.clone();
            tokio::spawn(async move { store.increment(&k, 5, 60).await.unwrap().allowed() })
        };

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert!(a ^ b, "exactly one of the two concurrent requests must be allowed");
    }

    #[tokio::test]
    async fn test_bucket_namespacing() {
        let store = MemoryCounterStore::new();
        let admin = RateLimitKey::new(RouteBucket::Admin, "10.0.0.1");
        let public = RateLimitKey::new(RouteBucket::Public, "10.0.0.1");

        assert!(store.increment(&admin, 1, 60).await.unwrap().allowed());
        assert!(!store.increment(&admin, 1, 60).await.unwrap().allowed());

        // Same address, different bucket: fresh counter
        assert!(store.increment(&public, 1, 60).await.unwrap().allowed());
    }
}
