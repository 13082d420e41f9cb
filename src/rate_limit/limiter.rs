use super::store::CounterStore;
use super::types::{
    FailMode, QuotaPolicy, QuotaSnapshot, RateLimitDecision, RateLimitKey, RouteBucket,
};
use crate::error::{GuardError, Result};
use crate::metrics::{record_rate_limit_denied, record_store_failure};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Per-bucket quota enforcement over a counter store.
///
/// Holds no mutable state of its own; the store is the only shared mutable
/// resource, and per-key ordering comes from its atomicity guarantee.
pub struct RateLimiter {
    policies: HashMap<RouteBucket, QuotaPolicy>,
    store: Arc<dyn CounterStore>,
}

impl RateLimiter {
    /// Build the limiter, verifying every reachable bucket has a policy.
    /// A missing or degenerate policy is fatal at startup.
    pub fn new(
        policies: HashMap<RouteBucket, QuotaPolicy>,
        store: Arc<dyn CounterStore>,
    ) -> Result<Self> {
        for bucket in RouteBucket::ALL {
            let policy = policies
                .get(&bucket)
                .ok_or_else(|| GuardError::PolicyMissing(bucket.to_string()))?;
            if policy.limit == 0 {
                return Err(GuardError::Config(format!(
                    "quota limit must be > 0 for bucket: {}",
                    bucket
                )));
            }
            if policy.window_secs == 0 {
                return Err(GuardError::Config(format!(
                    "quota window must be > 0 for bucket: {}",
                    bucket
                )));
            }
        }

        Ok(Self { policies, store })
    }

    pub fn policy(&self, bucket: RouteBucket) -> &QuotaPolicy {
        // Presence for every bucket is checked in the constructor
        &self.policies[&bucket]
    }

    /// Account one request against the bucket's quota and decide.
    pub async fn check(&self, bucket: RouteBucket, client: &str) -> RateLimitDecision {
        let policy = self.policy(bucket);
        let key = RateLimitKey::new(bucket, client);

        match self
            .store
            .increment(&key, policy.limit, policy.window_secs)
            .await
        {
            Ok(record) => {
                let snapshot = QuotaSnapshot::from(&record);
                if record.allowed() {
                    RateLimitDecision::Allowed {
                        snapshot: Some(snapshot),
                    }
                } else {
                    warn!(bucket = %bucket, client = %client, "rate limit exceeded");
                    record_rate_limit_denied(bucket.as_str());
                    RateLimitDecision::Denied {
                        retry_after: record.reset_after,
                        snapshot: Some(snapshot),
                    }
                }
            }
            Err(e) => {
                record_store_failure();
                match policy.fail_mode {
                    FailMode::Open => {
                        warn!(
                            bucket = %bucket,
                            "counter store unavailable ({}), failing open", e
                        );
                        // No snapshot: we must not claim a quota the store
                        // could not report.
                        RateLimitDecision::Allowed { snapshot: None }
                    }
                    FailMode::Closed => {
                        warn!(
                            bucket = %bucket,
                            "counter store unavailable ({}), failing closed", e
                        );
                        RateLimitDecision::Denied {
                            retry_after: policy.window_secs,
                            snapshot: None,
                        }
                    }
                }
            }
        }
    }
}
