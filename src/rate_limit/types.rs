use http::Method;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Quota group a request is accounted under
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RouteBucket {
    /// Admin APIs - strict limits
    Admin,
    /// Authentication endpoints (login attempts)
    Auth,
    /// Public read APIs - moderate limits
    Public,
    /// Public image downloads - soft limit against mass download
    Image,
}

impl RouteBucket {
    /// All buckets that can be reached by the classifier. Every one of these
    /// must have a quota policy configured.
    pub const ALL: [RouteBucket; 4] = [
        RouteBucket::Admin,
        RouteBucket::Auth,
        RouteBucket::Public,
        RouteBucket::Image,
    ];

    /// Classify a request into a bucket from its method and path.
    ///
    /// The mapping is static and mirrors the route layout of the menu service:
    /// `/admin/*`, `/auth/*`, `/public/*`, and `GET /images/*`. Static files
    /// and anything else are not quota-accounted.
    pub fn classify(method: &Method, path: &str) -> Option<Self> {
        if path.starts_with("/admin/") {
            Some(RouteBucket::Admin)
        } else if path.starts_with("/auth/") {
            Some(RouteBucket::Auth)
        } else if path.starts_with("/public/") {
            Some(RouteBucket::Public)
        } else if *method == Method::GET && path.starts_with("/images/") {
            Some(RouteBucket::Image)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteBucket::Admin => "admin",
            RouteBucket::Auth => "auth",
            RouteBucket::Public => "public",
            RouteBucket::Image => "image",
        }
    }
}

impl fmt::Display for RouteBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Behavior when the counter store is unreachable
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FailMode {
    /// Let the request through (anonymous read traffic)
    Open,
    /// Reject the request (write/admin routes keep abuse protection)
    Closed,
}

/// Quota parameters for one bucket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaPolicy {
    /// Maximum number of requests allowed per window
    pub limit: u32,
    /// Window length in seconds (fixed window)
    pub window_secs: u64,
    /// What to do when the counter store cannot answer
    pub fail_mode: FailMode,
}

impl QuotaPolicy {
    /// Get the window as a Duration
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Rate limit subject key: client address namespaced by bucket
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    pub bucket: RouteBucket,
    /// Resolved client address
    pub client: String,
}

impl RateLimitKey {
    pub fn new(bucket: RouteBucket, client: impl Into<String>) -> Self {
        Self {
            bucket,
            client: client.into(),
        }
    }

    /// Convert to the counter store key
    pub fn storage_key(&self) -> String {
        format!("guard:rl:{}:{}", self.bucket.as_str(), self.client)
    }
}

/// State of a counter after an increment
#[derive(Debug, Clone)]
pub struct CounterRecord {
    /// Count within the current window, including this request
    pub count: u64,
    /// Limit the count was compared against
    pub limit: u32,
    /// Window length in seconds
    pub window_secs: u64,
    /// Seconds until the current window expires
    pub reset_after: u64,
}

impl CounterRecord {
    /// Whether the increment that produced this record fit under the limit
    pub fn allowed(&self) -> bool {
        self.count <= u64::from(self.limit)
    }

    /// Requests left in the current window
    pub fn remaining(&self) -> u64 {
        u64::from(self.limit).saturating_sub(self.count)
    }
}

/// Quota state attached to responses as `X-RateLimit-*` headers
#[derive(Debug, Clone, Copy)]
pub struct QuotaSnapshot {
    pub limit: u32,
    pub window_secs: u64,
    pub remaining: u64,
    pub reset_after: u64,
}

impl From<&CounterRecord> for QuotaSnapshot {
    fn from(record: &CounterRecord) -> Self {
        Self {
            limit: record.limit,
            window_secs: record.window_secs,
            remaining: record.remaining(),
            reset_after: record.reset_after,
        }
    }
}

/// Outcome of a rate limit check, consumed once to build the response
#[derive(Debug, Clone)]
pub enum RateLimitDecision {
    /// Request may proceed; snapshot is `None` when the store failed open
    /// (no headers claiming a quota the store could not report).
    Allowed { snapshot: Option<QuotaSnapshot> },
    /// Request is rejected with a 429
    Denied {
        retry_after: u64,
        snapshot: Option<QuotaSnapshot>,
    },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_classification() {
        assert_eq!(
            RouteBucket::classify(&Method::GET, "/admin/items"),
            Some(RouteBucket::Admin)
        );
        assert_eq!(
            RouteBucket::classify(&Method::POST, "/auth/login"),
            Some(RouteBucket::Auth)
        );
        assert_eq!(
            RouteBucket::classify(&Method::GET, "/public/menu"),
            Some(RouteBucket::Public)
        );
        assert_eq!(
            RouteBucket::classify(&Method::GET, "/images/42"),
            Some(RouteBucket::Image)
        );
        // Only GET is image-bucketed; writes to /images fall through
        assert_eq!(RouteBucket::classify(&Method::POST, "/images/42"), None);
        assert_eq!(RouteBucket::classify(&Method::GET, "/static/app.css"), None);
        assert_eq!(RouteBucket::classify(&Method::GET, "/"), None);
    }

    #[test]
    fn test_storage_key() {
        let key = RateLimitKey::new(RouteBucket::Admin, "192.168.1.1");
        assert_eq!(key.storage_key(), "guard:rl:admin:192.168.1.1");

        let key = RateLimitKey::new(RouteBucket::Image, "2001:db8::1");
        assert_eq!(key.storage_key(), "guard:rl:image:2001:db8::1");
    }

    #[test]
    fn test_counter_record_accounting() {
        let record = CounterRecord {
            count: 5,
            limit: 5,
            window_secs: 60,
            reset_after: 30,
        };
        assert!(record.allowed());
        assert_eq!(record.remaining(), 0);

        let record = CounterRecord {
            count: 6,
            limit: 5,
            window_secs: 60,
            reset_after: 30,
        };
        assert!(!record.allowed());
        assert_eq!(record.remaining(), 0);
    }

    #[test]
    fn test_snapshot_from_record() {
        let record = CounterRecord {
            count: 2,
            limit: 10,
            window_secs: 60,
            reset_after: 58,
        };
        let snapshot = QuotaSnapshot::from(&record);
        assert_eq!(snapshot.limit, 10);
        assert_eq!(snapshot.remaining, 8);
        assert_eq!(snapshot.reset_after, 58);
    }
}
