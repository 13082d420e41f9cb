use crate::client_ip::TrustedProxies;
use crate::error::{GuardError, Result};
use crate::rate_limit::types::{FailMode, QuotaPolicy, RouteBucket};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Main defense pipeline configuration.
///
/// Loaded once at process start and read-only thereafter; changing it means
/// a restart, there is no reload path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Proxy trust configuration
    #[serde(default)]
    pub proxy: ProxyConfig,
    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
    /// Security filter configuration
    #[serde(default)]
    pub security: SecurityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Proxy trust configuration for client identity resolution
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProxyConfig {
    /// When true, honor X-Forwarded-For / X-Real-IP from trusted peers
    #[serde(default)]
    pub enable_proxy_headers: bool,
    /// Trusted proxy addresses (IPs or CIDR ranges)
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
}

/// Counter store backend selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Redis,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Backend for the counter store
    #[serde(default)]
    pub backend: StoreBackend,
    /// Redis connection URL (redis backend only)
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    /// Bound on a single shared-store call, in milliseconds
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
    /// Quota policy per bucket; every reachable bucket must appear
    #[serde(default = "default_bucket_policies")]
    pub buckets: HashMap<RouteBucket, QuotaPolicy>,
}

/// Security filter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// User-Agent substrings that are rejected (case-insensitive)
    #[serde(default = "default_blocked_user_agents")]
    pub blocked_user_agents: Vec<String>,
    /// User-Agent substrings that bypass the denylist
    #[serde(default)]
    pub allowed_user_agents: Vec<String>,
    /// Regexes applied to path/query/body on sensitive prefixes (/admin, /auth)
    #[serde(default = "default_sensitive_patterns")]
    pub sensitive_patterns: Vec<String>,
    /// Conservative regex subset for public API query strings
    #[serde(default = "default_public_query_patterns")]
    pub public_query_patterns: Vec<String>,
    /// Path prefixes that skip deep scanning (static assets, docs)
    #[serde(default = "default_allowed_path_prefixes")]
    pub allowed_path_prefixes: Vec<String>,
    /// Largest request body prefix fed to the injection scan, in bytes
    #[serde(default = "default_max_body_scan_bytes")]
    pub max_body_scan_bytes: usize,
    /// Attach a per-response nonce to the CSP script-src
    #[serde(default = "default_true")]
    pub csp_enable_nonce: bool,
    /// Add 'strict-dynamic' to script-src (only meaningful with a nonce)
    #[serde(default)]
    pub csp_enable_strict_dynamic: bool,
    /// Emit Strict-Transport-Security (only behind TLS)
    #[serde(default)]
    pub enable_hsts: bool,
}

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_redis_url() -> String {
    "redis://redis:6379/0".to_string()
}

fn default_store_timeout_ms() -> u64 {
    500
}

fn default_bucket_policies() -> HashMap<RouteBucket, QuotaPolicy> {
    let mut map = HashMap::new();
    map.insert(
        RouteBucket::Admin,
        QuotaPolicy {
            limit: 2000,
            window_secs: 60,
            fail_mode: FailMode::Closed,
        },
    );
    map.insert(
        RouteBucket::Auth,
        QuotaPolicy {
            limit: 50,
            window_secs: 60,
            fail_mode: FailMode::Closed,
        },
    );
    map.insert(
        RouteBucket::Public,
        QuotaPolicy {
            limit: 1000,
            window_secs: 60,
            fail_mode: FailMode::Open,
        },
    );
    map.insert(
        RouteBucket::Image,
        QuotaPolicy {
            limit: 10000,
            window_secs: 60,
            fail_mode: FailMode::Open,
        },
    );
    map
}

fn default_blocked_user_agents() -> Vec<String> {
    ["sqlmap", "nikto", "nmap", "scanner", "bot", "crawler", "spider"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_sensitive_patterns() -> Vec<String> {
    [
        r"\.\./",
        r"\.\.\\",
        r"\bunion\s+select\b",
        r"\bdrop\s+table\b",
        r"\bor\s+1\s*=\s*1\b",
        r"\bexec\s*\(",
        r"\bsystem\s*\(",
        r"\brm\s+\-\w*\b",
        r"\b(cat|ls|bash|sh|nc)\b\s",
        r"`[^`]+`",
        r"\$\([^)]*\)",
        r"\|\s*(cat|ls|bash|sh|nc)\b",
        r"/etc/passwd",
        r"/etc/shadow",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_public_query_patterns() -> Vec<String> {
    [
        r"\bunion\s+select\b",
        r"\bdrop\s+table\b",
        r"\bor\s+1\s*=\s*1\b",
        r"\bexec\s*\(",
        r"\bsystem\s*\(",
        r"`[^`]+`",
        r"\$\([^)]*\)",
        r"\|\s*(cat|ls|bash|sh|nc)\b",
        r"\.\./",
        r"\.\.\\",
        r"%2e%2e%2f",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_allowed_path_prefixes() -> Vec<String> {
    ["/static", "/public/static", "/images", "/docs", "/redoc", "/openapi"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_max_body_scan_bytes() -> usize {
    64 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            redis_url: default_redis_url(),
            store_timeout_ms: default_store_timeout_ms(),
            buckets: default_bucket_policies(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            blocked_user_agents: default_blocked_user_agents(),
            allowed_user_agents: Vec::new(),
            sensitive_patterns: default_sensitive_patterns(),
            public_query_patterns: default_public_query_patterns(),
            allowed_path_prefixes: default_allowed_path_prefixes(),
            max_body_scan_bytes: default_max_body_scan_bytes(),
            csp_enable_nonce: true,
            csp_enable_strict_dynamic: false,
            enable_hsts: false,
        }
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            proxy: ProxyConfig::default(),
            rate_limiting: RateLimitingConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

impl GuardConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| GuardError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| GuardError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Validate configuration. Fatal at startup on any violation.
    pub fn validate(&self) -> Result<()> {
        // Every reachable bucket must resolve to exactly one sane policy
        for bucket in RouteBucket::ALL {
            let policy = self
                .rate_limiting
                .buckets
                .get(&bucket)
                .ok_or_else(|| GuardError::PolicyMissing(bucket.to_string()))?;

            if policy.limit == 0 {
                return Err(GuardError::Config(format!(
                    "rate limit must be > 0 for bucket: {}",
                    bucket
                )));
            }
            if policy.window_secs == 0 {
                return Err(GuardError::Config(format!(
                    "rate limit window must be > 0 for bucket: {}",
                    bucket
                )));
            }
        }

        if self.rate_limiting.store_timeout_ms == 0 {
            return Err(GuardError::Config(
                "store_timeout_ms must be > 0".to_string(),
            ));
        }

        if self.rate_limiting.backend == StoreBackend::Redis
            && self.rate_limiting.redis_url.is_empty()
        {
            return Err(GuardError::Config(
                "redis backend selected but redis_url is empty".to_string(),
            ));
        }

        // Trusted proxy entries must parse (IP or CIDR)
        TrustedProxies::parse(&self.proxy.trusted_proxies)?;

        // Threat patterns must compile
        for pattern in self
            .security
            .sensitive_patterns
            .iter()
            .chain(self.security.public_query_patterns.iter())
        {
            regex::RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| GuardError::InvalidPattern(pattern.clone(), e.to_string()))?;
        }

        Ok(())
    }
}
