use crate::config::SecurityConfig;
use crate::error::{GuardError, Result};
use axum::http::StatusCode;
use http::{HeaderMap, Method};
use percent_encoding::percent_decode_str;
use regex::{Regex, RegexBuilder};

/// Methods the application ever uses; everything else is rejected outright
const ALLOWED_METHODS: [&str; 7] = ["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS"];

/// Why a request was rejected by the security filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    MethodNotAllowed,
    SuspiciousAgent,
    MaliciousPattern,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::MethodNotAllowed => "method_not_allowed",
            ViolationKind::SuspiciousAgent => "suspicious_agent",
            ViolationKind::MaliciousPattern => "malicious_pattern",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ViolationKind::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ViolationKind::SuspiciousAgent => StatusCode::FORBIDDEN,
            ViolationKind::MaliciousPattern => StatusCode::FORBIDDEN,
        }
    }

    /// Generic body; the offending payload is never echoed back
    pub fn body(&self) -> &'static str {
        match self {
            ViolationKind::MethodNotAllowed => "Method not allowed",
            ViolationKind::SuspiciousAgent | ViolationKind::MaliciousPattern => "Access denied",
        }
    }
}

/// A matched threat rule. Carries the rule identifier for logs, never the
/// matched input.
#[derive(Debug, Clone)]
pub struct Violation {
    pub kind: ViolationKind,
    /// Identifier of the violated rule (pattern source or token)
    pub rule: String,
}

/// One compiled injection rule
#[derive(Debug)]
struct ThreatRule {
    raw: String,
    regex: Regex,
}

impl ThreatRule {
    fn compile(pattern: &str) -> Result<Self> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| GuardError::InvalidPattern(pattern.to_string(), e.to_string()))?;
        Ok(Self {
            raw: pattern.to_string(),
            regex,
        })
    }

    fn matches(&self, input: &str) -> bool {
        self.regex.is_match(input)
    }
}

/// Pattern-based request inspection.
///
/// All rule sets are compiled once at startup and evaluated read-only per
/// request, in a fixed order with first-match-wins semantics:
/// method allow-list, then User-Agent denylist, then the injection scan over
/// path, query, and body prefix.
pub struct SecurityFilter {
    blocked_agents: Vec<String>,
    allowed_agents: Vec<String>,
    /// Full rule set, applied on sensitive prefixes (/admin, /auth)
    sensitive_rules: Vec<ThreatRule>,
    /// Conservative subset for public API query strings
    public_query_rules: Vec<ThreatRule>,
    /// Prefixes that skip deep scanning entirely
    allowed_prefixes: Vec<String>,
    max_body_scan_bytes: usize,
}

impl SecurityFilter {
    pub fn new(config: &SecurityConfig) -> Result<Self> {
        let sensitive_rules: Result<Vec<_>> = config
            .sensitive_patterns
            .iter()
            .map(|p| ThreatRule::compile(p))
            .collect();
        let public_query_rules: Result<Vec<_>> = config
            .public_query_patterns
            .iter()
            .map(|p| ThreatRule::compile(p))
            .collect();

        Ok(Self {
            blocked_agents: config
                .blocked_user_agents
                .iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            allowed_agents: config
                .allowed_user_agents
                .iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            sensitive_rules: sensitive_rules?,
            public_query_rules: public_query_rules?,
            allowed_prefixes: config.allowed_path_prefixes.clone(),
            max_body_scan_bytes: config.max_body_scan_bytes,
        })
    }

    pub fn max_body_scan_bytes(&self) -> usize {
        self.max_body_scan_bytes
    }

    /// Whether the middleware should buffer a body prefix for this request
    pub fn scans_body(&self, method: &Method, path: &str) -> bool {
        matches!(*method, Method::POST | Method::PUT | Method::PATCH)
            && is_sensitive(path)
            && !self.skips_deep_checks(path)
    }

    fn skips_deep_checks(&self, path: &str) -> bool {
        self.allowed_prefixes.iter().any(|p| path.starts_with(p))
    }

    /// Inspect a request. Returns the first violated rule, or `None` to pass.
    pub fn inspect(
        &self,
        method: &Method,
        path: &str,
        query: &str,
        headers: &HeaderMap,
        body: Option<&[u8]>,
    ) -> Option<Violation> {
        // 1. Method allow-list
        if !ALLOWED_METHODS.contains(&method.as_str()) {
            return Some(Violation {
                kind: ViolationKind::MethodNotAllowed,
                rule: method.as_str().to_string(),
            });
        }

        // 2. User-Agent denylist (allowlist takes precedence)
        let user_agent = headers
            .get(http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();

        let explicitly_allowed = self.allowed_agents.iter().any(|t| user_agent.contains(t));
        if !explicitly_allowed {
            if let Some(token) = self.blocked_agents.iter().find(|t| user_agent.contains(*t)) {
                return Some(Violation {
                    kind: ViolationKind::SuspiciousAgent,
                    rule: token.clone(),
                });
            }
        }

        // 3. Injection scan
        if self.skips_deep_checks(path) {
            return None;
        }

        // Directory traversal anywhere in the path
        if path.contains("..") {
            return Some(Violation {
                kind: ViolationKind::MaliciousPattern,
                rule: "path-traversal".to_string(),
            });
        }

        // Encoded payloads must be seen by the same rules as plain ones;
        // malformed escapes pass through undecoded.
        let decoded_query = percent_decode_str(query).decode_utf8_lossy();

        if is_sensitive(path) {
            if let Some(v) = self.scan(&self.sensitive_rules, path) {
                return Some(v);
            }
            if !query.is_empty() {
                if let Some(v) = self
                    .scan(&self.sensitive_rules, query)
                    .or_else(|| self.scan(&self.sensitive_rules, &decoded_query))
                {
                    return Some(v);
                }
            }
            if let Some(body) = body {
                let text = String::from_utf8_lossy(body);
                if let Some(v) = self.scan(&self.sensitive_rules, &text) {
                    return Some(v);
                }
            }
        } else if is_public_api(path) && !query.is_empty() {
            if let Some(v) = self
                .scan(&self.public_query_rules, query)
                .or_else(|| self.scan(&self.public_query_rules, &decoded_query))
            {
                return Some(v);
            }
        }

        None
    }

    fn scan(&self, rules: &[ThreatRule], input: &str) -> Option<Violation> {
        rules.iter().find(|r| r.matches(input)).map(|r| Violation {
            kind: ViolationKind::MaliciousPattern,
            rule: r.raw.clone(),
        })
    }
}

fn is_sensitive(path: &str) -> bool {
    path.starts_with("/admin") || path.starts_with("/auth")
}

fn is_public_api(path: &str) -> bool {
    path == "/public" || path.starts_with("/public/")
}
