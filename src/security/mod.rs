//! Security filtering
//!
//! Pattern-based threat rejection and response hardening. Checks run in a
//! fixed order with first-match-wins semantics: method allow-list,
//! User-Agent denylist, then an injection scan (SQL tokens, path traversal,
//! shell metacharacters) over path, decoded query, and a bounded body prefix
//! on sensitive write routes. Every response, allowed or denied, gets the
//! hardening header set and a nonce-carrying Content-Security-Policy.

pub mod headers;
pub mod middleware;
pub mod patterns;

pub use headers::ResponseHardening;
pub use middleware::{security_middleware, CspNonce, SecurityState};
pub use patterns::{SecurityFilter, Violation, ViolationKind};
