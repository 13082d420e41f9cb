use super::limiter::RateLimiter;
use super::types::{QuotaSnapshot, RateLimitDecision, RouteBucket};
use crate::client_ip::ClientIpResolver;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

/// Shared state for the rate limiting stage
#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: Arc<RateLimiter>,
    pub resolver: Arc<ClientIpResolver>,
}

/// Axum middleware enforcing per-bucket quotas.
///
/// Runs after the security filter. Unclassified paths (static files and the
/// like) pass through without quota accounting or headers.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    let bucket = match RouteBucket::classify(request.method(), request.uri().path()) {
        Some(bucket) => bucket,
        None => return next.run(request).await,
    };

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip());
    let client = state.resolver.resolve(peer, request.headers());

    match state.limiter.check(bucket, &client).await {
        RateLimitDecision::Denied {
            retry_after,
            snapshot,
        } => rate_limited_response(retry_after, snapshot),
        RateLimitDecision::Allowed { snapshot } => {
            debug!(bucket = %bucket, client = %client, "rate limit check passed");
            let mut response = next.run(request).await;
            if let Some(snapshot) = snapshot {
                add_rate_limit_headers(&mut response, &snapshot);
            }
            response
        }
    }
}

/// Build the 429 response with the unified header and body contract
fn rate_limited_response(retry_after: u64, snapshot: Option<QuotaSnapshot>) -> Response {
    let mut body = serde_json::json!({
        "detail": format!("Too many requests. Retry after {}s", retry_after),
        "retry_after": retry_after,
    });

    if let Some(snapshot) = snapshot {
        body["rate_limit"] = serde_json::json!({
            "limit": snapshot.limit,
            "window": snapshot.window_secs,
            "remaining": snapshot.remaining,
            "reset": snapshot.reset_after,
        });
    }

    let mut response = (StatusCode::TOO_MANY_REQUESTS, body.to_string()).into_response();

    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert("Retry-After", number_header(retry_after));
    if let Some(snapshot) = snapshot {
        // A fail-closed denial carries no snapshot: we advertise only the
        // retry hint, never counts the store could not produce.
        headers.insert("X-RateLimit-Limit", number_header(snapshot.limit as u64));
        headers.insert("X-RateLimit-Window", number_header(snapshot.window_secs));
        headers.insert("X-RateLimit-Remaining", number_header(snapshot.remaining));
        headers.insert("X-RateLimit-Reset", number_header(snapshot.reset_after));
    }

    response
}

/// Attach informational quota headers to a successful response
fn add_rate_limit_headers(response: &mut Response, snapshot: &QuotaSnapshot) {
    let headers = response.headers_mut();
    headers.insert("X-RateLimit-Limit", number_header(snapshot.limit as u64));
    headers.insert("X-RateLimit-Window", number_header(snapshot.window_secs));
    headers.insert("X-RateLimit-Remaining", number_header(snapshot.remaining));
    headers.insert("X-RateLimit-Reset", number_header(snapshot.reset_after));
}

fn number_header(value: u64) -> HeaderValue {
    // Decimal digits are always a valid header value
    HeaderValue::from_str(&value.to_string()).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_response_with_snapshot() {
        let snapshot = QuotaSnapshot {
            limit: 100,
            window_secs: 60,
            remaining: 0,
            reset_after: 30,
        };
        let response = rate_limited_response(30, Some(snapshot));

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let headers = response.headers();
        assert_eq!(headers.get("X-RateLimit-Limit").unwrap(), "100");
        assert_eq!(headers.get("X-RateLimit-Window").unwrap(), "60");
        assert_eq!(headers.get("X-RateLimit-Remaining").unwrap(), "0");
        assert_eq!(headers.get("X-RateLimit-Reset").unwrap(), "30");
        assert_eq!(headers.get("Retry-After").unwrap(), "30");
    }

    #[test]
    fn test_fail_closed_response_has_no_quota_headers() {
        let response = rate_limited_response(60, None);

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let headers = response.headers();
        assert_eq!(headers.get("Retry-After").unwrap(), "60");
        assert!(headers.get("X-RateLimit-Limit").is_none());
        assert!(headers.get("X-RateLimit-Remaining").is_none());
    }
}
