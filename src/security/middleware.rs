use super::headers::ResponseHardening;
use super::patterns::{SecurityFilter, Violation};
use crate::metrics::record_request_blocked;
use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::warn;

/// Shared state for the security stage
#[derive(Clone)]
pub struct SecurityState {
    pub filter: Arc<SecurityFilter>,
    pub hardening: Arc<ResponseHardening>,
}

/// Per-response CSP nonce, exposed to downstream handlers that render
/// inline scripts
#[derive(Debug, Clone)]
pub struct CspNonce(pub String);

/// Axum middleware running the security filter before anything else.
///
/// A deny here is terminal: the request never reaches the rate limiter or
/// business handlers, and only the violated rule's kind is logged, never the
/// payload. Hardening headers go on every response, allow or deny.
pub async fn security_middleware(
    State(state): State<SecurityState>,
    mut request: Request,
    next: Next,
) -> Response {
    let nonce = state.hardening.generate_nonce();

    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let query = request.uri().query().unwrap_or("").to_string();

    // Buffer the body for scanning where it matters: write methods on
    // sensitive routes. The cap is enforced on the bytes actually read, not
    // on the declared length, so neither an absent Content-Length (chunked)
    // nor a padded one skips the scan. Bodies over the cap are rejected.
    let mut body_bytes = None;
    if state.filter.scans_body(&method, &path) {
        let cap = state.filter.max_body_scan_bytes();

        if declared_length(&request).is_some_and(|len| len > cap) {
            return hardened(&state, nonce.as_deref(), too_large(&client, &path));
        }

        let (parts, body) = request.into_parts();
        match axum::body::to_bytes(body, cap).await {
            Ok(bytes) => {
                request = Request::from_parts(parts, Body::from(bytes.clone()));
                body_bytes = Some(bytes);
            }
            Err(e) => {
                // Over the cap, or the stream broke mid-body
                warn!(client = %client, path = %path, "failed to buffer request body: {}", e);
                return hardened(&state, nonce.as_deref(), too_large(&client, &path));
            }
        }
    }

    let violation = state.filter.inspect(
        &method,
        &path,
        &query,
        request.headers(),
        body_bytes.as_deref(),
    );

    if let Some(violation) = violation {
        return hardened(&state, nonce.as_deref(), deny(&violation, &client, &path));
    }

    if let Some(nonce_value) = &nonce {
        request.extensions_mut().insert(CspNonce(nonce_value.clone()));
    }

    let response = next.run(request).await;
    hardened(&state, nonce.as_deref(), response)
}

fn too_large(client: &str, path: &str) -> Response {
    warn!(client = %client, path = %path, "request body exceeds scan cap");
    (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response()
}

fn declared_length(request: &Request) -> Option<usize> {
    request
        .headers()
        .get(http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

fn deny(violation: &Violation, client: &str, path: &str) -> Response {
    warn!(
        kind = violation.kind.as_str(),
        rule = %violation.rule,
        client = %client,
        path = %path,
        "request blocked by security filter"
    );
    record_request_blocked(violation.kind.as_str());

    let mut response =
        (violation.kind.status_code(), violation.kind.body()).into_response();
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

fn hardened(state: &SecurityState, nonce: Option<&str>, mut response: Response) -> Response {
    state.hardening.apply(response.headers_mut(), nonce);
    response
}
