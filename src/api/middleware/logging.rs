//! Request/response logging middleware with sensitive data redaction

use std::time::Instant;

use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use tracing::{debug, info};

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Query parameters whose values are access tokens
const SENSITIVE_QUERY_PARAMS: &[&str] = &["key", "token"];

/// Log one event per request and one per response.
///
/// No span is opened here, `TraceLayer` already owns the request span.
/// Tokens in the query string and client addresses in forwarding headers
/// never reach the `info` level.
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = extract_path(&request);
    let query = request.uri().query().map(redact_query).unwrap_or_default();
    let request_id = extract_request_id(request.headers());
    let headers_log = loggable_headers(request.headers());

    info!(
        method = %method,
        path = %path,
        query = %query,
        request_id = %request_id,
        headers = %headers_log,
        "Incoming request"
    );
    debug!(uri = %request.uri(), request_id = %request_id, "Raw request uri");

    let response = next.run(request).await;
    let status = response.status();

    info!(
        method = %method,
        path = %path,
        status = status.as_u16(),
        duration_ms = start.elapsed().as_millis() as u64,
        request_id = %request_id,
        "Request completed"
    );

    response
}

fn extract_path(request: &Request<Body>) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string())
}

fn extract_request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Headers worth seeing in the request log, with secrets redacted
fn loggable_headers(headers: &HeaderMap) -> String {
    let mut parts = Vec::new();

    for (name, value) in headers {
        let name = name.as_str();
        if !should_log_header(name) {
            continue;
        }

        let value = if is_sensitive_header(name) {
            "[REDACTED]"
        } else {
            value.to_str().unwrap_or("[invalid]")
        };
        parts.push(format!("{}={}", name, value));
    }

    parts.join(", ")
}

fn is_sensitive_header(name: &str) -> bool {
    matches!(
        name,
        "authorization"
            | "cookie"
            | "proxy-authorization"
            | "x-forwarded-for"
            | "x-real-ip"
    )
}

fn should_log_header(name: &str) -> bool {
    matches!(
        name,
        "content-type"
            | "accept"
            | "user-agent"
            | "referer"
            | "origin"
            | "host"
            | "x-forwarded-for"
            | "x-real-ip"
            | "authorization"
    )
}

/// Replace the values of token-carrying query parameters
fn redact_query(query: &str) -> String {
    query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((name, _)) if SENSITIVE_QUERY_PARAMS.contains(&name) => {
                format!("{}=[REDACTED]", name)
            }
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&")
}
