//! API Middleware
//!
//! Rate limiting, audit capture, request logging, and metrics recording.

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{header, HeaderMap, Method, Request},
    middleware::Next,
    response::Response,
};
use serde_json::Value;
use tower_http::request_id::RequestId;
use uuid::Uuid;

use crate::audit::{AuditEntry, AuditLogService};
use crate::error::AppError;
use crate::state::AppState;

// =========================================================================
// Rate Limiting Middleware
// =========================================================================

/// Fixed-window rate limiting keyed by the authenticated user when a valid
/// bearer token is present, otherwise by client IP. Counters live in a
/// database table so every instance shares one window; the bucket upsert is
/// a single atomic statement.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let key = rate_limit_key(request.headers(), &state);

    let count: i32 = sqlx::query_scalar(
        r#"
        INSERT INTO rate_limit_buckets (key, window_start, count)
        VALUES ($1, date_trunc('minute', NOW()), 1)
        ON CONFLICT (key, window_start)
        DO UPDATE SET count = rate_limit_buckets.count + 1
        RETURNING count
        "#,
    )
    .bind(&key)
    .fetch_one(&state.pool)
    .await?;

    if count > state.config.rate_limit_per_minute {
        tracing::warn!(key = %key, count, "Rate limit exceeded");
        return Err(AppError::RateLimitExceeded);
    }

    Ok(next.run(request).await)
}

/// Derive the bucket key for a request.
fn rate_limit_key(headers: &HeaderMap, state: &AppState) -> String {
    if let Some(user_id) = authenticated_user_id(headers, state) {
        return format!("user:{user_id}");
    }

    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .unwrap_or("unknown");

    format!("ip:{ip}")
}

/// Identity from the bearer token, if one is present and valid. Middleware
/// runs before the auth extractor, so it checks the token itself; a bad
/// token here just means anonymous attribution, rejection stays with the
/// extractor.
fn authenticated_user_id(headers: &HeaderMap, state: &AppState) -> Option<Uuid> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(|token| state.jwt.verify(token).ok())
        .map(|claims| claims.sub)
}

// =========================================================================
// Audit Middleware
// =========================================================================

/// Request bodies above this size are not captured in the audit trail
const MAX_AUDIT_BODY_BYTES: usize = 16 * 1024;

/// Capture every mutating request into the audit log: method, matched route,
/// caller, redacted body, response status, and duration. Reads happen far
/// too often to audit and carry no state change, so GET passes straight
/// through.
pub async fn audit_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !is_mutating(request.method()) {
        return next.run(request).await;
    }

    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .and_then(|id| id.header_value().to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok());
    let user_id = authenticated_user_id(request.headers(), &state);

    let (request, body) = buffer_json_body(request).await;

    let start = std::time::Instant::now();
    let response = next.run(request).await;
    let duration_ms = start.elapsed().as_millis() as i64;

    let mut entry =
        AuditEntry::new(method, path).outcome(response.status().as_u16(), duration_ms);
    if let Some(request_id) = request_id {
        entry = entry.request_id(request_id);
    }
    if let Some(user_id) = user_id {
        entry = entry.user(user_id);
    }
    if let Some(body) = body {
        entry = entry.body(body);
    }

    AuditLogService::new(state.pool.clone()).record(entry).await;

    response
}

fn is_mutating(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// Buffer a JSON request body so the audit entry can include it, then hand
/// the request on with the same bytes. Non-JSON bodies and bodies over the
/// size cap pass through uncaptured.
async fn buffer_json_body(request: Request<Body>) -> (Request<Body>, Option<Value>) {
    let is_json = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/json"))
        .unwrap_or(false);
    let declared_len = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());

    if !is_json || declared_len.map_or(true, |len| len > MAX_AUDIT_BODY_BYTES) {
        return (request, None);
    }

    let (parts, body) = request.into_parts();
    match axum::body::to_bytes(body, MAX_AUDIT_BODY_BYTES).await {
        Ok(bytes) => {
            let value = serde_json::from_slice(&bytes).ok();
            (Request::from_parts(parts, Body::from(bytes)), value)
        }
        // Content-length lied; the handler sees an empty body and rejects it
        Err(_) => (Request::from_parts(parts, Body::empty()), None),
    }
}

// =========================================================================
// Request Logging Middleware
// =========================================================================

/// Headers that should be masked in logs
const SENSITIVE_HEADERS: &[&str] = &["authorization", "cookie", "set-cookie"];

/// Mask sensitive headers for logging
pub fn mask_headers_for_logging(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let name_lower = name.as_str().to_lowercase();
            let masked_value = if SENSITIVE_HEADERS.contains(&name_lower.as_str()) {
                "[REDACTED]".to_string()
            } else {
                value.to_str().unwrap_or("[invalid utf8]").to_string()
            };
            (name.to_string(), masked_value)
        })
        .collect()
}

/// What a request looks like in the log: the path only. Query strings carry
/// tokens and filters that do not belong in log lines.
fn request_log_path(uri: &axum::http::Uri) -> &str {
    uri.path()
}

/// Request logging middleware
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request_log_path(request.uri()).to_string();

    let headers = mask_headers_for_logging(request.headers());

    let start = std::time::Instant::now();

    tracing::info!(
        method = %method,
        path = %path,
        headers = ?headers,
        "Incoming request"
    );

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    tracing::info!(
        method = %method,
        path = %path,
        status = %status,
        duration_ms = %duration.as_millis(),
        "Request completed"
    );

    response
}

// =========================================================================
// Metrics Middleware
// =========================================================================

/// Record a counter increment and a duration observation per request.
/// The route label is the matched route template, never the raw path, so
/// ids do not explode label cardinality.
pub async fn metrics_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let start = std::time::Instant::now();
    let response = next.run(request).await;

    state.metrics.record(
        &method,
        &route,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_headers_for_logging() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "application/json".parse().unwrap());
        headers.insert("authorization", "Bearer secret-token".parse().unwrap());
        headers.insert("x-request-id", "abc-123".parse().unwrap());

        let masked = mask_headers_for_logging(&headers);

        let auth = masked.iter().find(|(k, _)| k == "authorization");
        let content_type = masked.iter().find(|(k, _)| k == "content-type");
        let request_id = masked.iter().find(|(k, _)| k == "x-request-id");

        assert_eq!(auth.unwrap().1, "[REDACTED]");
        assert_eq!(content_type.unwrap().1, "application/json");
        assert_eq!(request_id.unwrap().1, "abc-123");
    }

    #[test]
    fn test_sensitive_headers_list() {
        assert!(SENSITIVE_HEADERS.contains(&"authorization"));
        assert!(!SENSITIVE_HEADERS.contains(&"content-type"));
    }

    #[test]
    fn test_log_path_drops_query_string() {
        let uri: axum::http::Uri = "/transactions?account_id=abc&limit=50".parse().unwrap();
        assert_eq!(request_log_path(&uri), "/transactions");

        let bare: axum::http::Uri = "/health".parse().unwrap();
        assert_eq!(request_log_path(&bare), "/health");
    }

    #[test]
    fn test_mutating_method_detection() {
        assert!(is_mutating(&Method::POST));
        assert!(is_mutating(&Method::PATCH));
        assert!(is_mutating(&Method::DELETE));
        assert!(!is_mutating(&Method::GET));
        assert!(!is_mutating(&Method::HEAD));
    }
}
