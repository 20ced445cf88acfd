//! Audit Log Service
//!
//! Structured records of every mutating HTTP request: who, what, outcome,
//! and how long it took. Request payloads are redacted before storage:
//! credentials and passcodes never reach the audit table. Audit writes are
//! best-effort; a failed insert is logged and never fails the request being
//! audited.

use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

/// Body keys whose values are replaced before storage
const REDACT_KEYS: &[&str] = &["password", "token", "refresh_token", "otp", "authorization"];

/// Maximum number of body keys kept per entry
const MAX_BODY_KEYS: usize = 20;

/// Maximum stored length for a string value
const MAX_VALUE_LEN: usize = 200;

/// One audited request
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub request_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub method: String,
    /// Route template, not the raw URI: path parameters stay collapsed
    pub path: String,
    pub status_code: i32,
    pub duration_ms: i64,
    pub body: Option<Value>,
}

impl AuditEntry {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            request_id: None,
            user_id: None,
            method: method.into(),
            path: path.into(),
            status_code: 0,
            duration_ms: 0,
            body: None,
        }
    }

    pub fn request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn outcome(mut self, status_code: u16, duration_ms: i64) -> Self {
        self.status_code = i32::from(status_code);
        self.duration_ms = duration_ms;
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(redact(body));
        self
    }
}

/// Audit log persistence
#[derive(Debug, Clone)]
pub struct AuditLogService {
    pool: PgPool,
}

impl AuditLogService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record an entry. Failures are logged, never propagated.
    pub async fn record(&self, entry: AuditEntry) {
        let result = sqlx::query(
            r#"
            INSERT INTO audit_logs
                (id, request_id, user_id, method, path, status_code, duration_ms, body)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.request_id)
        .bind(entry.user_id)
        .bind(&entry.method)
        .bind(&entry.path)
        .bind(entry.status_code)
        .bind(entry.duration_ms)
        .bind(&entry.body)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                tracing::debug!(
                    method = %entry.method,
                    path = %entry.path,
                    "Audit log entry created"
                );
            }
            Err(e) => {
                tracing::error!(
                    method = %entry.method,
                    path = %entry.path,
                    error = %e,
                    "Failed to write audit log"
                );
            }
        }
    }
}

/// Redact sensitive fields and trim oversized values.
/// Only the top level of the object is inspected, matching what request
/// bodies in this API look like.
pub fn redact(body: Value) -> Value {
    let Value::Object(map) = body else {
        return body;
    };

    let mut result = serde_json::Map::new();
    for (key, value) in map.into_iter().take(MAX_BODY_KEYS) {
        if REDACT_KEYS.contains(&key.to_lowercase().as_str()) {
            result.insert(key, Value::String("[redacted]".to_string()));
        } else if let Value::String(s) = &value {
            if s.len() > MAX_VALUE_LEN {
                let mut end = MAX_VALUE_LEN;
                while !s.is_char_boundary(end) {
                    end -= 1;
                }
                result.insert(key, Value::String(format!("{}...", &s[..end])));
            } else {
                result.insert(key, value);
            }
        } else {
            result.insert(key, value);
        }
    }

    Value::Object(result)
}
