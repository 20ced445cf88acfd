//! Authentication routes
//!
//! Signup, login, refresh rotation, logout, and agent registration.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{hash_password, verify_password, RefreshTokenService};
use crate::domain::{Amount, Role};
use crate::error::{on_unique_violation, AppError, AppResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/login-with-refresh", post(login_with_refresh))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/register-agent", post(register_agent))
}

// =========================================================================
// Request / response types
// =========================================================================

#[derive(Debug, Deserialize)]
struct SignupRequest {
    name: String,
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct UserResponse {
    id: Uuid,
    name: String,
    email: String,
    role: Role,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    access_token: String,
    user: UserResponse,
}

#[derive(Debug, Serialize)]
struct LoginWithRefreshResponse {
    access_token: String,
    refresh_token: String,
    user: UserResponse,
}

#[derive(Debug, Deserialize)]
struct RefreshRequest {
    refresh_token: String,
}

#[derive(Debug, Serialize)]
struct RefreshResponse {
    access_token: String,
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct RegisterAgentRequest {
    name: String,
    email: String,
    password: String,
    /// Maximum cash this agent is willing to handle, as a decimal string
    cash_limit: String,
    location_name: Option<String>,
}

#[derive(Debug, Serialize)]
struct RegisterAgentResponse {
    user: UserResponse,
    agent_profile: AgentProfileSummary,
}

#[derive(Debug, Serialize)]
struct AgentProfileSummary {
    id: Uuid,
    is_verified: bool,
    is_banned: bool,
    available: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    password_hash: String,
    role: String,
    created_at: DateTime<Utc>,
}

impl UserRow {
    fn into_response(self) -> Result<UserResponse, AppError> {
        Ok(UserResponse {
            id: self.id,
            name: self.name,
            email: self.email,
            role: self.role.parse()?,
            created_at: self.created_at,
        })
    }
}

fn validate_signup(name: &str, email: &str, password: &str) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(AppError::Validation("name must not be empty".to_string()));
    }
    if !email.contains('@') || email.trim().is_empty() {
        return Err(AppError::Validation("email is not valid".to_string()));
    }
    if password.len() < 8 {
        return Err(AppError::Validation(
            "password must be at least 8 characters".to_string(),
        ));
    }
    Ok(())
}

// =========================================================================
// Handlers
// =========================================================================

/// POST /auth/signup - create a regular user account.
/// Signup does not log the user in; a separate login issues tokens.
async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    validate_signup(&req.name, &req.email, &req.password)?;

    let email = req.email.trim().to_lowercase();
    let password_hash = hash_password(&req.password)?;

    let row: UserRow = sqlx::query_as(
        r#"
        INSERT INTO users (id, name, email, password_hash, role)
        VALUES ($1, $2, $3, $4, 'user')
        RETURNING id, name, email, password_hash, role, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(req.name.trim())
    .bind(&email)
    .bind(&password_hash)
    .fetch_one(&state.pool)
    .await
    .map_err(|e| on_unique_violation(e, "users_email_key", AppError::EmailTaken))?;

    tracing::info!(user_id = %row.id, "User registered");

    Ok((StatusCode::CREATED, Json(row.into_response()?)))
}

/// Shared credential check: fetch the user by email and verify the password.
async fn authenticate(state: &AppState, email: &str, password: &str) -> AppResult<UserRow> {
    let row: Option<UserRow> = sqlx::query_as(
        r#"
        SELECT id, name, email, password_hash, role, created_at
        FROM users
        WHERE email = $1
        "#,
    )
    .bind(email.trim().to_lowercase())
    .fetch_optional(&state.pool)
    .await?;

    let row = row.ok_or(AppError::InvalidCredentials)?;

    if !verify_password(password, &row.password_hash) {
        return Err(AppError::InvalidCredentials);
    }

    Ok(row)
}

/// POST /auth/login - exchange credentials for a short-lived access token
async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let row = authenticate(&state, &req.email, &req.password).await?;
    let role: Role = row.role.parse()?;
    let access_token = state.jwt.issue(row.id, &row.email, role)?;

    Ok(Json(LoginResponse {
        access_token,
        user: row.into_response()?,
    }))
}

/// POST /auth/login-with-refresh - login that also issues a refresh token
async fn login_with_refresh(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<LoginWithRefreshResponse>> {
    let row = authenticate(&state, &req.email, &req.password).await?;
    let role: Role = row.role.parse()?;

    let access_token = state.jwt.issue(row.id, &row.email, role)?;
    let refresh_token = RefreshTokenService::new(state.pool.clone())
        .create(row.id)
        .await?;

    Ok(Json(LoginWithRefreshResponse {
        access_token,
        refresh_token,
        user: row.into_response()?,
    }))
}

/// POST /auth/refresh - rotate a refresh token and mint a new access token
async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> AppResult<Json<RefreshResponse>> {
    let rotated = RefreshTokenService::new(state.pool.clone())
        .rotate(&req.refresh_token)
        .await?;

    let row: Option<(String, String)> =
        sqlx::query_as("SELECT email, role FROM users WHERE id = $1")
            .bind(rotated.user_id)
            .fetch_optional(&state.pool)
            .await?;

    let (email, role) = row.ok_or(AppError::InvalidRefresh)?;
    let access_token = state.jwt.issue(rotated.user_id, &email, role.parse()?)?;

    Ok(Json(RefreshResponse {
        access_token,
        refresh_token: rotated.token,
    }))
}

/// POST /auth/logout - revoke the presented refresh token. Idempotent.
async fn logout(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> AppResult<StatusCode> {
    RefreshTokenService::new(state.pool.clone())
        .revoke(&req.refresh_token)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /auth/register-agent - create an agent user plus an unverified
/// profile in one transaction. The profile stays invisible to customers
/// until an admin verifies it.
async fn register_agent(
    State(state): State<AppState>,
    Json(req): Json<RegisterAgentRequest>,
) -> AppResult<(StatusCode, Json<RegisterAgentResponse>)> {
    validate_signup(&req.name, &req.email, &req.password)?;

    let cash_limit: Amount = req
        .cash_limit
        .parse()
        .map_err(|e: crate::domain::AmountError| AppError::Validation(e.to_string()))?;

    let email = req.email.trim().to_lowercase();
    let password_hash = hash_password(&req.password)?;

    let mut tx = state.pool.begin().await?;

    let user: UserRow = sqlx::query_as(
        r#"
        INSERT INTO users (id, name, email, password_hash, role)
        VALUES ($1, $2, $3, $4, 'agent')
        RETURNING id, name, email, password_hash, role, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(req.name.trim())
    .bind(&email)
    .bind(&password_hash)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| on_unique_violation(e, "users_email_key", AppError::EmailTaken))?;

    let profile_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO agent_profiles
            (id, user_id, is_verified, is_banned, available, cash_limit, location_name)
        VALUES ($1, $2, FALSE, FALSE, FALSE, $3, $4)
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user.id)
    .bind(cash_limit.value())
    .bind(&req.location_name)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(user_id = %user.id, "Agent registered, pending verification");

    Ok((
        StatusCode::CREATED,
        Json(RegisterAgentResponse {
            user: user.into_response()?,
            agent_profile: AgentProfileSummary {
                id: profile_id,
                is_verified: false,
                is_banned: false,
                available: false,
            },
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_signup_rejects_short_password() {
        assert!(validate_signup("Alice", "alice@example.com", "short").is_err());
        assert!(validate_signup("Alice", "alice@example.com", "long-enough").is_ok());
    }

    #[test]
    fn test_validate_signup_rejects_bad_email() {
        assert!(validate_signup("Alice", "not-an-email", "long-enough").is_err());
        assert!(validate_signup("", "alice@example.com", "long-enough").is_err());
    }
}
