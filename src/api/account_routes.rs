//! Account routes
//!
//! Accounts are strictly scoped to their owner; every query filters on the
//! caller's id so cross-user ids behave as if they do not exist.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::domain::Balance;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_accounts).post(create_account))
        .route("/:id", get(get_account))
}

#[derive(Debug, Deserialize)]
struct CreateAccountRequest {
    name: String,
    /// Opening balance as a decimal string; defaults to zero
    balance: Option<String>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
struct AccountResponse {
    id: Uuid,
    user_id: Uuid,
    name: String,
    balance: Decimal,
    created_at: DateTime<Utc>,
}

/// GET /accounts - list the caller's accounts
async fn list_accounts(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<Vec<AccountResponse>>> {
    let accounts: Vec<AccountResponse> = sqlx::query_as(
        r#"
        SELECT id, user_id, name, balance, created_at
        FROM accounts
        WHERE user_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(user.id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(accounts))
}

/// POST /accounts - create an account for the caller
async fn create_account(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateAccountRequest>,
) -> AppResult<(StatusCode, Json<AccountResponse>)> {
    if req.name.trim().is_empty() {
        return Err(AppError::Validation("name must not be empty".to_string()));
    }

    let balance: Balance = req
        .balance
        .as_deref()
        .unwrap_or("0")
        .parse()
        .map_err(|e: crate::domain::AmountError| AppError::Validation(e.to_string()))?;

    let account: AccountResponse = sqlx::query_as(
        r#"
        INSERT INTO accounts (id, user_id, name, balance)
        VALUES ($1, $2, $3, $4)
        RETURNING id, user_id, name, balance, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user.id)
    .bind(req.name.trim())
    .bind(balance.value())
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(account_id = %account.id, user_id = %user.id, "Account created");

    Ok((StatusCode::CREATED, Json(account)))
}

/// GET /accounts/:id - fetch one of the caller's accounts
async fn get_account(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<AccountResponse>> {
    let account: Option<AccountResponse> = sqlx::query_as(
        r#"
        SELECT id, user_id, name, balance, created_at
        FROM accounts
        WHERE id = $1 AND user_id = $2
        "#,
    )
    .bind(id)
    .bind(user.id)
    .fetch_optional(&state.pool)
    .await?;

    account
        .map(Json)
        .ok_or(AppError::NotFound("Account"))
}
