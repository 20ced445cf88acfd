//! Transaction routes
//!
//! Ledger listing and creation, account-to-account transfers, agent
//! approval, and the OTP-gated cash request/confirm pair. Balance-mutating
//! flows live in the handlers module; this layer does auth and validation.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::QueryBuilder;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::domain::{Amount, Role, TransactionType};
use crate::error::{AppError, AppResult};
use crate::handlers::{
    ApprovalHandler, ApprovalResult, CashConfirmCommand, CashConfirmResult, CashHandler,
    CashRequestCommand, CashRequestResult, TransactionRecord, TransactionRow, TransferCommand,
    TransferHandler, TransferResult,
};
use crate::state::AppState;

/// Cash requests are bounded to keep agent float manageable
const CASH_MIN: i64 = 100;
const CASH_MAX: i64 = 100_000;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_transactions).post(create_transaction))
        .route("/transfer", post(transfer))
        .route("/request", post(cash_request))
        .route("/confirm", post(cash_confirm))
        .route("/:id/approve", post(approve))
        .route("/:id/reject", post(reject))
}

// =========================================================================
// Listing
// =========================================================================

#[derive(Debug, Deserialize)]
struct ListQuery {
    account_id: Uuid,
    #[serde(rename = "type")]
    tx_type: Option<TransactionType>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Debug, Serialize)]
struct TransactionPage {
    total: i64,
    items: Vec<TransactionRecord>,
}

/// GET /transactions - paginated, filterable listing for one owned account
async fn list_transactions(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<TransactionPage>> {
    let limit = query.limit.unwrap_or(20);
    let offset = query.offset.unwrap_or(0);

    if !(1..=100).contains(&limit) {
        return Err(AppError::Validation(
            "limit must be between 1 and 100".to_string(),
        ));
    }
    if offset < 0 {
        return Err(AppError::Validation("offset must not be negative".to_string()));
    }

    // Ownership gate before any listing happens
    let owned: Option<Uuid> =
        sqlx::query_scalar("SELECT id FROM accounts WHERE id = $1 AND user_id = $2")
            .bind(query.account_id)
            .bind(user.id)
            .fetch_optional(&state.pool)
            .await?;

    if owned.is_none() {
        return Err(AppError::NotFound("Account"));
    }

    let mut count_builder: QueryBuilder<sqlx::Postgres> =
        QueryBuilder::new("SELECT COUNT(*) FROM transactions WHERE account_id = ");
    count_builder.push_bind(query.account_id);
    push_filters(&mut count_builder, &query);

    let total: i64 = count_builder
        .build_query_scalar()
        .fetch_one(&state.pool)
        .await?;

    let mut list_builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
        "SELECT id, account_id, type, amount, category_id, to_account_id, \
         status, description, occurred_at, created_at \
         FROM transactions WHERE account_id = ",
    );
    list_builder.push_bind(query.account_id);
    push_filters(&mut list_builder, &query);
    list_builder.push(" ORDER BY occurred_at DESC, created_at DESC");
    list_builder.push(" LIMIT ");
    list_builder.push_bind(limit);
    list_builder.push(" OFFSET ");
    list_builder.push_bind(offset);

    let rows: Vec<TransactionRow> = list_builder
        .build_query_as()
        .fetch_all(&state.pool)
        .await?;

    let items = rows
        .into_iter()
        .map(TransactionRow::into_record)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(TransactionPage { total, items }))
}

fn push_filters(builder: &mut QueryBuilder<'_, sqlx::Postgres>, query: &ListQuery) {
    if let Some(tx_type) = query.tx_type {
        builder.push(" AND type = ");
        builder.push_bind(tx_type.as_str());
    }
    if let Some(from) = query.from {
        builder.push(" AND occurred_at >= ");
        builder.push_bind(from);
    }
    if let Some(to) = query.to {
        builder.push(" AND occurred_at <= ");
        builder.push_bind(to);
    }
}

// =========================================================================
// Creation
// =========================================================================

#[derive(Debug, Deserialize)]
struct CreateTransactionRequest {
    account_id: Uuid,
    #[serde(rename = "type")]
    tx_type: TransactionType,
    /// Amount as string for precise decimal handling
    amount: String,
    category_id: Option<Uuid>,
    description: Option<String>,
    occurred_at: Option<DateTime<Utc>>,
}

/// POST /transactions - record a PENDING income or expense entry.
/// The balance effect is applied later, on agent approval.
async fn create_transaction(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateTransactionRequest>,
) -> AppResult<(StatusCode, Json<TransactionRecord>)> {
    if req.tx_type == TransactionType::Transfer {
        return Err(AppError::Validation(
            "transfers are created through /transactions/transfer".to_string(),
        ));
    }

    let amount: Amount = req
        .amount
        .parse()
        .map_err(|e: crate::domain::AmountError| AppError::Validation(e.to_string()))?;

    let owned: Option<Uuid> =
        sqlx::query_scalar("SELECT id FROM accounts WHERE id = $1 AND user_id = $2")
            .bind(req.account_id)
            .bind(user.id)
            .fetch_optional(&state.pool)
            .await?;

    if owned.is_none() {
        return Err(AppError::NotFound("Account"));
    }

    if let Some(category_id) = req.category_id {
        let category: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM categories WHERE id = $1 AND user_id = $2")
                .bind(category_id)
                .bind(user.id)
                .fetch_optional(&state.pool)
                .await?;

        if category.is_none() {
            return Err(AppError::Validation("category not found".to_string()));
        }
    }

    let row: TransactionRow = sqlx::query_as(
        r#"
        INSERT INTO transactions
            (id, account_id, type, amount, category_id, status, description, occurred_at)
        VALUES ($1, $2, $3, $4, $5, 'PENDING', $6, $7)
        RETURNING id, account_id, type, amount, category_id, to_account_id,
                  status, description, occurred_at, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(req.account_id)
    .bind(req.tx_type.as_str())
    .bind(amount.value())
    .bind(req.category_id)
    .bind(&req.description)
    .bind(req.occurred_at.unwrap_or_else(Utc::now))
    .fetch_one(&state.pool)
    .await?;

    let record = row.into_record()?;

    tracing::info!(
        transaction_id = %record.id,
        account_id = %req.account_id,
        "Transaction created, pending approval"
    );

    Ok((StatusCode::CREATED, Json(record)))
}

// =========================================================================
// Transfer
// =========================================================================

/// POST /transactions/transfer - move money between two owned accounts
async fn transfer(
    State(state): State<AppState>,
    user: AuthUser,
    Json(command): Json<TransferCommand>,
) -> AppResult<(StatusCode, Json<TransferResult>)> {
    let result = TransferHandler::new(state.pool.clone())
        .execute(command, &user)
        .await?;

    Ok((StatusCode::CREATED, Json(result)))
}

// =========================================================================
// Approval
// =========================================================================

/// POST /transactions/:id/approve - agent applies a pending entry
async fn approve(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApprovalResult>> {
    user.require_role(Role::Agent)?;

    let result = ApprovalHandler::new(state.pool.clone()).approve(id).await?;

    Ok(Json(result))
}

/// POST /transactions/:id/reject - agent rejects a pending entry
async fn reject(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApprovalResult>> {
    user.require_role(Role::Agent)?;

    let result = ApprovalHandler::new(state.pool.clone()).reject(id).await?;

    Ok(Json(result))
}

// =========================================================================
// Cash request / confirm
// =========================================================================

/// POST /transactions/request - ask an agent for cash, OTP goes out of band
async fn cash_request(
    State(state): State<AppState>,
    user: AuthUser,
    Json(command): Json<CashRequestCommand>,
) -> AppResult<(StatusCode, Json<CashRequestResult>)> {
    if !(CASH_MIN..=CASH_MAX).contains(&command.amount) {
        return Err(AppError::Validation(format!(
            "amount must be between {CASH_MIN} and {CASH_MAX}"
        )));
    }

    let result = CashHandler::new(state.pool.clone(), state.otp_gateway.clone())
        .request(&user, command)
        .await?;

    Ok((StatusCode::CREATED, Json(result)))
}

/// POST /transactions/confirm - assigned agent redeems the passcode
async fn cash_confirm(
    State(state): State<AppState>,
    user: AuthUser,
    Json(command): Json<CashConfirmCommand>,
) -> AppResult<Json<CashConfirmResult>> {
    user.require_role(Role::Agent)?;

    let result = CashHandler::new(state.pool.clone(), state.otp_gateway.clone())
        .confirm(&user, command)
        .await?;

    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cash_bounds() {
        assert!(!(CASH_MIN..=CASH_MAX).contains(&99));
        assert!((CASH_MIN..=CASH_MAX).contains(&100));
        assert!((CASH_MIN..=CASH_MAX).contains(&100_000));
        assert!(!(CASH_MIN..=CASH_MAX).contains(&100_001));
    }

    #[test]
    fn test_list_query_type_filter_parses() {
        let query: ListQuery = serde_urlencoded::from_str(
            "account_id=550e8400-e29b-41d4-a716-446655440001&type=EXPENSE&limit=50",
        )
        .unwrap();

        assert_eq!(query.tx_type, Some(TransactionType::Expense));
        assert_eq!(query.limit, Some(50));
    }
}
