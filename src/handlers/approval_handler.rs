//! Approval Handler
//!
//! Agent approval of PENDING ledger transactions. Approval applies the
//! balance effect and the status flip in one database transaction; a
//! rejection touches only the status. The source row is locked for the
//! duration, and the final status write is still conditional on PENDING.

use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{TransactionStatus, TransactionType};
use crate::error::AppError;

use super::ApprovalResult;

pub struct ApprovalHandler {
    pool: PgPool,
}

impl ApprovalHandler {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Approve a pending transaction, applying its balance effect.
    pub async fn approve(&self, transaction_id: Uuid) -> Result<ApprovalResult, AppError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(Uuid, String, rust_decimal::Decimal, Option<Uuid>, String)> =
            sqlx::query_as(
                r#"
                SELECT account_id, type, amount, to_account_id, status
                FROM transactions
                WHERE id = $1
                FOR UPDATE
                "#,
            )
            .bind(transaction_id)
            .fetch_optional(&mut *tx)
            .await?;

        let (account_id, tx_type, amount, to_account_id, status) =
            row.ok_or(AppError::NotFound("Transaction"))?;

        if status.parse::<TransactionStatus>()? != TransactionStatus::Pending {
            return Err(AppError::AlreadyCompleted);
        }

        match tx_type.parse::<TransactionType>()? {
            TransactionType::Income => {
                sqlx::query("UPDATE accounts SET balance = balance + $2 WHERE id = $1")
                    .bind(account_id)
                    .bind(amount)
                    .execute(&mut *tx)
                    .await?;
            }
            TransactionType::Expense => {
                let debited = sqlx::query(
                    "UPDATE accounts SET balance = balance - $2 WHERE id = $1 AND balance >= $2",
                )
                .bind(account_id)
                .bind(amount)
                .execute(&mut *tx)
                .await?;

                if debited.rows_affected() == 0 {
                    return Err(AppError::InsufficientFunds);
                }
            }
            TransactionType::Transfer => {
                let destination = to_account_id.ok_or_else(|| {
                    AppError::Validation("transfer has no destination account".to_string())
                })?;

                let debited = sqlx::query(
                    "UPDATE accounts SET balance = balance - $2 WHERE id = $1 AND balance >= $2",
                )
                .bind(account_id)
                .bind(amount)
                .execute(&mut *tx)
                .await?;

                if debited.rows_affected() == 0 {
                    return Err(AppError::InsufficientFunds);
                }

                sqlx::query("UPDATE accounts SET balance = balance + $2 WHERE id = $1")
                    .bind(destination)
                    .bind(amount)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        let updated = sqlx::query(
            "UPDATE transactions SET status = 'APPROVED' WHERE id = $1 AND status = 'PENDING'",
        )
        .bind(transaction_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(AppError::AlreadyCompleted);
        }

        tx.commit().await?;

        tracing::info!(transaction_id = %transaction_id, "Transaction approved");

        Ok(ApprovalResult {
            id: transaction_id,
            status: TransactionStatus::Approved,
        })
    }

    /// Reject a pending transaction. No balance effect.
    pub async fn reject(&self, transaction_id: Uuid) -> Result<ApprovalResult, AppError> {
        let updated = sqlx::query(
            "UPDATE transactions SET status = 'REJECTED' WHERE id = $1 AND status = 'PENDING'",
        )
        .bind(transaction_id)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM transactions WHERE id = $1)")
                    .bind(transaction_id)
                    .fetch_one(&self.pool)
                    .await?;

            return if exists {
                Err(AppError::AlreadyCompleted)
            } else {
                Err(AppError::NotFound("Transaction"))
            };
        }

        tracing::info!(transaction_id = %transaction_id, "Transaction rejected");

        Ok(ApprovalResult {
            id: transaction_id,
            status: TransactionStatus::Rejected,
        })
    }
}
