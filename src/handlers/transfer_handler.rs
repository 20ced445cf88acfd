//! Transfer Handler
//!
//! User-initiated transfer between two of the caller's own accounts. The
//! debit, the credit, and both ledger rows commit or roll back together,
//! and the sufficiency check happens inside the debiting UPDATE itself so
//! two concurrent transfers cannot both drain the same balance.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::domain::{Amount, DomainError};
use crate::error::AppError;

use super::{TransactionRow, TransferCommand, TransferResult};

pub struct TransferHandler {
    pool: PgPool,
}

impl TransferHandler {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn execute(
        &self,
        command: TransferCommand,
        caller: &AuthUser,
    ) -> Result<TransferResult, AppError> {
        if command.from_account_id == command.to_account_id {
            return Err(DomainError::SameAccountTransfer.into());
        }

        let amount: Amount = command
            .amount
            .parse()
            .map_err(|e: crate::domain::AmountError| AppError::Validation(e.to_string()))?;

        let occurred_at = command.occurred_at.unwrap_or_else(Utc::now);

        let mut tx = self.pool.begin().await?;

        // Both accounts must exist and belong to the caller
        for account_id in [command.from_account_id, command.to_account_id] {
            let owned: Option<Uuid> =
                sqlx::query_scalar("SELECT id FROM accounts WHERE id = $1 AND user_id = $2")
                    .bind(account_id)
                    .bind(caller.id)
                    .fetch_optional(&mut *tx)
                    .await?;

            if owned.is_none() {
                return Err(AppError::NotFound("Account"));
            }
        }

        // Debit only succeeds if the balance is still sufficient at write time
        let debited = sqlx::query(
            r#"
            UPDATE accounts
            SET balance = balance - $2
            WHERE id = $1 AND balance >= $2
            "#,
        )
        .bind(command.from_account_id)
        .bind(amount.value())
        .execute(&mut *tx)
        .await?;

        if debited.rows_affected() == 0 {
            return Err(AppError::InsufficientFunds);
        }

        sqlx::query("UPDATE accounts SET balance = balance + $2 WHERE id = $1")
            .bind(command.to_account_id)
            .bind(amount.value())
            .execute(&mut *tx)
            .await?;

        let debit_row: TransactionRow = sqlx::query_as(
            r#"
            INSERT INTO transactions
                (id, account_id, type, amount, to_account_id, status, description, occurred_at)
            VALUES ($1, $2, 'TRANSFER', $3, $4, 'APPROVED', $5, $6)
            RETURNING id, account_id, type, amount, category_id, to_account_id,
                      status, description, occurred_at, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(command.from_account_id)
        .bind(amount.value())
        .bind(command.to_account_id)
        .bind(
            command
                .description
                .clone()
                .unwrap_or_else(|| "Transfer out".to_string()),
        )
        .bind(occurred_at)
        .fetch_one(&mut *tx)
        .await?;

        let credit_row: TransactionRow = sqlx::query_as(
            r#"
            INSERT INTO transactions
                (id, account_id, type, amount, to_account_id, status, description, occurred_at)
            VALUES ($1, $2, 'TRANSFER', $3, $4, 'APPROVED', $5, $6)
            RETURNING id, account_id, type, amount, category_id, to_account_id,
                      status, description, occurred_at, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(command.to_account_id)
        .bind(amount.value())
        .bind(command.from_account_id)
        .bind(
            command
                .description
                .unwrap_or_else(|| "Transfer in".to_string()),
        )
        .bind(occurred_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            from = %command.from_account_id,
            to = %command.to_account_id,
            amount = %amount,
            "Transfer completed"
        );

        Ok(TransferResult {
            debit: debit_row.into_record()?,
            credit: credit_row.into_record()?,
        })
    }
}
