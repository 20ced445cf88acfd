//! Cash Handler
//!
//! OTP-gated cash-in/cash-out between a user and a field agent. The request
//! phase creates a pending transaction and delivers the passcode out of
//! band; the confirm phase is agent-only and flips the row to confirmed
//! through a conditional update, so a passcode can never be consumed twice.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::domain::CashStatus;
use crate::error::AppError;
use crate::notify::OtpGateway;

use super::{CashConfirmCommand, CashConfirmResult, CashRequestCommand, CashRequestResult};

/// Passcodes expire 10 minutes after issuance.
const OTP_TTL_MINUTES: i64 = 10;

pub struct CashHandler {
    pool: PgPool,
    gateway: Arc<dyn OtpGateway>,
}

impl CashHandler {
    pub fn new(pool: PgPool, gateway: Arc<dyn OtpGateway>) -> Self {
        Self { pool, gateway }
    }

    /// Request cash from an agent. Creates a pending transaction with a
    /// fresh OTP and delivers the passcode to the caller's contact address.
    /// Delivery is best-effort: a failed send is logged and the transaction
    /// stands.
    pub async fn request(
        &self,
        caller: &AuthUser,
        command: CashRequestCommand,
    ) -> Result<CashRequestResult, AppError> {
        let agent: Option<(bool, bool)> = sqlx::query_as(
            "SELECT is_verified, is_banned FROM agent_profiles WHERE user_id = $1",
        )
        .bind(command.agent_id)
        .fetch_optional(&self.pool)
        .await?;

        match agent {
            Some((true, false)) => {}
            _ => return Err(AppError::AgentUnavailable),
        }

        let otp = generate_otp();
        let otp_expires_at = Utc::now() + Duration::minutes(OTP_TTL_MINUTES);
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO agent_transactions
                (id, user_id, agent_id, amount, status, otp, otp_expires_at)
            VALUES ($1, $2, $3, $4, 'pending', $5, $6)
            "#,
        )
        .bind(id)
        .bind(caller.id)
        .bind(command.agent_id)
        .bind(rust_decimal::Decimal::from(command.amount))
        .bind(&otp)
        .bind(otp_expires_at)
        .execute(&self.pool)
        .await?;

        if let Err(e) = self.gateway.send_otp(&caller.email, id, &otp).await {
            tracing::warn!(
                transaction_id = %id,
                error = %e,
                "OTP delivery failed; transaction remains pending"
            );
        }

        tracing::info!(
            transaction_id = %id,
            agent_id = %command.agent_id,
            "Cash transaction requested"
        );

        Ok(CashRequestResult {
            id,
            status: CashStatus::Pending,
            otp: "SENT",
        })
    }

    /// Confirm a pending cash transaction. Only the assigned agent may
    /// confirm, with the exact passcode, before expiry. State is mutated
    /// only when every check passes, and the flip to confirmed is guarded
    /// on the row still being pending.
    pub async fn confirm(
        &self,
        caller: &AuthUser,
        command: CashConfirmCommand,
    ) -> Result<CashConfirmResult, AppError> {
        let row: Option<(Uuid, String, String, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT agent_id, status, otp, otp_expires_at
            FROM agent_transactions
            WHERE id = $1
            "#,
        )
        .bind(command.transaction_id)
        .fetch_optional(&self.pool)
        .await?;

        let (agent_id, status, otp, otp_expires_at) =
            row.ok_or(AppError::NotFound("Transaction"))?;

        if status.parse::<CashStatus>()? != CashStatus::Pending {
            return Err(AppError::AlreadyCompleted);
        }

        if Utc::now() > otp_expires_at {
            return Err(AppError::OtpExpired);
        }

        if agent_id != caller.id {
            return Err(AppError::Forbidden(
                "You are not the assigned agent".to_string(),
            ));
        }

        if otp != command.otp {
            return Err(AppError::InvalidOtp);
        }

        // Single write, conditional on the row still being pending: a
        // concurrent confirmation cannot also get through.
        let completed_at: Option<DateTime<Utc>> = sqlx::query_scalar(
            r#"
            UPDATE agent_transactions
            SET status = 'confirmed', completed_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING completed_at
            "#,
        )
        .bind(command.transaction_id)
        .fetch_optional(&self.pool)
        .await?;

        let completed_at = completed_at.ok_or(AppError::AlreadyCompleted)?;

        tracing::info!(
            transaction_id = %command.transaction_id,
            agent_id = %caller.id,
            "Cash transaction confirmed"
        );

        Ok(CashConfirmResult {
            id: command.transaction_id,
            status: CashStatus::Confirmed,
            completed_at,
        })
    }
}

/// Generate a 6-digit numeric passcode.
fn generate_otp() -> String {
    let n: u32 = rand::thread_rng().gen_range(100_000..1_000_000);
    n.to_string()
}
