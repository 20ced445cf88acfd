//! Command and result definitions
//!
//! Commands represent intentions to change the system state; results are
//! what the API layer serializes back.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{CashStatus, TransactionStatus, TransactionType};
use crate::error::AppError;

// =========================================================================
// Transfer
// =========================================================================

/// Command to move money between two accounts owned by the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferCommand {
    pub from_account_id: Uuid,
    pub to_account_id: Uuid,
    /// Amount as string for precise decimal handling
    pub amount: String,
    pub description: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
}

/// Result of a successful transfer: the paired ledger entries
#[derive(Debug, Clone, Serialize)]
pub struct TransferResult {
    pub debit: TransactionRecord,
    pub credit: TransactionRecord,
}

// =========================================================================
// Cash request / confirm
// =========================================================================

/// Command to request cash from an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashRequestCommand {
    /// User id of the agent being asked to fulfill the request
    pub agent_id: Uuid,
    /// Whole-currency amount, bounded by route validation
    pub amount: i64,
}

/// Result of a cash request. The OTP itself never leaves the server;
/// clients only see the "SENT" acknowledgment.
#[derive(Debug, Clone, Serialize)]
pub struct CashRequestResult {
    pub id: Uuid,
    pub status: CashStatus,
    pub otp: &'static str,
}

/// Command to confirm a pending cash transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashConfirmCommand {
    pub transaction_id: Uuid,
    pub otp: String,
}

/// Result of a successful confirmation
#[derive(Debug, Clone, Serialize)]
pub struct CashConfirmResult {
    pub id: Uuid,
    pub status: CashStatus,
    pub completed_at: DateTime<Utc>,
}

// =========================================================================
// Ledger approval
// =========================================================================

/// Result of approving or rejecting a pending ledger transaction
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalResult {
    pub id: Uuid,
    pub status: TransactionStatus,
}

// =========================================================================
// Ledger rows
// =========================================================================

/// A transaction row as stored, before enum columns are parsed
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TransactionRow {
    pub id: Uuid,
    pub account_id: Uuid,
    #[sqlx(rename = "type")]
    pub tx_type: String,
    pub amount: Decimal,
    pub category_id: Option<Uuid>,
    pub to_account_id: Option<Uuid>,
    pub status: String,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl TransactionRow {
    pub fn into_record(self) -> Result<TransactionRecord, AppError> {
        Ok(TransactionRecord {
            id: self.id,
            account_id: self.account_id,
            tx_type: self.tx_type.parse()?,
            amount: self.amount,
            category_id: self.category_id,
            to_account_id: self.to_account_id,
            status: self.status.parse()?,
            description: self.description,
            occurred_at: self.occurred_at,
            created_at: self.created_at,
        })
    }
}

/// A ledger transaction as serialized to clients
#[derive(Debug, Clone, Serialize)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub account_id: Uuid,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub amount: Decimal,
    pub category_id: Option<Uuid>,
    pub to_account_id: Option<Uuid>,
    pub status: TransactionStatus,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
