//! Workflow handlers
//!
//! Each handler orchestrates one balance-affecting or OTP-gated flow over
//! the database. Route handlers stay thin; everything with an invariant
//! lives here.

mod approval_handler;
mod cash_handler;
mod commands;
mod transfer_handler;


pub use approval_handler::ApprovalHandler;
pub use cash_handler::CashHandler;
pub use commands::*;
pub use transfer_handler::TransferHandler;
