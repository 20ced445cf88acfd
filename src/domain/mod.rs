//! Domain module
//!
//! Core business types and rules, independent of the web and database layers.

mod amount;
mod error;
pub mod geo;
mod types;

pub use amount::{Amount, AmountError, Balance};
pub use error::DomainError;
pub use types::{CashStatus, Role, TransactionStatus, TransactionType};
