//! Cash Platform Library
//!
//! Re-exports modules for integration testing and external use.

pub mod api;
pub mod audit;
pub mod auth;
pub mod domain;
pub mod handlers;
pub mod jobs;
pub mod metrics;
pub mod notify;
pub mod state;

// Private modules (used only by main.rs binary)
pub mod config;
pub mod db;
mod error;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use domain::{Amount, AmountError, Balance, DomainError};
pub use state::AppState;
