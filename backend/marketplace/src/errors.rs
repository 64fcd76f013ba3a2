//! Application-wide error types.
//!
//! Every business-rule violation is surfaced as a typed failure; the API
//! layer maps each variant to a transport status code.  Nothing here is
//! fatal to the process — all failures are per-request.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MarketError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    Validation(String),

    #[error("Payment declined: {0}")]
    PaymentDeclined(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, MarketError>;
