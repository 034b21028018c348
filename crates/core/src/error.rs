//! Shared error type for data-model-level failures.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("unknown exchange id: {0}")]
    UnknownExchange(u16),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;
