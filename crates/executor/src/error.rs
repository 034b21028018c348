//! Error types for execution operations, grounded on the teacher's
//! `crates/executor/src/error.rs` shape, narrowed to the hedge-execution failure modes
//! spec §7 lists and extended with the rollback/unhedged-balance variants that shape adds.

use thiserror::Error;

/// Errors that can occur while running the adaptive split-execution loop (spec §4.6, §7).
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("order rejected: {0}")]
    OrderRejected(String),

    #[error(
        "unhedged balance after exit-sell retries exhausted: symbol={symbol} residual={residual}"
    )]
    UnhedgedBalance { symbol: String, residual: f64 },

    #[error("symbol {0} is blacklisted (external position detected at startup)")]
    Blacklisted(String),

    #[error("leverage pre-set failed for {symbol}: {reason}")]
    LeverageSetFailed { symbol: String, reason: String },

    #[error("persistence write failed: {0}")]
    PersistenceFailed(String),

    #[error("feed error: {0}")]
    Feed(#[from] kimp_feeds::FeedError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;
