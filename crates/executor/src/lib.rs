//! Adaptive split-execution loop: hedge-first order placement, fill reconciliation,
//! position persistence, and the CSV audit trail (spec §4.6, §4.7, §6).

pub mod audit;
pub mod controller;
pub mod error;
pub mod persistence;

pub use audit::{append_audit_row, SplitAuditRow, SplitSide};
pub use controller::{build_external_position_blacklist, preset_leverage_all, ExecutionController, ExecutionOutcome};
pub use error::*;
pub use persistence::{load_snapshot, save_snapshot, PositionSnapshot};
