//! Position Persistence: atomic file snapshot on every slice, recovered on startup
//! (spec §4.7). Grounded on `Position`'s field list in the original's `types.hpp` and the
//! workspace's general `serde_json` usage; written as write-to-temp-then-rename, matching
//! spec §9's design note and the exact JSON schema in spec §6.

use std::path::Path;

use kimp_core::{Exchange, Position, SymbolId};
use serde::{Deserialize, Serialize};

use crate::error::{ExecutorError, ExecutorResult};

/// The on-disk snapshot schema from spec §6, flattened (no nested `symbol`/`exchange`
/// structs) so the file is a stable external contract independent of the in-memory
/// `Position`/`SymbolId`/`Exchange` representations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub symbol_base: String,
    pub symbol_quote: String,
    pub korean_exchange: String,
    pub foreign_exchange: String,
    pub entry_time_ms: i64,
    pub entry_premium: f64,
    pub position_size_usd: f64,
    pub korean_amount: f64,
    pub foreign_amount: f64,
    pub korean_entry_price: f64,
    pub foreign_entry_price: f64,
    pub realized_pnl_krw: f64,
    pub is_active: bool,
}

impl From<&Position> for PositionSnapshot {
    fn from(p: &Position) -> Self {
        Self {
            symbol_base: p.symbol.base.to_string(),
            symbol_quote: p.symbol.quote.to_string(),
            korean_exchange: p.korean_exchange.as_str().to_string(),
            foreign_exchange: p.foreign_exchange.as_str().to_string(),
            entry_time_ms: p.entry_time_ms,
            entry_premium: p.entry_premium,
            position_size_usd: p.position_size_usd,
            korean_amount: p.korean_amount,
            foreign_amount: p.foreign_amount,
            korean_entry_price: p.korean_entry_price,
            foreign_entry_price: p.foreign_entry_price,
            realized_pnl_krw: p.realized_pnl_krw,
            is_active: p.is_active,
        }
    }
}

fn exchange_from_name(name: &str) -> Option<Exchange> {
    [Exchange::Upbit, Exchange::Bithumb, Exchange::Bybit, Exchange::GateIO]
        .into_iter()
        .find(|e| e.as_str() == name)
}

impl TryFrom<PositionSnapshot> for Position {
    type Error = ExecutorError;

    fn try_from(s: PositionSnapshot) -> Result<Self, Self::Error> {
        let korean_exchange = exchange_from_name(&s.korean_exchange)
            .ok_or_else(|| ExecutorError::PersistenceFailed(format!("unknown korean_exchange: {}", s.korean_exchange)))?;
        let foreign_exchange = exchange_from_name(&s.foreign_exchange)
            .ok_or_else(|| ExecutorError::PersistenceFailed(format!("unknown foreign_exchange: {}", s.foreign_exchange)))?;
        Ok(Position {
            symbol: SymbolId::new(s.symbol_base, s.symbol_quote),
            korean_exchange,
            foreign_exchange,
            entry_time_ms: s.entry_time_ms,
            entry_premium: s.entry_premium,
            korean_amount: s.korean_amount,
            foreign_amount: s.foreign_amount,
            korean_entry_price: s.korean_entry_price,
            foreign_entry_price: s.foreign_entry_price,
            realized_pnl_krw: s.realized_pnl_krw,
            position_size_usd: s.position_size_usd,
            is_active: s.is_active,
        })
    }
}

/// Writes `position` to `path` atomically (temp file + rename). `None` deletes any existing
/// snapshot (spec §4.7: "a null snapshot means no open position").
pub async fn save_snapshot(path: &Path, position: Option<&Position>) -> ExecutorResult<()> {
    match position {
        None => {
            if tokio::fs::try_exists(path).await.unwrap_or(false) {
                tokio::fs::remove_file(path).await?;
            }
            Ok(())
        }
        Some(position) => {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let snapshot = PositionSnapshot::from(position);
            let json = serde_json::to_vec_pretty(&snapshot)?;
            let tmp_path = path.with_extension("tmp");
            tokio::fs::write(&tmp_path, &json).await?;
            tokio::fs::rename(&tmp_path, path).await?;
            Ok(())
        }
    }
}

/// Reads and reconstructs a `Position` from `path`, if a snapshot exists. Used on process
/// startup to re-arm the exit-only loop for a recovered position (spec §4.7, Scenario S6).
pub async fn load_snapshot(path: &Path) -> ExecutorResult<Option<Position>> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Ok(None);
    }
    let bytes = tokio::fs::read(path).await?;
    let snapshot: PositionSnapshot = serde_json::from_slice(&bytes)?;
    Ok(Some(Position::try_from(snapshot)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    fn scratch_path(name: &str) -> std::path::PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("kimp-bot-test-{name}-{n}.json"))
    }

    fn sample_position() -> Position {
        Position::open(
            SymbolId::new("ETH", "KRW"),
            Exchange::Bithumb,
            Exchange::Bybit,
            1_700_000_000_000,
            -0.80,
            250.0,
            0.25,
            0.25,
            3_000_000.0,
            2.0,
        )
    }

    #[tokio::test]
    async fn round_trips_field_by_field() {
        let path = scratch_path("roundtrip");
        let position = sample_position();
        save_snapshot(&path, Some(&position)).await.unwrap();
        let loaded = load_snapshot(&path).await.unwrap().unwrap();
        assert_eq!(loaded, position);
        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn saving_none_deletes_existing_snapshot() {
        let path = scratch_path("delete");
        let position = sample_position();
        save_snapshot(&path, Some(&position)).await.unwrap();
        save_snapshot(&path, None).await.unwrap();
        assert!(load_snapshot(&path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let path = scratch_path("missing");
        assert!(load_snapshot(&path).await.unwrap().is_none());
    }
}
