//! CSV audit trail: one append-only row per slice (spec §6 `trade_logs/*.csv`).
//!
//! Written with a plain manual writer rather than a `csv` crate dependency — the teacher's
//! workspace has no such dependency and the row shape here is fixed and small.

use std::path::Path;

use kimp_core::SymbolId;

use crate::error::ExecutorResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitSide {
    Entry,
    Exit,
}

impl SplitSide {
    fn as_str(self) -> &'static str {
        match self {
            SplitSide::Entry => "entry",
            SplitSide::Exit => "exit",
        }
    }
}

/// One row of the audit trail: a single entry or exit slice.
#[derive(Debug, Clone)]
pub struct SplitAuditRow {
    pub timestamp_ms: i64,
    pub symbol: SymbolId,
    pub side: SplitSide,
    pub quantity: f64,
    pub korean_price: f64,
    pub foreign_price: f64,
    pub usdt_rate: f64,
    pub pnl_krw: Option<f64>,
}

const HEADER: &str = "timestamp_ms,symbol,side,quantity,korean_price,foreign_price,usdt_rate,pnl_krw\n";

impl SplitAuditRow {
    fn to_csv_line(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{}\n",
            self.timestamp_ms,
            self.symbol,
            self.side.as_str(),
            self.quantity,
            self.korean_price,
            self.foreign_price,
            self.usdt_rate,
            self.pnl_krw.map(|v| v.to_string()).unwrap_or_default(),
        )
    }
}

/// Appends `row` to `path`, writing the header first if the file is new. Per spec §6:
/// `trade_logs/entry_splits.csv`, `trade_logs/exit_splits.csv`.
pub async fn append_audit_row(path: &Path, row: &SplitAuditRow) -> ExecutorResult<()> {
    use tokio::io::AsyncWriteExt;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let is_new = !tokio::fs::try_exists(path).await.unwrap_or(false);
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    if is_new {
        file.write_all(HEADER.as_bytes()).await?;
    }
    file.write_all(row.to_csv_line().as_bytes()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    fn scratch_path() -> std::path::PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("kimp-bot-test-audit-{n}.csv"))
    }

    fn sample_row() -> SplitAuditRow {
        SplitAuditRow {
            timestamp_ms: 1_700_000_000_000,
            symbol: SymbolId::new("BTC", "KRW"),
            side: SplitSide::Entry,
            quantity: 0.001,
            korean_price: 99_000_000.0,
            foreign_price: 68_000.0,
            usdt_rate: 1_450.0,
            pnl_krw: None,
        }
    }

    #[tokio::test]
    async fn first_row_writes_header() {
        let path = scratch_path();
        append_audit_row(&path, &sample_row()).await.unwrap();
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("timestamp_ms,"));
        assert!(lines[1].contains("BTC/KRW"));
        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn second_row_does_not_repeat_header() {
        let path = scratch_path();
        append_audit_row(&path, &sample_row()).await.unwrap();
        append_audit_row(&path, &sample_row()).await.unwrap();
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents.lines().count(), 3);
        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn exit_row_includes_pnl() {
        let path = scratch_path();
        let mut row = sample_row();
        row.side = SplitSide::Exit;
        row.pnl_krw = Some(12_345.67);
        append_audit_row(&path, &row).await.unwrap();
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(contents.contains("exit"));
        assert!(contents.contains("12345.67"));
        tokio::fs::remove_file(&path).await.unwrap();
    }
}
