//! JSON dashboard exporter: a thin, low-priority task that serializes the latest premium
//! snapshot to disk on a fixed cadence (spec §4.11, §5). The exporter makes no trading
//! decisions; it only reads the Quote Cache and re-derives premiums with the batch
//! Premium Calculator.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use kimp_core::{Exchange, SymbolId};
use kimp_engine::entry_premium_batch;
use kimp_feeds::QuoteCache;
use serde::Serialize;

use crate::ws_server::{BroadcastSender, WsServerMessage};

#[derive(Debug, Clone, Serialize)]
pub struct PremiumSnapshotRow {
    pub symbol: String,
    pub korean_exchange: String,
    pub foreign_exchange: String,
    pub entry_premium_pct: f64,
    pub usdt_rate: f64,
    pub timestamp_ms: i64,
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as i64
}

/// Runs forever, writing `out_path` and republishing to `broadcast` every `interval` until
/// `shutdown` is observed (spec §4.11: the broadcast server republishes the same snapshots
/// the exporter writes to disk).
pub async fn run_dashboard_exporter(
    cache: Arc<QuoteCache>,
    pairs: Vec<(SymbolId, Exchange, Exchange)>,
    out_path: PathBuf,
    interval: Duration,
    shutdown: Arc<std::sync::atomic::AtomicBool>,
    broadcast: BroadcastSender,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        if shutdown.load(std::sync::atomic::Ordering::Acquire) {
            return;
        }

        let korean_asks: Vec<f64> = pairs.iter().map(|(s, k, _)| cache.get(*k, s).ask).collect();
        let foreign_bids: Vec<f64> = pairs.iter().map(|(s, _, f)| cache.get(*f, s).bid).collect();
        let mut premiums = vec![0.0; pairs.len()];

        let rows: Vec<PremiumSnapshotRow> = pairs
            .iter()
            .enumerate()
            .map(|(i, (symbol, korean_exchange, foreign_exchange))| {
                let usdt_rate = cache.get_usdt_rate(*korean_exchange);
                let single_korean_ask = [korean_asks[i]];
                let single_foreign_bid = [foreign_bids[i]];
                let mut single_out = [0.0];
                entry_premium_batch(&single_korean_ask, &single_foreign_bid, usdt_rate, &mut single_out);
                premiums[i] = single_out[0];
                PremiumSnapshotRow {
                    symbol: symbol.to_string(),
                    korean_exchange: korean_exchange.as_str().to_string(),
                    foreign_exchange: foreign_exchange.as_str().to_string(),
                    entry_premium_pct: single_out[0],
                    usdt_rate,
                    timestamp_ms: now_ms(),
                }
            })
            .collect();

        // Broadcast send only fails when there are no subscribers; that's routine, not an error.
        let _ = broadcast.send(WsServerMessage::Premiums(rows.clone()));

        if let Some(parent) = out_path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                tracing::error!(error = %e, "failed to create dashboard export directory");
                continue;
            }
        }
        match serde_json::to_vec_pretty(&rows) {
            Ok(json) => {
                let tmp_path = out_path.with_extension("tmp");
                if let Err(e) = tokio::fs::write(&tmp_path, &json).await {
                    tracing::error!(error = %e, "failed to write dashboard export temp file");
                    continue;
                }
                if let Err(e) = tokio::fs::rename(&tmp_path, &out_path).await {
                    tracing::error!(error = %e, "failed to publish dashboard export");
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to serialize dashboard export"),
        }
    }
}
