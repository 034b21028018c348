//! Execution Controller: the adaptive split-execution loop (spec §4.6).
//!
//! Grounded directly on the original's adaptive loop (entry-slice / exit-slice / wait
//! branches in `order_manager.cpp`) and structurally on the teacher's
//! `crates/executor/src/cex.rs` `CexExecutor::execute` retry-loop shape (submit, on
//! rejection sleep and retry up to a bound) plus its `Order`/fill-reconciliation field
//! conventions, now applied to a hedge pair instead of a single-venue order.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kimp_core::{Exchange, EntrySignal, OrderResult, Position, Quote, SymbolId, TradingConfig};
use kimp_engine::{PositionTracker, SignalEngine};
use kimp_feeds::{ForeignPerpCapability, KoreanSpotCapability, QuoteCache};

use crate::audit::{append_audit_row, SplitAuditRow, SplitSide};
use crate::error::{ExecutorError, ExecutorResult};
use crate::persistence::save_snapshot;

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as i64
}

/// Outcome of a completed (or shutdown-interrupted) execution loop.
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    /// The position was fully unwound; carries the total realized PnL (KRW).
    Closed { realized_pnl_krw: f64 },
    /// The process-wide shutdown flag was observed; the partial position (if any) has
    /// already been persisted by the loop before returning.
    ShutdownPartial,
}

/// The one hard engineering decision this component makes: slices the target notional
/// into `SLICE_USD`-sized pieces, opening the foreign leg first and matching the Korean
/// leg to its actual fill (spec glossary: "hedge-first").
pub struct ExecutionController {
    korean: Arc<dyn KoreanSpotCapability>,
    foreign: Arc<dyn ForeignPerpCapability>,
    cache: Arc<QuoteCache>,
    tracker: Arc<PositionTracker>,
    signal_engine: Arc<SignalEngine>,
    config: TradingConfig,
    shutdown: Arc<AtomicBool>,
    snapshot_path: PathBuf,
    entry_audit_path: PathBuf,
    exit_audit_path: PathBuf,
}

impl ExecutionController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        korean: Arc<dyn KoreanSpotCapability>,
        foreign: Arc<dyn ForeignPerpCapability>,
        cache: Arc<QuoteCache>,
        tracker: Arc<PositionTracker>,
        signal_engine: Arc<SignalEngine>,
        config: TradingConfig,
        shutdown: Arc<AtomicBool>,
        snapshot_path: PathBuf,
        entry_audit_path: PathBuf,
        exit_audit_path: PathBuf,
    ) -> Self {
        Self {
            korean,
            foreign,
            cache,
            tracker,
            signal_engine,
            config,
            shutdown,
            snapshot_path,
            entry_audit_path,
            exit_audit_path,
        }
    }

    fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn fresh_quotes(&self, symbol: &SymbolId, korean_exchange: Exchange, foreign_exchange: Exchange) -> (Quote, Quote, f64) {
        let korean = self.cache.get(korean_exchange, symbol);
        let foreign = self.cache.get(foreign_exchange, symbol);
        let usdt_rate = self.cache.get_usdt_rate(korean_exchange);
        (korean, foreign, usdt_rate)
    }

    /// Runs the adaptive split loop for `signal.symbol` from a fresh entry signal. Opens
    /// the position on the first filled slice.
    ///
    /// `entry_enabled` gates whether the per-iteration decision procedure may place entry
    /// slices at all; it is `false` for a loop re-armed from a crash-recovered snapshot
    /// (spec §4.7, Scenario S6: "entry scans for ETH/KRW are suppressed while the position
    /// is open" — here narrowed further to "this recovered loop never re-enters").
    pub async fn run_from_entry_signal(&self, signal: EntrySignal) -> ExecutorResult<ExecutionOutcome> {
        self.run(signal.symbol, signal.korean_exchange, signal.foreign_exchange, true)
            .await
    }

    /// Re-arms an exit-only loop for a position recovered from the persisted snapshot at
    /// startup (spec §4.7, Scenario S6).
    pub async fn run_exit_only(&self, symbol: SymbolId, korean_exchange: Exchange, foreign_exchange: Exchange) -> ExecutorResult<ExecutionOutcome> {
        self.run(symbol, korean_exchange, foreign_exchange, false).await
    }

    async fn run(
        &self,
        symbol: SymbolId,
        korean_exchange: Exchange,
        foreign_exchange: Exchange,
        entry_enabled: bool,
    ) -> ExecutorResult<ExecutionOutcome> {
        let lot_size = self.foreign.lot_size(&symbol).await?;

        loop {
            if self.is_shutting_down() {
                return Ok(ExecutionOutcome::ShutdownPartial);
            }

            let (korean_quote, foreign_quote, usdt_rate) = self.fresh_quotes(&symbol, korean_exchange, foreign_exchange);
            if !korean_quote.is_valid() || !foreign_quote.is_valid() || usdt_rate <= 0.0 {
                self.wait(&symbol).await;
                continue;
            }

            let entry_premium = kimp_engine::entry_premium(korean_quote.ask, foreign_quote.bid, usdt_rate);
            let exit_premium = kimp_engine::exit_premium(korean_quote.bid, foreign_quote.ask, usdt_rate);
            let position = self.tracker.get_position(&symbol);
            let held_amount = position.as_ref().map(|p| p.korean_amount).unwrap_or(0.0);
            let target_usd = position
                .as_ref()
                .map(|p| p.position_size_usd)
                .unwrap_or(self.config.position_size_usd);
            let held_usd = held_amount * foreign_quote.bid;

            let should_enter = entry_enabled && entry_premium <= self.config.entry_threshold_pct && held_usd < target_usd;
            let should_exit = held_amount > 0.0 && {
                let threshold = position
                    .as_ref()
                    .map(|p| self.config.dynamic_exit_threshold(p.entry_premium))
                    .unwrap_or(self.config.exit_floor_pct);
                exit_premium >= threshold
            };

            if should_enter {
                self.entry_slice(
                    &symbol,
                    korean_exchange,
                    foreign_exchange,
                    korean_quote.ask,
                    foreign_quote.bid,
                    entry_premium,
                    usdt_rate,
                    &lot_size,
                )
                .await?;
            } else if should_exit {
                let position = position.expect("should_exit implies an active position");
                let outcome = self
                    .exit_slice(&symbol, korean_quote.bid, foreign_quote.ask, usdt_rate, &position, &lot_size)
                    .await?;
                if let Some(outcome) = outcome {
                    return Ok(outcome);
                }
            } else {
                self.wait(&symbol).await;
            }
        }
    }

    async fn wait(&self, symbol: &SymbolId) {
        let _ = symbol;
        let since = self.signal_engine.update_seq();
        self.signal_engine
            .wait_for_update(since, Duration::from_millis(self.config.slice_interval_ms))
            .await;
    }

    /// Entry slice, hedge-first (spec §4.6 "Entry slice").
    #[allow(clippy::too_many_arguments)]
    async fn entry_slice(
        &self,
        symbol: &SymbolId,
        korean_exchange: Exchange,
        foreign_exchange: Exchange,
        korean_ask: f64,
        foreign_bid: f64,
        entry_premium: f64,
        usdt_rate: f64,
        lot_size: &kimp_core::LotSizeMetadata,
    ) -> ExecutorResult<()> {
        let existing = self.tracker.get_position(symbol);
        let target_usd = existing.as_ref().map(|p| p.position_size_usd).unwrap_or(self.config.position_size_usd);
        let held_usd = existing.as_ref().map(|p| p.korean_amount * foreign_bid).unwrap_or(0.0);
        let remaining_usd = (target_usd - held_usd).max(0.0);

        let raw_qty = (self.config.slice_usd / foreign_bid).min(remaining_usd / foreign_bid);
        let slice_qty = lot_size.normalize(raw_qty);

        // 1-2. Place the foreign short first; retry on rejection until the process shuts down.
        let foreign_order = match self.place_with_retry(|| self.foreign.open_short(symbol, slice_qty)).await {
            Some(order) => order,
            None => return Ok(()), // shutdown observed mid-retry
        };

        // 3. Reconcile the actual fill; the lot-size-normalized request is the fallback.
        let actual_filled = foreign_order.reconciled_quantity(slice_qty);
        if actual_filled <= 0.0 {
            return Ok(());
        }

        // 4. Check the matching Korean notional against the venue minimum.
        let korean_notional = actual_filled * korean_ask;
        if korean_notional < self.config.min_order_krw {
            tracing::warn!(%symbol, actual_filled, korean_notional, "entry slice below min Korean order size, rolling back");
            self.rollback_foreign(symbol, actual_filled).await;
            return Ok(());
        }

        // 5. Match with a Korean-venue market buy for exactly `actual_filled`.
        let korean_order = match self.korean.place_market_buy_quantity(symbol, actual_filled).await {
            Ok(order) if !order.status.is_rejected() => order,
            _ => {
                tracing::error!(%symbol, actual_filled, "Korean buy failed after foreign fill, rolling back short");
                self.rollback_foreign(symbol, actual_filled).await;
                return Ok(());
            }
        };
        let korean_price = if korean_order.average_price > 0.0 {
            korean_order.average_price
        } else {
            korean_ask
        };
        let foreign_price = if foreign_order.average_price > 0.0 {
            foreign_order.average_price
        } else {
            foreign_bid
        };

        // 6. Update running sums, persist, and audit.
        let mut position = match existing {
            Some(mut p) => {
                p.add_entry_slice(actual_filled, korean_price, foreign_price);
                p
            }
            None => Position::open(
                symbol.clone(),
                korean_exchange,
                foreign_exchange,
                now_ms(),
                entry_premium,
                self.config.position_size_usd,
                actual_filled,
                actual_filled,
                korean_price,
                foreign_price,
            ),
        };
        position.is_active = true;

        if !self.tracker.has_position(symbol) {
            self.tracker.open_position(position.clone());
        } else {
            self.tracker.update_position(symbol, position.clone());
        }

        if let Err(e) = save_snapshot(&self.snapshot_path, Some(&position)).await {
            tracing::error!(%symbol, error = %e, "failed to persist entry slice snapshot");
        }
        if let Err(e) = append_audit_row(
            &self.entry_audit_path,
            &SplitAuditRow {
                timestamp_ms: now_ms(),
                symbol: symbol.clone(),
                side: SplitSide::Entry,
                quantity: actual_filled,
                korean_price,
                foreign_price,
                usdt_rate,
                pnl_krw: None,
            },
        )
        .await
        {
            tracing::error!(%symbol, error = %e, "failed to append entry audit row");
        }

        Ok(())
    }

    /// Exit slice, hedge-first (spec §4.6 "Exit slice"). Returns `Some(outcome)` once the
    /// position is fully closed, `None` if a partial slice leaves the position open.
    async fn exit_slice(
        &self,
        symbol: &SymbolId,
        korean_bid: f64,
        foreign_ask: f64,
        usdt_rate: f64,
        position: &Position,
        lot_size: &kimp_core::LotSizeMetadata,
    ) -> ExecutorResult<Option<ExecutionOutcome>> {
        let remaining_usd = position.korean_amount * foreign_ask;
        let raw_qty = if remaining_usd < self.config.small_close_threshold_usd {
            position.korean_amount
        } else {
            (self.config.slice_usd / foreign_ask).min(position.korean_amount)
        };
        let slice_qty = lot_size.normalize(raw_qty).min(position.korean_amount);
        if slice_qty <= 0.0 {
            return Ok(None);
        }

        // 1-2. Cover the foreign short first.
        let cover_order = match self.place_with_retry(|| self.foreign.close_short(symbol, slice_qty)).await {
            Some(order) => order,
            None => return Ok(None), // shutdown observed mid-retry
        };

        // 3. Reconcile the actual covered amount.
        let actual_covered = cover_order.reconciled_quantity(slice_qty).min(position.korean_amount);
        if actual_covered <= 0.0 {
            return Ok(None);
        }
        let cover_price = if cover_order.average_price > 0.0 {
            cover_order.average_price
        } else {
            foreign_ask
        };

        // 4. Sell the matching Korean amount, retrying up to `exit_sell_max_retries` times
        // with linear backoff.
        let sell_result = self.sell_korean_with_linear_backoff(symbol, actual_covered).await;

        let mut position = position.clone();
        match sell_result {
            Some(sell_order) => {
                let sell_price = if sell_order.average_price > 0.0 {
                    sell_order.average_price
                } else {
                    korean_bid
                };

                // 5. Slice PnL from weighted-average entry prices.
                let korean_pnl_krw = (sell_price - position.korean_entry_price) * actual_covered;
                let foreign_pnl_usd = (position.foreign_entry_price - cover_price) * actual_covered;
                let slice_pnl_krw = korean_pnl_krw + foreign_pnl_usd * usdt_rate;

                // 6-7. Scale down cost basis, persist, audit.
                position.reduce_by_exit_slice(actual_covered, slice_pnl_krw);

                if position.korean_amount <= 1e-12 {
                    self.tracker.close_position(symbol);
                    if let Err(e) = save_snapshot(&self.snapshot_path, None).await {
                        tracing::error!(%symbol, error = %e, "failed to delete closed-position snapshot");
                    }
                } else {
                    self.tracker.update_position(symbol, position.clone());
                    if let Err(e) = save_snapshot(&self.snapshot_path, Some(&position)).await {
                        tracing::error!(%symbol, error = %e, "failed to persist exit slice snapshot");
                    }
                }
                if let Err(e) = append_audit_row(
                    &self.exit_audit_path,
                    &SplitAuditRow {
                        timestamp_ms: now_ms(),
                        symbol: symbol.clone(),
                        side: SplitSide::Exit,
                        quantity: actual_covered,
                        korean_price: sell_price,
                        foreign_price: cover_price,
                        usdt_rate,
                        pnl_krw: Some(slice_pnl_krw),
                    },
                )
                .await
                {
                    tracing::error!(%symbol, error = %e, "failed to append exit audit row");
                }

                if position.korean_amount <= 1e-12 {
                    Ok(Some(ExecutionOutcome::Closed {
                        realized_pnl_krw: position.realized_pnl_krw,
                    }))
                } else {
                    Ok(None)
                }
            }
            None => {
                // Per spec §4.6/§7: all retries failed. The foreign leg is already covered;
                // the process now holds an unhedged Korean-spot balance. Log critical and
                // continue without synthetic recovery (spec §9 Open Question, resolved in
                // DESIGN.md: no re-short, no paging).
                tracing::error!(
                    %symbol,
                    residual = actual_covered,
                    "unhedged balance: foreign leg covered but Korean sell failed after all retries"
                );
                Err(ExecutorError::UnhedgedBalance {
                    symbol: symbol.to_string(),
                    residual: actual_covered,
                })
            }
        }
    }

    /// Retries a rejected order submission at the slice interval until it succeeds or
    /// shutdown is observed, mirroring the teacher's `CexExecutor::execute` submit loop.
    async fn place_with_retry<Fut>(&self, mut submit: impl FnMut() -> Fut) -> Option<OrderResult>
    where
        Fut: std::future::Future<Output = Result<OrderResult, kimp_feeds::FeedError>>,
    {
        loop {
            match submit().await {
                Ok(order) if !order.status.is_rejected() => return Some(order),
                Ok(_) | Err(_) => {
                    if self.is_shutting_down() {
                        return None;
                    }
                    tokio::time::sleep(Duration::from_millis(self.config.slice_interval_ms)).await;
                }
            }
        }
    }

    /// Korean-sell-after-cover retry policy (spec §4.6 step 4): up to
    /// `exit_sell_max_retries` attempts, backoff `exit_sell_backoff_base_ms * attempt`.
    async fn sell_korean_with_linear_backoff(&self, symbol: &SymbolId, qty: f64) -> Option<OrderResult> {
        for attempt in 1..=self.config.exit_sell_max_retries {
            match self.korean.place_market_sell(symbol, qty).await {
                Ok(order) if !order.status.is_rejected() => return Some(order),
                _ => {
                    if attempt < self.config.exit_sell_max_retries {
                        let backoff = self.config.exit_sell_backoff_base_ms * attempt as u64;
                        tokio::time::sleep(Duration::from_millis(backoff)).await;
                    }
                }
            }
        }
        None
    }

    /// Rolls back a foreign short fill when the matching Korean leg cannot be placed
    /// (Scenario S5). Best-effort: covers `qty` and logs on failure rather than looping
    /// forever, since the caller has no further state to reconcile once this returns.
    async fn rollback_foreign(&self, symbol: &SymbolId, qty: f64) {
        if let Err(e) = self.foreign.close_short(symbol, qty).await {
            tracing::error!(%symbol, qty, error = %e, "rollback cover failed; may be left with a naked short");
        }
    }
}

/// Pre-sets leverage to 1x for every foreign-perpetual tradable symbol at startup
/// (spec §4.6 "Preconditions"). "Already at this leverage" is treated as success by the
/// adapter per spec §4.8, so any remaining error here is logged and skipped rather than
/// aborting startup for the whole symbol set.
pub async fn preset_leverage_all(foreign: &dyn ForeignPerpCapability, symbols: &[SymbolId], leverage: u8) {
    for symbol in symbols {
        if let Err(e) = foreign.set_leverage(symbol, leverage).await {
            tracing::error!(%symbol, error = %e, "leverage pre-set failed");
        }
    }
}

/// Builds the external-position blacklist at startup by scanning balances and foreign
/// positions the bot did not create (spec §4.6 "Preconditions", §7 "External-position
/// detected at startup").
pub async fn build_external_position_blacklist(
    korean: &dyn KoreanSpotCapability,
    foreign: &dyn ForeignPerpCapability,
    symbols: &[SymbolId],
) -> std::collections::HashSet<SymbolId> {
    let mut blacklist = std::collections::HashSet::new();

    if let Ok(foreign_positions) = foreign.positions().await {
        for (symbol, qty) in foreign_positions {
            if qty != 0.0 {
                blacklist.insert(symbol);
            }
        }
    }

    for symbol in symbols {
        if blacklist.contains(symbol) {
            continue;
        }
        if let Ok(balance) = korean.balance(&symbol.base).await {
            if balance > 0.0 {
                blacklist.insert(symbol.clone());
            }
        }
    }

    blacklist
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kimp_core::{LotSizeMetadata, OrderStatus, QualityCaps};
    use kimp_feeds::{ExchangeCapability, FeedError};
    use std::sync::Mutex as StdMutex;

    struct StubKorean {
        buy_calls: StdMutex<Vec<f64>>,
        sell_calls: StdMutex<Vec<f64>>,
        reject_buy: bool,
        sell_outcomes: StdMutex<Vec<bool>>,
    }

    impl StubKorean {
        fn new() -> Self {
            Self {
                buy_calls: StdMutex::new(Vec::new()),
                sell_calls: StdMutex::new(Vec::new()),
                reject_buy: false,
                sell_outcomes: StdMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ExchangeCapability for StubKorean {
        async fn connect(&self) -> Result<(), FeedError> {
            Ok(())
        }
        async fn disconnect(&self) -> Result<(), FeedError> {
            Ok(())
        }
        async fn subscribe_ticker(&self, _symbols: &[SymbolId]) -> Result<(), FeedError> {
            Ok(())
        }
        async fn available_symbols(&self) -> Result<Vec<SymbolId>, FeedError> {
            Ok(Vec::new())
        }
        async fn balance(&self, _currency: &str) -> Result<f64, FeedError> {
            Ok(0.0)
        }
    }

    #[async_trait]
    impl KoreanSpotCapability for StubKorean {
        async fn place_market_buy_cost(&self, _symbol: &SymbolId, krw: f64) -> Result<OrderResult, FeedError> {
            Ok(OrderResult {
                order_id_str: "1".into(),
                status: OrderStatus::Filled,
                filled_quantity: krw,
                average_price: 1.0,
            })
        }
        async fn place_market_buy_quantity(&self, _symbol: &SymbolId, qty: f64) -> Result<OrderResult, FeedError> {
            self.buy_calls.lock().unwrap().push(qty);
            if self.reject_buy {
                return Ok(OrderResult {
                    order_id_str: "r".into(),
                    status: OrderStatus::Rejected,
                    filled_quantity: 0.0,
                    average_price: 0.0,
                });
            }
            Ok(OrderResult {
                order_id_str: "k1".into(),
                status: OrderStatus::Filled,
                filled_quantity: qty,
                average_price: 99_000_000.0,
            })
        }
        async fn place_market_sell(&self, _symbol: &SymbolId, qty: f64) -> Result<OrderResult, FeedError> {
            self.sell_calls.lock().unwrap().push(qty);
            let mut outcomes = self.sell_outcomes.lock().unwrap();
            let succeed = if outcomes.is_empty() { true } else { outcomes.remove(0) };
            if succeed {
                Ok(OrderResult {
                    order_id_str: "s1".into(),
                    status: OrderStatus::Filled,
                    filled_quantity: qty,
                    average_price: 99_500_000.0,
                })
            } else {
                Ok(OrderResult {
                    order_id_str: "r".into(),
                    status: OrderStatus::Rejected,
                    filled_quantity: 0.0,
                    average_price: 0.0,
                })
            }
        }
        async fn get_usdt_krw_price(&self) -> Result<f64, FeedError> {
            Ok(1_450.0)
        }
    }

    struct StubForeign {
        short_calls: StdMutex<Vec<f64>>,
        cover_calls: StdMutex<Vec<f64>>,
    }

    impl StubForeign {
        fn new() -> Self {
            Self {
                short_calls: StdMutex::new(Vec::new()),
                cover_calls: StdMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ExchangeCapability for StubForeign {
        async fn connect(&self) -> Result<(), FeedError> {
            Ok(())
        }
        async fn disconnect(&self) -> Result<(), FeedError> {
            Ok(())
        }
        async fn subscribe_ticker(&self, _symbols: &[SymbolId]) -> Result<(), FeedError> {
            Ok(())
        }
        async fn available_symbols(&self) -> Result<Vec<SymbolId>, FeedError> {
            Ok(Vec::new())
        }
        async fn balance(&self, _currency: &str) -> Result<f64, FeedError> {
            Ok(0.0)
        }
    }

    #[async_trait]
    impl ForeignPerpCapability for StubForeign {
        async fn open_short(&self, _symbol: &SymbolId, qty: f64) -> Result<OrderResult, FeedError> {
            self.short_calls.lock().unwrap().push(qty);
            Ok(OrderResult {
                order_id_str: "f1".into(),
                status: OrderStatus::Filled,
                filled_quantity: qty,
                average_price: 68_000.0,
            })
        }
        async fn close_short(&self, _symbol: &SymbolId, qty: f64) -> Result<OrderResult, FeedError> {
            self.cover_calls.lock().unwrap().push(qty);
            Ok(OrderResult {
                order_id_str: "f2".into(),
                status: OrderStatus::Filled,
                filled_quantity: qty,
                average_price: 67_500.0,
            })
        }
        async fn set_leverage(&self, _symbol: &SymbolId, _leverage: u8) -> Result<(), FeedError> {
            Ok(())
        }
        async fn positions(&self) -> Result<Vec<(SymbolId, f64)>, FeedError> {
            Ok(Vec::new())
        }
        async fn lot_size(&self, _symbol: &SymbolId) -> Result<LotSizeMetadata, FeedError> {
            Ok(LotSizeMetadata {
                min_qty: 0.001,
                qty_step: 0.001,
                min_notional: 0.0,
            })
        }
        async fn funding(&self, _symbol: &SymbolId) -> Result<(f64, u32, i64), FeedError> {
            Ok((0.0001, 8, 0))
        }
    }

    fn test_config() -> TradingConfig {
        TradingConfig {
            slice_usd: 25.0,
            position_size_usd: 25.0,
            small_close_threshold_usd: 50.0,
            min_order_krw: 1.0,
            slice_interval_ms: 1,
            exit_sell_max_retries: 3,
            exit_sell_backoff_base_ms: 1,
            quality: QualityCaps::default(),
            ..TradingConfig::default()
        }
    }

    fn scratch_paths(name: &str) -> (PathBuf, PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join(format!("kimp-bot-test-ctrl-{name}"));
        (dir.join("pos.json"), dir.join("entry.csv"), dir.join("exit.csv"))
    }

    #[tokio::test]
    async fn entry_slice_opens_hedged_position() {
        let korean = Arc::new(StubKorean::new());
        let foreign = Arc::new(StubForeign::new());
        let cache = Arc::new(QuoteCache::new());
        let tracker = Arc::new(PositionTracker::new(1));
        let sink: Arc<dyn kimp_engine::SignalSink> = Arc::new(NullSink);
        let shutdown = Arc::new(AtomicBool::new(false));
        let engine = Arc::new(SignalEngine::new(
            cache.clone(),
            tracker.clone(),
            test_config(),
            Vec::new(),
            sink,
            shutdown.clone(),
        ));

        let symbol = SymbolId::new("BTC", "KRW");
        cache.update_usdt_rate(Exchange::Upbit, 1_450.0, 3.0);
        cache.update(Exchange::Bybit, &symbol, 67_990.0, 68_000.0, 68_000.0, now_ms());
        cache.update(Exchange::Upbit, &symbol, 97_000_000.0, 97_010_000.0, 97_000_000.0, now_ms());

        let (snapshot_path, entry_csv, exit_csv) = scratch_paths("open");
        let controller = ExecutionController::new(
            korean.clone(),
            foreign.clone(),
            cache,
            tracker.clone(),
            engine,
            test_config(),
            shutdown,
            snapshot_path,
            entry_csv,
            exit_csv,
        );

        let lot_size = LotSizeMetadata {
            min_qty: 0.001,
            qty_step: 0.001,
            min_notional: 0.0,
        };
        controller
            .entry_slice(&symbol, Exchange::Upbit, Exchange::Bybit, 97_010_000.0, 68_000.0, -1.0, 1_450.0, &lot_size)
            .await
            .unwrap();

        let position = tracker.get_position(&symbol).unwrap();
        assert!(position.is_hedged());
        assert_eq!(foreign.short_calls.lock().unwrap().len(), 1);
        assert_eq!(korean.buy_calls.lock().unwrap().len(), 1);
    }

    struct NullSink;
    impl kimp_engine::SignalSink for NullSink {
        fn on_entry(&self, _signal: kimp_core::EntrySignal) {}
        fn on_exit(&self, _signal: kimp_core::ExitSignal) {}
    }

    #[tokio::test]
    async fn blacklist_includes_symbols_with_existing_balance() {
        struct BalanceKorean;
        #[async_trait]
        impl ExchangeCapability for BalanceKorean {
            async fn connect(&self) -> Result<(), FeedError> {
                Ok(())
            }
            async fn disconnect(&self) -> Result<(), FeedError> {
                Ok(())
            }
            async fn subscribe_ticker(&self, _s: &[SymbolId]) -> Result<(), FeedError> {
                Ok(())
            }
            async fn available_symbols(&self) -> Result<Vec<SymbolId>, FeedError> {
                Ok(Vec::new())
            }
            async fn balance(&self, currency: &str) -> Result<f64, FeedError> {
                if currency == "BTC" {
                    Ok(0.5)
                } else {
                    Ok(0.0)
                }
            }
        }
        #[async_trait]
        impl KoreanSpotCapability for BalanceKorean {
            async fn place_market_buy_cost(&self, _s: &SymbolId, _k: f64) -> Result<OrderResult, FeedError> {
                unimplemented!()
            }
            async fn place_market_buy_quantity(&self, _s: &SymbolId, _q: f64) -> Result<OrderResult, FeedError> {
                unimplemented!()
            }
            async fn place_market_sell(&self, _s: &SymbolId, _q: f64) -> Result<OrderResult, FeedError> {
                unimplemented!()
            }
            async fn get_usdt_krw_price(&self) -> Result<f64, FeedError> {
                Ok(1450.0)
            }
        }

        let foreign = StubForeign::new();
        let korean = BalanceKorean;
        let symbols = vec![SymbolId::new("BTC", "KRW"), SymbolId::new("ETH", "KRW")];
        let blacklist = build_external_position_blacklist(&korean, &foreign, &symbols).await;
        assert!(blacklist.contains(&SymbolId::new("BTC", "KRW")));
        assert!(!blacklist.contains(&SymbolId::new("ETH", "KRW")));
    }
}
