//! Signal Engine: consumes quote updates, emits entry/exit signals (spec §4.5).
//!
//! Grounded on `arbitrage_engine.hpp`'s `ArbitrageEngine` (fast-path `on_ticker_update`,
//! monitor thread with three independent cadences, `wait_for_update` condition) and the
//! teacher's `crates/engine/src/detector.rs` scan-and-emit shape, narrowed from an N-way
//! detector matrix to the single Korean/foreign pair this system trades.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use kimp_core::{Exchange, SymbolId, TradingConfig};
use kimp_feeds::{quality::quote_pair_usable, QuoteCache};
use tokio::sync::Notify;

use crate::position_tracker::PositionTracker;
use crate::premium::{entry_premium, exit_premium};
use crate::ring_buffer::SpscRing;
use kimp_core::{EntrySignal, ExitSignal};

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as i64
}

/// One tracked (korean_exchange, foreign_exchange) pair for a symbol. The spec's Non-goal
/// "does not perform cross-venue arbitrage across more than one pair" means this is exactly
/// one entry per monitored symbol, not a matrix.
#[derive(Debug, Clone, Copy)]
pub struct TrackedPair {
    pub symbol: SymbolId,
    pub korean_exchange: Exchange,
    pub foreign_exchange: Exchange,
}

/// Callback invoked synchronously from the engine thread on a qualifying signal.
pub trait SignalSink: Send + Sync {
    fn on_entry(&self, signal: EntrySignal);
    fn on_exit(&self, signal: ExitSignal);
}

/// Consumes quote updates, maintains the monotonic update sequence, and runs the fast-path
/// and monitor-loop scans described in spec §4.5.
pub struct SignalEngine {
    cache: Arc<QuoteCache>,
    tracker: Arc<PositionTracker>,
    config: TradingConfig,
    pairs: Vec<TrackedPair>,
    sink: Arc<dyn SignalSink>,
    entry_queue: SpscRing<EntrySignal>,
    exit_queue: SpscRing<ExitSignal>,
    update_seq: AtomicU64,
    notify: Notify,
    usdt_rescan_pending: AtomicBool,
    usdt_rescan_due_ms: AtomicI64,
    shutdown: Arc<AtomicBool>,
}

impl SignalEngine {
    pub fn new(
        cache: Arc<QuoteCache>,
        tracker: Arc<PositionTracker>,
        config: TradingConfig,
        pairs: Vec<TrackedPair>,
        sink: Arc<dyn SignalSink>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            cache,
            tracker,
            config,
            pairs,
            sink,
            entry_queue: SpscRing::new(256),
            exit_queue: SpscRing::new(256),
            update_seq: AtomicU64::new(0),
            notify: Notify::new(),
            usdt_rescan_pending: AtomicBool::new(false),
            usdt_rescan_due_ms: AtomicI64::new(0),
            shutdown,
        }
    }

    pub fn update_seq(&self) -> u64 {
        self.update_seq.load(Ordering::Acquire)
    }

    /// Blocks until `update_seq` advances past `since`, or `timeout` elapses. Used by the
    /// executor's adaptive-split loop between iterations.
    pub async fn wait_for_update(&self, since: u64, timeout: std::time::Duration) {
        if self.update_seq() != since {
            return;
        }
        let _ = tokio::time::timeout(timeout, self.notify.notified()).await;
    }

    fn bump_seq(&self) {
        self.update_seq.fetch_add(1, Ordering::AcqRel);
        self.notify.notify_waiters();
    }

    /// Fast path: called for every ticker update. Writes the quote into the cache, then
    /// either marks a debounced USDT rescan or runs this symbol's entry/exit check.
    pub fn on_ticker_update(&self, exchange: Exchange, symbol: &SymbolId, bid: f64, ask: f64, last: f64, ts_ms: i64) {
        self.cache.update(exchange, symbol, bid, ask, last, ts_ms);

        if symbol.is_usdt_krw() && exchange.is_korean() {
            self.cache.update_usdt_rate(exchange, last, self.config.quality.usdt_rate_jump_cap_pct);
            self.usdt_rescan_pending.store(true, Ordering::Release);
            self.usdt_rescan_due_ms
                .store(now_ms() + self.config.usdt_rescan_debounce_ms as i64, Ordering::Release);
            self.bump_seq();
            return;
        }

        for pair in &self.pairs {
            if &pair.symbol == symbol && (pair.korean_exchange == exchange || pair.foreign_exchange == exchange) {
                self.check_pair(pair);
            }
        }
        self.bump_seq();
    }

    fn check_pair(&self, pair: &TrackedPair) {
        let usdt_rate = self.cache.get_usdt_rate(pair.korean_exchange);
        let korean = self.cache.get(pair.korean_exchange, &pair.symbol);
        let foreign = self.cache.get(pair.foreign_exchange, &pair.symbol);

        let has_position = self.tracker.has_position(&pair.symbol);

        if !has_position && self.tracker.can_open_position() {
            if quote_pair_usable(&korean, &foreign, usdt_rate, now_ms(), &self.config.quality) {
                let premium = entry_premium(korean.ask, foreign.bid, usdt_rate);
                if premium <= self.config.entry_threshold_pct && funding_qualifies(&self.config, &foreign) {
                    let signal = EntrySignal {
                        symbol: pair.symbol.clone(),
                        korean_exchange: pair.korean_exchange,
                        foreign_exchange: pair.foreign_exchange,
                        premium,
                        korean_ask: korean.ask,
                        foreign_bid: foreign.bid,
                        funding_rate: foreign.funding_rate,
                        usdt_rate,
                        timestamp_ms: now_ms(),
                    };
                    self.entry_queue.push(signal.clone());
                    self.sink.on_entry(signal);
                }
            }
        }

        if has_position {
            if let Some(position) = self.tracker.get_position(&pair.symbol) {
                if quote_pair_usable(&korean, &foreign, usdt_rate, now_ms(), &self.config.quality) {
                    let premium = exit_premium(korean.bid, foreign.ask, usdt_rate);
                    let threshold = self.config.dynamic_exit_threshold(position.entry_premium);
                    if premium >= threshold {
                        let signal = ExitSignal {
                            symbol: pair.symbol.clone(),
                            korean_exchange: pair.korean_exchange,
                            foreign_exchange: pair.foreign_exchange,
                            premium,
                            korean_bid: korean.bid,
                            foreign_ask: foreign.ask,
                            usdt_rate,
                            timestamp_ms: now_ms(),
                        };
                        self.exit_queue.push(signal.clone());
                        self.sink.on_exit(signal);
                    }
                }
            }
        }
    }

    /// Full scan across all tracked pairs. Under `max_positions == 1`, emits only the single
    /// qualifying entry signal with the lowest (most negative) premium; otherwise one signal
    /// per qualifying symbol up to remaining capacity (spec §4.5).
    pub fn full_scan(&self) {
        if self.tracker.can_open_position() {
            let mut candidates: Vec<EntrySignal> = Vec::new();
            for pair in &self.pairs {
                if self.tracker.has_position(&pair.symbol) {
                    continue;
                }
                let usdt_rate = self.cache.get_usdt_rate(pair.korean_exchange);
                let korean = self.cache.get(pair.korean_exchange, &pair.symbol);
                let foreign = self.cache.get(pair.foreign_exchange, &pair.symbol);
                if !quote_pair_usable(&korean, &foreign, usdt_rate, now_ms(), &self.config.quality) {
                    continue;
                }
                let premium = entry_premium(korean.ask, foreign.bid, usdt_rate);
                if premium <= self.config.entry_threshold_pct && funding_qualifies(&self.config, &foreign) {
                    candidates.push(EntrySignal {
                        symbol: pair.symbol.clone(),
                        korean_exchange: pair.korean_exchange,
                        foreign_exchange: pair.foreign_exchange,
                        premium,
                        korean_ask: korean.ask,
                        foreign_bid: foreign.bid,
                        funding_rate: foreign.funding_rate,
                        usdt_rate,
                        timestamp_ms: now_ms(),
                    });
                }
            }

            if self.config.max_positions == 1 {
                if let Some(best) = candidates.into_iter().min_by(|a, b| a.premium.partial_cmp(&b.premium).unwrap()) {
                    self.entry_queue.push(best.clone());
                    self.sink.on_entry(best);
                }
            } else {
                let remaining = self.config.max_positions - self.tracker.active_positions().len();
                for signal in candidates.into_iter().take(remaining) {
                    self.entry_queue.push(signal.clone());
                    self.sink.on_entry(signal);
                }
            }
        }

        for position in self.tracker.active_positions() {
            if let Some(pair) = self.pairs.iter().find(|p| p.symbol == position.symbol) {
                let usdt_rate = self.cache.get_usdt_rate(pair.korean_exchange);
                let korean = self.cache.get(pair.korean_exchange, &pair.symbol);
                let foreign = self.cache.get(pair.foreign_exchange, &pair.symbol);
                if !quote_pair_usable(&korean, &foreign, usdt_rate, now_ms(), &self.config.quality) {
                    continue;
                }
                let premium = exit_premium(korean.bid, foreign.ask, usdt_rate);
                let threshold = self.config.dynamic_exit_threshold(position.entry_premium);
                if premium >= threshold {
                    let signal = ExitSignal {
                        symbol: pair.symbol.clone(),
                        korean_exchange: pair.korean_exchange,
                        foreign_exchange: pair.foreign_exchange,
                        premium,
                        korean_bid: korean.bid,
                        foreign_ask: foreign.ask,
                        usdt_rate,
                        timestamp_ms: now_ms(),
                    };
                    self.exit_queue.push(signal.clone());
                    self.sink.on_exit(signal);
                }
            }
        }
        self.bump_seq();
    }

    /// The monitor loop: three independent cadences, run on a dedicated task (spec §4.5,
    /// §5 "one thread runs the backup scan and the wait-for-update condition").
    pub async fn run_monitor_loop(self: Arc<Self>) {
        let mut entry_ticker = tokio::time::interval(std::time::Duration::from_millis(self.config.entry_backup_scan_ms));
        let mut exit_ticker = tokio::time::interval(std::time::Duration::from_millis(self.config.exit_backup_scan_ms));
        let mut debounce_ticker = tokio::time::interval(std::time::Duration::from_millis(50));

        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return;
            }
            tokio::select! {
                _ = entry_ticker.tick() => {
                    if self.tracker.can_open_position() {
                        self.full_scan();
                    }
                }
                _ = exit_ticker.tick() => {
                    if !self.tracker.active_positions().is_empty() {
                        self.full_scan();
                    }
                }
                _ = debounce_ticker.tick() => {
                    if self.usdt_rescan_pending.load(Ordering::Acquire)
                        && now_ms() >= self.usdt_rescan_due_ms.load(Ordering::Acquire)
                    {
                        self.usdt_rescan_pending.store(false, Ordering::Release);
                        self.full_scan();
                    }
                }
            }
        }
    }
}

fn funding_qualifies(config: &TradingConfig, foreign: &kimp_core::Quote) -> bool {
    if foreign.funding_interval_hours != config.funding_interval_hours {
        return false;
    }
    if config.require_positive_funding && foreign.funding_rate < 0.0 {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use kimp_core::Position;
    use std::sync::Mutex;

    struct RecordingSink {
        entries: Mutex<Vec<EntrySignal>>,
        exits: Mutex<Vec<ExitSignal>>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                entries: Mutex::new(Vec::new()),
                exits: Mutex::new(Vec::new()),
            }
        }
    }

    impl SignalSink for RecordingSink {
        fn on_entry(&self, signal: EntrySignal) {
            self.entries.lock().unwrap().push(signal);
        }
        fn on_exit(&self, signal: ExitSignal) {
            self.exits.lock().unwrap().push(signal);
        }
    }

    fn sample_pair() -> TrackedPair {
        TrackedPair {
            symbol: SymbolId::new("BTC", "KRW"),
            korean_exchange: Exchange::Upbit,
            foreign_exchange: Exchange::Bybit,
        }
    }

    #[test]
    fn entry_signal_fires_when_premium_crosses_threshold() {
        let cache = Arc::new(QuoteCache::new());
        let tracker = Arc::new(PositionTracker::new(1));
        let sink = Arc::new(RecordingSink::new());
        let pair = sample_pair();
        let engine = SignalEngine::new(
            cache.clone(),
            tracker,
            TradingConfig::default(),
            vec![pair],
            sink.clone(),
            Arc::new(AtomicBool::new(false)),
        );

        cache.update_usdt_rate(Exchange::Upbit, 1_450.0, 3.0);
        cache.update_funding(Exchange::Bybit, &SymbolId::new("BTC", "KRW"), 0.0001, 8, now_ms() + 3_600_000);
        // Foreign bid 68,000 * 1,450 = 98,600,000; Korean ask well below -> negative premium.
        engine.on_ticker_update(Exchange::Bybit, &SymbolId::new("BTC", "KRW"), 67_990.0, 68_000.0, 68_000.0, now_ms());
        engine.on_ticker_update(Exchange::Upbit, &SymbolId::new("BTC", "KRW"), 97_000_000.0, 97_010_000.0, 97_000_000.0, now_ms());

        assert_eq!(sink.entries.lock().unwrap().len(), 1);
    }

    #[test]
    fn no_entry_signal_when_position_capacity_exhausted() {
        let cache = Arc::new(QuoteCache::new());
        let tracker = Arc::new(PositionTracker::new(1));
        tracker.open_position(Position::open(
            SymbolId::new("ETH", "KRW"),
            Exchange::Upbit,
            Exchange::Bybit,
            1,
            -0.5,
            250.0,
            0.1,
            0.1,
            3_000_000.0,
            2.0,
        ));
        let sink = Arc::new(RecordingSink::new());
        let pair = sample_pair();
        let engine = SignalEngine::new(
            cache.clone(),
            tracker,
            TradingConfig::default(),
            vec![pair],
            sink.clone(),
            Arc::new(AtomicBool::new(false)),
        );
        cache.update_usdt_rate(Exchange::Upbit, 1_450.0, 3.0);
        cache.update_funding(Exchange::Bybit, &SymbolId::new("BTC", "KRW"), 0.0001, 8, now_ms() + 3_600_000);
        engine.on_ticker_update(Exchange::Bybit, &SymbolId::new("BTC", "KRW"), 67_990.0, 68_000.0, 68_000.0, now_ms());
        engine.on_ticker_update(Exchange::Upbit, &SymbolId::new("BTC", "KRW"), 97_000_000.0, 97_010_000.0, 97_000_000.0, now_ms());
        assert!(sink.entries.lock().unwrap().is_empty());
    }

    #[test]
    fn usdt_update_marks_rescan_without_synchronous_scan() {
        let cache = Arc::new(QuoteCache::new());
        let tracker = Arc::new(PositionTracker::new(1));
        let sink = Arc::new(RecordingSink::new());
        let engine = SignalEngine::new(
            cache,
            tracker,
            TradingConfig::default(),
            vec![sample_pair()],
            sink.clone(),
            Arc::new(AtomicBool::new(false)),
        );
        engine.on_ticker_update(Exchange::Upbit, &SymbolId::new("USDT", "KRW"), 1_449.0, 1_451.0, 1_450.0, 1_000);
        assert!(engine.usdt_rescan_pending.load(Ordering::Acquire));
        assert!(sink.entries.lock().unwrap().is_empty());
    }

    #[test]
    fn single_position_cap_emits_only_best_candidate() {
        let cache = Arc::new(QuoteCache::new());
        let tracker = Arc::new(PositionTracker::new(1));
        let sink = Arc::new(RecordingSink::new());
        let pairs = vec![
            TrackedPair {
                symbol: SymbolId::new("BTC", "KRW"),
                korean_exchange: Exchange::Upbit,
                foreign_exchange: Exchange::Bybit,
            },
            TrackedPair {
                symbol: SymbolId::new("ETH", "KRW"),
                korean_exchange: Exchange::Upbit,
                foreign_exchange: Exchange::Bybit,
            },
        ];
        let engine = SignalEngine::new(
            cache.clone(),
            tracker,
            TradingConfig::default(),
            pairs,
            sink.clone(),
            Arc::new(AtomicBool::new(false)),
        );
        cache.update_usdt_rate(Exchange::Upbit, 1_450.0, 3.0);
        cache.update_funding(Exchange::Bybit, &SymbolId::new("BTC", "KRW"), 0.0001, 8, now_ms() + 3_600_000);
        cache.update_funding(Exchange::Bybit, &SymbolId::new("ETH", "KRW"), 0.0001, 8, now_ms() + 3_600_000);
        cache.update(Exchange::Bybit, &SymbolId::new("BTC", "KRW"), 67_990.0, 68_000.0, 68_000.0, now_ms());
        cache.update(Exchange::Upbit, &SymbolId::new("BTC", "KRW"), 97_000_000.0, 97_010_000.0, 97_000_000.0, now_ms());
        cache.update(Exchange::Bybit, &SymbolId::new("ETH", "KRW"), 1_999.0, 2_000.0, 2_000.0, now_ms());
        cache.update(Exchange::Upbit, &SymbolId::new("ETH", "KRW"), 2_700_000.0, 2_701_000.0, 2_700_000.0, now_ms());

        engine.full_scan();
        assert_eq!(sink.entries.lock().unwrap().len(), 1);
    }
}
