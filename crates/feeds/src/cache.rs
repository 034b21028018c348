//! Quote Cache: keyed (exchange, symbol) store of best-bid/ask/last/funding.
//!
//! Grounded on the original's `PriceCache` (shared_mutex + unordered_map, atomic fields
//! per entry) and the teacher's pervasive use of `dashmap` for concurrent maps. Reads are
//! the hot path; creation of a new key is the only point that contends between writers.

use dashmap::DashMap;
use kimp_core::{Exchange, Quote, QuoteSlot, SymbolId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Single-writer-per-key, many-reader quote store, plus the per-Korean-venue USDT/KRW
/// reference rate (spec §3, §4.1).
pub struct QuoteCache {
    slots: DashMap<(Exchange, SymbolId), Arc<QuoteSlot>>,
    usdt_krw_rates: DashMap<Exchange, AtomicU64>,
}

impl Default for QuoteCache {
    fn default() -> Self {
        Self::new()
    }
}

impl QuoteCache {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
            usdt_krw_rates: DashMap::new(),
        }
    }

    fn slot(&self, exchange: Exchange, symbol: &SymbolId) -> Arc<QuoteSlot> {
        if let Some(existing) = self.slots.get(&(exchange, symbol.clone())) {
            return existing.clone();
        }
        self.slots
            .entry((exchange, symbol.clone()))
            .or_insert_with(|| Arc::new(QuoteSlot::new()))
            .clone()
    }

    /// Updates bid/ask/last and timestamp for (exchange, symbol). Creates the key if new.
    pub fn update(&self, exchange: Exchange, symbol: &SymbolId, bid: f64, ask: f64, last: f64, ts_ms: i64) {
        self.slot(exchange, symbol).update(bid, ask, last, ts_ms);
    }

    /// Updates the funding-rate fields for (exchange, symbol).
    pub fn update_funding(
        &self,
        exchange: Exchange,
        symbol: &SymbolId,
        rate: f64,
        interval_hours: u32,
        next_funding_ms: i64,
    ) {
        self.slot(exchange, symbol)
            .update_funding(rate, interval_hours, next_funding_ms);
    }

    /// Updates the per-Korean-venue USDT/KRW reference rate, subject to an outlier guard
    /// that rejects a sample whose relative change from the prior value exceeds `jump_cap_pct`.
    /// Returns true if the update was applied.
    pub fn update_usdt_rate(&self, exchange: Exchange, rate: f64, jump_cap_pct: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        let entry = self
            .usdt_krw_rates
            .entry(exchange)
            .or_insert_with(|| AtomicU64::new(0f64.to_bits()));
        let prev_bits = entry.load(Ordering::Relaxed);
        let prev = f64::from_bits(prev_bits);
        if prev > 0.0 {
            let rel_change = ((rate - prev) / prev).abs() * 100.0;
            if rel_change > jump_cap_pct {
                return false;
            }
        }
        entry.store(rate.to_bits(), Ordering::Relaxed);
        true
    }

    /// Returns the current USDT/KRW reference rate for a Korean venue, or 0.0 if unset.
    pub fn get_usdt_rate(&self, exchange: Exchange) -> f64 {
        self.usdt_krw_rates
            .get(&exchange)
            .map(|r| f64::from_bits(r.load(Ordering::Relaxed)))
            .unwrap_or(0.0)
    }

    /// Returns a snapshot of the quote for (exchange, symbol). `valid` is false if the key
    /// has never been written.
    pub fn get(&self, exchange: Exchange, symbol: &SymbolId) -> Quote {
        match self.slots.get(&(exchange, symbol.clone())) {
            Some(slot) => slot.load(),
            None => Quote::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwritten_key_is_invalid() {
        let cache = QuoteCache::new();
        let q = cache.get(Exchange::Upbit, &SymbolId::new("BTC", "KRW"));
        assert!(!q.valid);
    }

    #[test]
    fn update_then_get_round_trips() {
        let cache = QuoteCache::new();
        let sym = SymbolId::new("BTC", "KRW");
        cache.update(Exchange::Upbit, &sym, 99_000_000.0, 99_100_000.0, 99_050_000.0, 1_700_000_000_000);
        let q = cache.get(Exchange::Upbit, &sym);
        assert!(q.is_valid());
        assert_eq!(q.bid, 99_000_000.0);
    }

    #[test]
    fn usdt_rate_outlier_guard_rejects_large_jump() {
        let cache = QuoteCache::new();
        assert!(cache.update_usdt_rate(Exchange::Upbit, 1_450.0, 3.0));
        // +10% jump should be rejected against a 3% cap.
        assert!(!cache.update_usdt_rate(Exchange::Upbit, 1_595.0, 3.0));
        assert_eq!(cache.get_usdt_rate(Exchange::Upbit), 1_450.0);
    }

    #[test]
    fn usdt_rate_accepts_small_change() {
        let cache = QuoteCache::new();
        assert!(cache.update_usdt_rate(Exchange::Upbit, 1_450.0, 3.0));
        assert!(cache.update_usdt_rate(Exchange::Upbit, 1_460.0, 3.0));
        assert_eq!(cache.get_usdt_rate(Exchange::Upbit), 1_460.0);
    }

    #[test]
    fn rejects_non_positive_rate() {
        let cache = QuoteCache::new();
        assert!(!cache.update_usdt_rate(Exchange::Upbit, 0.0, 3.0));
        assert!(!cache.update_usdt_rate(Exchange::Upbit, -1.0, 3.0));
    }
}
