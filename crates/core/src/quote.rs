//! Quote: the atomic-field record the Quote Cache stores per (exchange, symbol).

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// A snapshot of a Quote Cache entry, as returned by `get`.
///
/// Valid iff `bid > 0`, `ask > 0`, `ask >= bid`, `timestamp_ms > 0`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Quote {
    pub bid: f64,
    pub ask: f64,
    pub last: f64,
    pub funding_rate: f64,
    pub funding_interval_hours: u32,
    pub next_funding_ms: i64,
    pub timestamp_ms: i64,
    pub valid: bool,
}

impl Quote {
    /// Per spec §3: valid iff bid > 0, ask > 0, ask >= bid, timestamp > 0.
    pub fn is_valid(&self) -> bool {
        self.valid && self.bid > 0.0 && self.ask > 0.0 && self.ask >= self.bid && self.timestamp_ms > 0
    }
}

/// The atomic storage backing one Quote Cache entry.
///
/// Each scalar is an independent atomic word (spec §9 "Atomic-doubles": f64 bit patterns
/// stored in AtomicU64, converted on read/write). A single producer thread/task updates a
/// given key; many readers load it lock-free. `present` distinguishes "never written" from
/// "written with zeroed fields" so `get` can report `valid: false` for unseen keys.
#[derive(Debug, Default)]
pub struct QuoteSlot {
    present: AtomicU64,
    bid: AtomicU64,
    ask: AtomicU64,
    last: AtomicU64,
    funding_rate: AtomicU64,
    funding_interval_hours: AtomicU64,
    next_funding_ms: AtomicI64,
    timestamp_ms: AtomicI64,
}

impl QuoteSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates bid/ask/last and the timestamp. Release-ordered so a reader observing the
    /// new timestamp also observes the price fields written before it.
    pub fn update(&self, bid: f64, ask: f64, last: f64, ts_ms: i64) {
        self.bid.store(bid.to_bits(), Ordering::Relaxed);
        self.ask.store(ask.to_bits(), Ordering::Relaxed);
        self.last.store(last.to_bits(), Ordering::Relaxed);
        self.timestamp_ms.store(ts_ms, Ordering::Release);
        self.present.store(1, Ordering::Release);
    }

    /// Updates the funding-rate fields as a separate atomic group.
    pub fn update_funding(&self, rate: f64, interval_hours: u32, next_funding_ms: i64) {
        self.funding_rate.store(rate.to_bits(), Ordering::Relaxed);
        self.funding_interval_hours
            .store(interval_hours as u64, Ordering::Relaxed);
        self.next_funding_ms.store(next_funding_ms, Ordering::Release);
    }

    /// Loads a coherent snapshot with acquire ordering on the publishing fields.
    pub fn load(&self) -> Quote {
        let present = self.present.load(Ordering::Acquire) != 0;
        let timestamp_ms = self.timestamp_ms.load(Ordering::Acquire);
        Quote {
            bid: f64::from_bits(self.bid.load(Ordering::Relaxed)),
            ask: f64::from_bits(self.ask.load(Ordering::Relaxed)),
            last: f64::from_bits(self.last.load(Ordering::Relaxed)),
            funding_rate: f64::from_bits(self.funding_rate.load(Ordering::Relaxed)),
            funding_interval_hours: self.funding_interval_hours.load(Ordering::Relaxed) as u32,
            next_funding_ms: self.next_funding_ms.load(Ordering::Acquire),
            timestamp_ms,
            valid: present,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwritten_slot_is_invalid() {
        let slot = QuoteSlot::new();
        let q = slot.load();
        assert!(!q.valid);
        assert!(!q.is_valid());
    }

    #[test]
    fn update_then_get_round_trips() {
        let slot = QuoteSlot::new();
        slot.update(99.9, 100.1, 100.0, 1_700_000_000_000);
        let q = slot.load();
        assert!(q.is_valid());
        assert_eq!(q.bid, 99.9);
        assert_eq!(q.ask, 100.1);
        assert_eq!(q.last, 100.0);
        assert_eq!(q.timestamp_ms, 1_700_000_000_000);
    }

    #[test]
    fn invalid_when_ask_below_bid() {
        let slot = QuoteSlot::new();
        slot.update(100.0, 99.0, 100.0, 1);
        assert!(!slot.load().is_valid());
    }

    #[test]
    fn invalid_when_timestamp_zero() {
        let slot = QuoteSlot::new();
        slot.update(99.0, 100.0, 100.0, 0);
        assert!(!slot.load().is_valid());
    }

    #[test]
    fn funding_fields_are_independent_group() {
        let slot = QuoteSlot::new();
        slot.update(99.0, 100.0, 100.0, 1);
        slot.update_funding(0.0001, 8, 1_700_003_600_000);
        let q = slot.load();
        assert_eq!(q.funding_rate, 0.0001);
        assert_eq!(q.funding_interval_hours, 8);
        assert_eq!(q.next_funding_ms, 1_700_003_600_000);
    }
}
