//! Position Tracker: fixed-capacity slot table of active positions (spec §4.4).
//!
//! Grounded on the original's `PositionTracker` in `arbitrage_engine.hpp` (fixed slot array,
//! atomic active flag + atomic symbol hash, per-slot mutex) and the teacher's executor-side
//! position-adjacent types (`crates/executor/src/order.rs`) for the general shape of a
//! tracked-state table guarded per-entry rather than behind one global lock.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use kimp_core::{Position, SymbolId};

fn symbol_hash(symbol: &SymbolId) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    symbol.hash(&mut hasher);
    hasher.finish()
}

struct Slot {
    active: AtomicBool,
    symbol_hash: AtomicUsize,
    position: Mutex<Option<Position>>,
}

impl Slot {
    fn empty() -> Self {
        Self {
            active: AtomicBool::new(false),
            symbol_hash: AtomicUsize::new(0),
            position: Mutex::new(None),
        }
    }
}

/// Fixed array of `N` slots, `N` = `TradingConfig::max_positions`. At most one slot active
/// per symbol; active count never exceeds capacity.
pub struct PositionTracker {
    slots: Vec<Slot>,
    active_count: AtomicUsize,
}

impl PositionTracker {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            slots.push(Slot::empty());
        }
        Self {
            slots,
            active_count: AtomicUsize::new(0),
        }
    }

    pub fn can_open_position(&self) -> bool {
        self.active_count.load(Ordering::Acquire) < self.slots.len()
    }

    pub fn has_position(&self, symbol: &SymbolId) -> bool {
        let target = symbol_hash(symbol) as usize;
        self.slots
            .iter()
            .any(|s| s.active.load(Ordering::Acquire) && s.symbol_hash.load(Ordering::Acquire) == target)
    }

    pub fn get_position(&self, symbol: &SymbolId) -> Option<Position> {
        let target = symbol_hash(symbol) as usize;
        for slot in &self.slots {
            if slot.active.load(Ordering::Acquire) && slot.symbol_hash.load(Ordering::Acquire) == target {
                return slot.position.lock().unwrap().clone();
            }
        }
        None
    }

    /// CAS the first inactive slot to active, store the position under its mutex, bump the
    /// active count. Returns false if no slot is free.
    pub fn open_position(&self, pos: Position) -> bool {
        let target = symbol_hash(&pos.symbol) as usize;
        for slot in &self.slots {
            if slot
                .active
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                slot.symbol_hash.store(target, Ordering::Release);
                *slot.position.lock().unwrap() = Some(pos);
                self.active_count.fetch_add(1, Ordering::AcqRel);
                return true;
            }
        }
        false
    }

    /// Replaces the stored Position for `symbol` in place (used after a fill slice updates
    /// the running sums). Returns false if no active slot matches.
    pub fn update_position(&self, symbol: &SymbolId, pos: Position) -> bool {
        let target = symbol_hash(symbol) as usize;
        for slot in &self.slots {
            if slot.active.load(Ordering::Acquire) && slot.symbol_hash.load(Ordering::Acquire) == target {
                *slot.position.lock().unwrap() = Some(pos);
                return true;
            }
        }
        false
    }

    /// Locates the active slot by symbol hash, copies the position out, clears the slot.
    pub fn close_position(&self, symbol: &SymbolId) -> Option<Position> {
        let target = symbol_hash(symbol) as usize;
        for slot in &self.slots {
            if slot.active.load(Ordering::Acquire) && slot.symbol_hash.load(Ordering::Acquire) == target {
                let pos = slot.position.lock().unwrap().take();
                slot.active.store(false, Ordering::Release);
                self.active_count.fetch_sub(1, Ordering::AcqRel);
                return pos;
            }
        }
        None
    }

    pub fn active_positions(&self) -> Vec<Position> {
        self.slots
            .iter()
            .filter(|s| s.active.load(Ordering::Acquire))
            .filter_map(|s| s.position.lock().unwrap().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kimp_core::Exchange;

    fn sample_position(symbol: &str) -> Position {
        Position::open(
            SymbolId::new(symbol, "KRW"),
            Exchange::Upbit,
            Exchange::Bybit,
            1_700_000_000_000,
            -0.99,
            250.0,
            0.001,
            0.001,
            99_000_000.0,
            68_000.0,
        )
    }

    #[test]
    fn open_respects_capacity() {
        let tracker = PositionTracker::new(1);
        assert!(tracker.can_open_position());
        assert!(tracker.open_position(sample_position("BTC")));
        assert!(!tracker.can_open_position());
        assert!(!tracker.open_position(sample_position("ETH")));
    }

    #[test]
    fn has_position_and_close_round_trip() {
        let tracker = PositionTracker::new(2);
        let sym = SymbolId::new("BTC", "KRW");
        assert!(!tracker.has_position(&sym));
        tracker.open_position(sample_position("BTC"));
        assert!(tracker.has_position(&sym));
        let closed = tracker.close_position(&sym);
        assert!(closed.is_some());
        assert!(!tracker.has_position(&sym));
    }

    #[test]
    fn active_positions_snapshot() {
        let tracker = PositionTracker::new(2);
        tracker.open_position(sample_position("BTC"));
        tracker.open_position(sample_position("ETH"));
        assert_eq!(tracker.active_positions().len(), 2);
    }

    #[test]
    fn update_position_replaces_in_place() {
        let tracker = PositionTracker::new(1);
        let sym = SymbolId::new("BTC", "KRW");
        let mut pos = sample_position("BTC");
        tracker.open_position(pos.clone());
        pos.add_entry_slice(0.001, 99_000_000.0, 68_000.0);
        assert!(tracker.update_position(&sym, pos.clone()));
        assert_eq!(tracker.get_position(&sym).unwrap().korean_amount, pos.korean_amount);
    }
}
