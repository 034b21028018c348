//! Position: an open hedged spot-long / perp-short pair.

use crate::{Exchange, SymbolId};
use serde::{Deserialize, Serialize};

/// An open hedged position.
///
/// Invariant at rest (between slices): `korean_amount == foreign_amount`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: SymbolId,
    pub korean_exchange: Exchange,
    pub foreign_exchange: Exchange,

    pub entry_time_ms: i64,
    pub entry_premium: f64,

    pub korean_amount: f64,
    pub foreign_amount: f64,

    pub korean_entry_price: f64,
    pub foreign_entry_price: f64,

    pub realized_pnl_krw: f64,

    pub position_size_usd: f64,

    pub is_active: bool,
}

impl Position {
    /// Construct the position from its first filled entry slice.
    pub fn open(
        symbol: SymbolId,
        korean_exchange: Exchange,
        foreign_exchange: Exchange,
        entry_time_ms: i64,
        entry_premium: f64,
        position_size_usd: f64,
        korean_amount: f64,
        foreign_amount: f64,
        korean_price: f64,
        foreign_price: f64,
    ) -> Self {
        Self {
            symbol,
            korean_exchange,
            foreign_exchange,
            entry_time_ms,
            entry_premium,
            korean_amount,
            foreign_amount,
            korean_entry_price: korean_price,
            foreign_entry_price: foreign_price,
            realized_pnl_krw: 0.0,
            position_size_usd,
            is_active: true,
        }
    }

    /// True iff the hedge is exact (within floating-point noise) at rest.
    pub fn is_hedged(&self) -> bool {
        (self.korean_amount - self.foreign_amount).abs() < 1e-9
    }

    /// Mix a new entry slice's fill into the weighted-average entry prices, per spec §4.6 step 6.
    pub fn add_entry_slice(&mut self, amount: f64, korean_price: f64, foreign_price: f64) {
        let prior_amount = self.korean_amount;
        let new_total = prior_amount + amount;
        if new_total <= 0.0 {
            return;
        }
        self.korean_entry_price =
            (self.korean_entry_price * prior_amount + korean_price * amount) / new_total;
        self.foreign_entry_price =
            (self.foreign_entry_price * prior_amount + foreign_price * amount) / new_total;
        self.korean_amount = new_total;
        self.foreign_amount = new_total;
    }

    /// Scale down cost basis proportionally after an exit slice, per spec §4.6 step 6.
    pub fn reduce_by_exit_slice(&mut self, amount: f64, slice_pnl_krw: f64) {
        let remaining_fraction = if self.korean_amount > 0.0 {
            (1.0 - amount / self.korean_amount).max(0.0)
        } else {
            0.0
        };
        self.korean_amount = (self.korean_amount - amount).max(0.0);
        self.foreign_amount = (self.foreign_amount - amount).max(0.0);
        let _ = remaining_fraction; // cost basis is a weighted average price, unaffected by scaling amount down
        self.realized_pnl_krw += slice_pnl_krw;
        if self.korean_amount <= 1e-12 {
            self.is_active = false;
        }
    }
}
