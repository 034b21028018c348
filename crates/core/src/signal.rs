//! Entry and exit signals emitted by the signal engine.

use crate::{Exchange, SymbolId};

/// Emitted when a symbol's entry premium crosses the entry threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct EntrySignal {
    pub symbol: SymbolId,
    pub korean_exchange: Exchange,
    pub foreign_exchange: Exchange,
    pub premium: f64,
    pub korean_ask: f64,
    pub foreign_bid: f64,
    pub funding_rate: f64,
    pub usdt_rate: f64,
    pub timestamp_ms: i64,
}

/// Emitted when an open position's exit premium crosses its dynamic exit threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitSignal {
    pub symbol: SymbolId,
    pub korean_exchange: Exchange,
    pub foreign_exchange: Exchange,
    pub premium: f64,
    pub korean_bid: f64,
    pub foreign_ask: f64,
    pub usdt_rate: f64,
    pub timestamp_ms: i64,
}
