//! Exchange Capability: the polymorphic interface the engine consumes (spec §4.8).
//!
//! Grounded on the teacher's `async_trait`-based `CexClient` (`crates/executor/src/cex.rs`)
//! and split per the original's `KoreanExchangeBase`/`ForeignFuturesExchangeBase` split
//! (`order_manager.hpp`), per spec §9's design note to model this as a trait with a
//! market-type-specific sub-trait.

use async_trait::async_trait;
use kimp_core::{LotSizeMetadata, OrderResult, SymbolId};

use crate::FeedError;

/// Base capability every venue adapter provides.
#[async_trait]
pub trait ExchangeCapability: Send + Sync {
    /// Idempotent: establish REST keep-alive connections and open the websocket stream.
    async fn connect(&self) -> Result<(), FeedError>;

    /// Idempotent: tear down the websocket stream and REST connections.
    async fn disconnect(&self) -> Result<(), FeedError>;

    /// Arrange for quote updates on these symbols to flow to the engine. The subscription
    /// list is remembered and re-sent after a reconnect.
    async fn subscribe_ticker(&self, symbols: &[SymbolId]) -> Result<(), FeedError>;

    /// One-shot enumeration of tradable symbols for this venue's market type.
    async fn available_symbols(&self) -> Result<Vec<SymbolId>, FeedError>;

    /// Free balance of `currency` on this venue.
    async fn balance(&self, currency: &str) -> Result<f64, FeedError>;
}

/// Korean-spot-only operations.
#[async_trait]
pub trait KoreanSpotCapability: ExchangeCapability {
    /// Submits a market buy for the given KRW notional.
    async fn place_market_buy_cost(&self, symbol: &SymbolId, krw: f64) -> Result<OrderResult, FeedError>;

    /// Submits a market buy for the given coin quantity.
    async fn place_market_buy_quantity(&self, symbol: &SymbolId, qty: f64) -> Result<OrderResult, FeedError>;

    /// Submits a market sell for the given coin quantity.
    async fn place_market_sell(&self, symbol: &SymbolId, qty: f64) -> Result<OrderResult, FeedError>;

    /// Fallback fetch of the USDT/KRW rate if the streamed rate is absent.
    async fn get_usdt_krw_price(&self) -> Result<f64, FeedError>;
}

/// Foreign-perpetual-only operations.
#[async_trait]
pub trait ForeignPerpCapability: ExchangeCapability {
    /// Opens (or adds to) a short position for `qty` contracts, after lot-size normalization.
    async fn open_short(&self, symbol: &SymbolId, qty: f64) -> Result<OrderResult, FeedError>;

    /// Closes (covers) `qty` contracts of an existing short, after lot-size normalization.
    async fn close_short(&self, symbol: &SymbolId, qty: f64) -> Result<OrderResult, FeedError>;

    /// Pre-flight; "already at this leverage" is treated as success.
    async fn set_leverage(&self, symbol: &SymbolId, leverage: u8) -> Result<(), FeedError>;

    /// Snapshot of this venue's authoritative short positions: (symbol, quantity).
    async fn positions(&self) -> Result<Vec<(SymbolId, f64)>, FeedError>;

    /// Lot-size metadata for `symbol`, cached from the instrument-info endpoint.
    async fn lot_size(&self, symbol: &SymbolId) -> Result<LotSizeMetadata, FeedError>;

    /// The current funding rate and interval for `symbol`.
    async fn funding(&self, symbol: &SymbolId) -> Result<(f64, u32, i64), FeedError>;
}
