//! Exchange connectivity: websocket ticker ingestion and REST order placement for the
//! Korean-spot and foreign-perpetual venues (spec §4.1, §4.2, §4.8).

pub mod adapters;
pub mod auth;
pub mod cache;
pub mod capability;
pub mod error;
pub mod quality;

pub use adapters::{BithumbAdapter, BybitAdapter, GateIOAdapter, UpbitAdapter};
pub use auth::*;
pub use cache::QuoteCache;
pub use capability::{ExchangeCapability, ForeignPerpCapability, KoreanSpotCapability};
pub use error::*;
