//! Per-venue Exchange Capability adapters.

pub mod bithumb;
pub mod bybit;
pub mod gateio;
pub mod upbit;

pub use bithumb::BithumbAdapter;
pub use bybit::BybitAdapter;
pub use gateio::GateIOAdapter;
pub use upbit::UpbitAdapter;
