//! Core data types for the kimchi-premium arbitrage engine.

pub mod config;
pub mod error;
pub mod exchange;
pub mod order;
pub mod position;
pub mod quote;
pub mod signal;
pub mod symbol;

pub use config::*;
pub use error::*;
pub use exchange::*;
pub use order::*;
pub use position::*;
pub use quote::*;
pub use signal::*;
pub use symbol::*;
