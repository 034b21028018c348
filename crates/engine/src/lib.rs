//! Signal Engine: premium computation and the entry/exit state machine (spec §4.3, §4.5).
//!
//! Consumes Quote Cache updates, maintains the Position Tracker, and emits entry/exit
//! signals through fast-path checks and the periodic monitor loop.

pub mod position_tracker;
pub mod premium;
pub mod ring_buffer;
pub mod signal_engine;

pub use position_tracker::PositionTracker;
pub use premium::*;
pub use ring_buffer::SpscRing;
pub use signal_engine::{SignalEngine, SignalSink, TrackedPair};
