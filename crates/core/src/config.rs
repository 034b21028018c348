//! Trading parameters, constructed once at startup and shared by reference.
//!
//! Per spec §9's design note: the original source keeps these as static constants; this
//! port makes them an immutable, runtime-configured struct instead.

use serde::{Deserialize, Serialize};

/// Lot-size constraints for one foreign-venue symbol, cached from the instrument-info
/// endpoint for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LotSizeMetadata {
    pub min_qty: f64,
    pub qty_step: f64,
    pub min_notional: f64,
}

impl LotSizeMetadata {
    /// Floor `raw_qty` to the lot step, then clamp up to `min_qty` if needed.
    /// Matches Scenario S4: raw 0.000657894 with step 0.001 / min_qty 0.001 -> 0.001.
    pub fn normalize(&self, raw_qty: f64) -> f64 {
        if self.qty_step <= 0.0 {
            return raw_qty.max(self.min_qty);
        }
        let steps = (raw_qty / self.qty_step).floor();
        let floored = steps * self.qty_step;
        floored.max(self.min_qty)
    }
}

/// Quote-quality caps consumed by the Quality Filter (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityCaps {
    pub max_quote_age_ms: i64,
    pub max_desync_ms: i64,
    pub korean_spread_cap_pct: f64,
    pub foreign_spread_cap_pct: f64,
    pub usdt_rate_jump_cap_pct: f64,
    /// Resolves spec §9 Open Question #1: whether a collapsed quote (bid == ask == last,
    /// typical when the orderbook channel hasn't populated yet and the ticker falls back to
    /// last trade) is accepted as degraded or filtered out. Default true matches the
    /// original's permissive behavior.
    pub accept_degraded_quotes: bool,
}

impl Default for QualityCaps {
    fn default() -> Self {
        Self {
            max_quote_age_ms: 5_000,
            max_desync_ms: 2_000,
            korean_spread_cap_pct: 1.0,
            foreign_spread_cap_pct: 0.3,
            usdt_rate_jump_cap_pct: 3.0,
            accept_degraded_quotes: true,
        }
    }
}

/// Immutable trading parameters shared by reference across the engine and executor.
///
/// Default values follow the original's documented constants: entry threshold -0.99%,
/// exit floor +0.10%, dynamic spread 0.79% (round-trip fees + target profit), slice size
/// $25, position target $250, single open position by default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Entry fires when entry_premium <= entry_threshold (negative percent).
    pub entry_threshold_pct: f64,
    /// Fixed positive floor for the dynamic exit threshold.
    pub exit_floor_pct: f64,
    /// Round-trip fees plus minimum net profit target, added to a position's entry premium
    /// to get its dynamic exit threshold.
    pub dynamic_spread_pct: f64,

    /// Fixed per-slice USD notional.
    pub slice_usd: f64,
    /// Target USD notional per position.
    pub position_size_usd: f64,
    /// Below this remaining USD value, an exit slice closes the entire remainder.
    pub small_close_threshold_usd: f64,

    /// Maximum simultaneous open positions.
    pub max_positions: usize,

    /// Minimum Korean-venue order size in KRW; slices below this are rolled back.
    pub min_order_krw: f64,

    /// Required foreign funding interval in hours for a symbol to qualify for entry.
    pub funding_interval_hours: u32,
    /// If true, entry additionally requires a non-negative funding rate.
    pub require_positive_funding: bool,

    /// Cadence of the debounced full rescan after a USDT/KRW update.
    pub usdt_rescan_debounce_ms: u64,
    /// Cadence of the coarse entry backup scan.
    pub entry_backup_scan_ms: u64,
    /// Cadence of the fine exit backup scan.
    pub exit_backup_scan_ms: u64,

    /// Retry policy for a rejected order (slice interval reused as the retry delay).
    pub slice_interval_ms: u64,
    /// Retry count for the Korean-sell-after-cover step during exit.
    pub exit_sell_max_retries: u32,
    /// Base backoff for the exit-sell retry, multiplied linearly by attempt number.
    pub exit_sell_backoff_base_ms: u64,

    pub quality: QualityCaps,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            entry_threshold_pct: -0.99,
            exit_floor_pct: 0.10,
            dynamic_spread_pct: 0.79,

            slice_usd: 25.0,
            position_size_usd: 250.0,
            small_close_threshold_usd: 50.0,

            max_positions: 1,

            min_order_krw: 5_000.0,

            funding_interval_hours: 8,
            require_positive_funding: false,

            usdt_rescan_debounce_ms: 500,
            entry_backup_scan_ms: 1_500,
            exit_backup_scan_ms: 250,

            slice_interval_ms: 500,
            exit_sell_max_retries: 5,
            exit_sell_backoff_base_ms: 300,

            quality: QualityCaps::default(),
        }
    }
}

impl TradingConfig {
    /// The dynamic exit threshold for a position entered at `entry_premium_pct`, per spec
    /// §4.3: `max(entry_premium + DYNAMIC_SPREAD, EXIT_FLOOR)`.
    pub fn dynamic_exit_threshold(&self, entry_premium_pct: f64) -> f64 {
        (entry_premium_pct + self.dynamic_spread_pct).max(self.exit_floor_pct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_constants() {
        let c = TradingConfig::default();
        assert_eq!(c.entry_threshold_pct, -0.99);
        assert_eq!(c.exit_floor_pct, 0.10);
        assert_eq!(c.dynamic_spread_pct, 0.79);
        assert_eq!(c.slice_usd, 25.0);
        assert_eq!(c.position_size_usd, 250.0);
        assert_eq!(c.max_positions, 1);
        assert_eq!(c.min_order_krw, 5_000.0);
    }

    #[test]
    fn dynamic_exit_threshold_scenario_s3() {
        let c = TradingConfig::default();
        // Entered at -0.30%, DYNAMIC_SPREAD 0.79 -> 0.49, which beats EXIT_FLOOR 0.10.
        assert!((c.dynamic_exit_threshold(-0.30) - 0.49).abs() < 1e-9);
    }

    #[test]
    fn dynamic_exit_threshold_floors_when_entry_pulls_below() {
        let c = TradingConfig::default();
        // Entry premium very negative pulls entry+spread below the floor; floor wins.
        assert_eq!(c.dynamic_exit_threshold(-5.0), c.exit_floor_pct);
    }

    #[test]
    fn lot_size_normalize_scenario_s4() {
        let lot = LotSizeMetadata {
            min_qty: 0.001,
            qty_step: 0.001,
            min_notional: 0.0,
        };
        let raw = 25.0 / 38_000.0;
        assert!((lot.normalize(raw) - 0.001).abs() < 1e-12);
    }

    #[test]
    fn lot_size_normalize_floors_to_step() {
        let lot = LotSizeMetadata {
            min_qty: 0.0001,
            qty_step: 0.001,
            min_notional: 0.0,
        };
        assert!((lot.normalize(0.0057) - 0.005).abs() < 1e-12);
    }
}
