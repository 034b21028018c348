//! Premium Calculator: the Korean/foreign premium formulas (spec §4.3).
//!
//! Narrowed from the teacher's N-exchange `PremiumMatrix` (`crates/engine/src/premium.rs`,
//! `kimchi_premium()`) to the single Korean-spot × foreign-perpetual pair this system trades.

/// `((korean_ask - foreign_bid * usdt_rate) / (foreign_bid * usdt_rate)) * 100`
///
/// Negative when the Korean price trades below the foreign price in won terms — the entry
/// condition this system watches for.
pub fn entry_premium(korean_ask: f64, foreign_bid: f64, usdt_rate: f64) -> f64 {
    let foreign_in_krw = foreign_bid * usdt_rate;
    if foreign_in_krw <= 0.0 {
        return 0.0;
    }
    ((korean_ask - foreign_in_krw) / foreign_in_krw) * 100.0
}

/// Same formula, opposite sides: Korean bid vs. foreign ask. Used to evaluate unwinding an
/// open position.
pub fn exit_premium(korean_bid: f64, foreign_ask: f64, usdt_rate: f64) -> f64 {
    let foreign_in_krw = foreign_ask * usdt_rate;
    if foreign_in_krw <= 0.0 {
        return 0.0;
    }
    ((korean_bid - foreign_in_krw) / foreign_in_krw) * 100.0
}

/// Batch form for the dashboard exporter: fills `out[i]` with `entry_premium` for
/// `(korean_asks[i], foreign_bids[i])`. Panics if the slice lengths disagree (a caller bug,
/// not a runtime condition).
pub fn entry_premium_batch(korean_asks: &[f64], foreign_bids: &[f64], usdt_rate: f64, out: &mut [f64]) {
    assert_eq!(korean_asks.len(), foreign_bids.len());
    assert_eq!(korean_asks.len(), out.len());
    for i in 0..out.len() {
        out[i] = entry_premium(korean_asks[i], foreign_bids[i], usdt_rate);
    }
}

/// Batch form of `exit_premium`, same shape as `entry_premium_batch`.
pub fn exit_premium_batch(korean_bids: &[f64], foreign_asks: &[f64], usdt_rate: f64, out: &mut [f64]) {
    assert_eq!(korean_bids.len(), foreign_asks.len());
    assert_eq!(korean_bids.len(), out.len());
    for i in 0..out.len() {
        out[i] = exit_premium(korean_bids[i], foreign_asks[i], usdt_rate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn entry_premium_negative_when_korean_cheaper() {
        // Korean ask 99,000,000 KRW vs foreign bid 68,000 USDT at 1,450 KRW/USDT = 98,600,000.
        let p = entry_premium(99_000_000.0, 68_000.0, 1_450.0);
        assert!(p > 0.0);
        let p2 = entry_premium(98_000_000.0, 68_000.0, 1_450.0);
        assert!(p2 < 0.0);
    }

    #[test]
    fn exit_ge_entry_invariant_given_tight_spreads() {
        // bid <= ask on both sides implies entry_premium >= exit_premium (spec invariant 6).
        let korean_bid = 98_990_000.0;
        let korean_ask = 99_000_000.0;
        let foreign_bid = 67_995.0;
        let foreign_ask = 68_000.0;
        let usdt_rate = 1_450.0;
        let entry = entry_premium(korean_ask, foreign_bid, usdt_rate);
        let exit = exit_premium(korean_bid, foreign_ask, usdt_rate);
        assert!(entry >= exit);
    }

    #[test]
    fn zero_foreign_price_yields_zero_premium() {
        assert_eq!(entry_premium(100.0, 0.0, 1450.0), 0.0);
        assert_eq!(exit_premium(100.0, 0.0, 1450.0), 0.0);
    }

    #[test]
    fn batch_matches_scalar() {
        let korean = [99_000_000.0, 98_500_000.0];
        let foreign = [68_000.0, 68_100.0];
        let mut out = [0.0; 2];
        entry_premium_batch(&korean, &foreign, 1_450.0, &mut out);
        for i in 0..2 {
            assert_eq!(out[i], entry_premium(korean[i], foreign[i], 1_450.0));
        }
    }

    #[test]
    #[should_panic]
    fn batch_length_mismatch_panics() {
        let korean = [99_000_000.0];
        let foreign = [68_000.0, 68_100.0];
        let mut out = [0.0; 2];
        entry_premium_batch(&korean, &foreign, 1_450.0, &mut out);
    }
}
