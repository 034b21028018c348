//! Quality Filter: pure predicate deciding whether a (korean, foreign) quote pair is
//! usable for a trading decision right now (spec §4.2).

use kimp_core::{Quote, QualityCaps};

/// A quote pair is usable iff all hold:
/// 1. both are valid with non-zero timestamps;
/// 2. `now - ts <= MAX_QUOTE_AGE_MS` for each side;
/// 3. `|korean.ts - foreign.ts| <= MAX_DESYNC_MS`;
/// 4. per-side spread does not exceed its cap;
/// 5. the USDT/KRW rate is > 0.
pub fn quote_pair_usable(korean: &Quote, foreign: &Quote, usdt_rate: f64, now_ms: i64, caps: &QualityCaps) -> bool {
    if !korean.is_valid() || !foreign.is_valid() {
        return false;
    }
    if now_ms - korean.timestamp_ms > caps.max_quote_age_ms {
        return false;
    }
    if now_ms - foreign.timestamp_ms > caps.max_quote_age_ms {
        return false;
    }
    if (korean.timestamp_ms - foreign.timestamp_ms).abs() > caps.max_desync_ms {
        return false;
    }
    if spread_pct(korean) > caps.korean_spread_cap_pct {
        return false;
    }
    if spread_pct(foreign) > caps.foreign_spread_cap_pct {
        return false;
    }
    if usdt_rate <= 0.0 {
        return false;
    }
    if !caps.accept_degraded_quotes && (is_degraded(korean) || is_degraded(foreign)) {
        return false;
    }
    true
}

fn spread_pct(q: &Quote) -> f64 {
    let mid = (q.ask + q.bid) / 2.0;
    if mid <= 0.0 {
        return f64::INFINITY;
    }
    (q.ask - q.bid) / mid * 100.0
}

/// A collapsed quote: bid == ask == last, typical when the orderbook channel hasn't
/// populated and the ticker falls back to the last trade price.
fn is_degraded(q: &Quote) -> bool {
    (q.bid - q.ask).abs() < f64::EPSILON && (q.bid - q.last).abs() < f64::EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_quote(bid: f64, ask: f64, ts: i64) -> Quote {
        Quote {
            bid,
            ask,
            last: (bid + ask) / 2.0,
            funding_rate: 0.0,
            funding_interval_hours: 8,
            next_funding_ms: 0,
            timestamp_ms: ts,
            valid: true,
        }
    }

    #[test]
    fn usable_pair_passes_all_checks() {
        let caps = QualityCaps::default();
        let k = fresh_quote(99_000_000.0, 99_100_000.0, 1_000);
        let f = fresh_quote(65_000.0, 65_010.0, 1_200);
        assert!(quote_pair_usable(&k, &f, 1_450.0, 2_000, &caps));
    }

    #[test]
    fn rejects_stale_korean_side() {
        let caps = QualityCaps::default();
        let k = fresh_quote(99_000_000.0, 99_100_000.0, 0);
        let f = fresh_quote(65_000.0, 65_010.0, 10_000);
        assert!(!quote_pair_usable(&k, &f, 1_450.0, 10_100, &caps));
    }

    #[test]
    fn rejects_desync() {
        let caps = QualityCaps::default();
        let k = fresh_quote(99_000_000.0, 99_100_000.0, 1_000);
        let f = fresh_quote(65_000.0, 65_010.0, 10_000);
        assert!(!quote_pair_usable(&k, &f, 1_450.0, 10_000, &caps));
    }

    #[test]
    fn rejects_wide_spread() {
        let caps = QualityCaps::default();
        let k = fresh_quote(90_000_000.0, 99_100_000.0, 1_000);
        let f = fresh_quote(65_000.0, 65_010.0, 1_000);
        assert!(!quote_pair_usable(&k, &f, 1_450.0, 1_000, &caps));
    }

    #[test]
    fn rejects_zero_usdt_rate() {
        let caps = QualityCaps::default();
        let k = fresh_quote(99_000_000.0, 99_100_000.0, 1_000);
        let f = fresh_quote(65_000.0, 65_010.0, 1_000);
        assert!(!quote_pair_usable(&k, &f, 0.0, 1_000, &caps));
    }

    #[test]
    fn degraded_quote_accepted_by_default_knob() {
        let mut caps = QualityCaps::default();
        let k = Quote {
            bid: 100.0,
            ask: 100.0,
            last: 100.0,
            funding_rate: 0.0,
            funding_interval_hours: 8,
            next_funding_ms: 0,
            timestamp_ms: 1_000,
            valid: true,
        };
        let f = fresh_quote(65_000.0, 65_010.0, 1_000);
        assert!(quote_pair_usable(&k, &f, 1_450.0, 1_000, &caps));
        caps.accept_degraded_quotes = false;
        assert!(!quote_pair_usable(&k, &f, 1_450.0, 1_000, &caps));
    }
}
