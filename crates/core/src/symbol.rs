//! Symbol identity: an ordered (base, quote) pair with short ASCII tokens.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of the base token (e.g. "BTC").
pub const MAX_BASE_LEN: usize = 12;
/// Maximum length of the quote token (e.g. "KRW").
pub const MAX_QUOTE_LEN: usize = 8;

/// A trading symbol: an ordered (base, quote) pair, used as a map key.
///
/// Equality and hash are byte-exact over the two tokens. Display is "BASE/QUOTE".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolId {
    pub base: CompactString,
    pub quote: CompactString,
}

impl SymbolId {
    /// Build a symbol, truncating silently if a token exceeds its budget.
    /// Truncation indicates a caller bug (venue symbols fit the budget by construction)
    /// so this is a debug_assert rather than a runtime error.
    pub fn new(base: impl Into<CompactString>, quote: impl Into<CompactString>) -> Self {
        let base = base.into();
        let quote = quote.into();
        debug_assert!(base.len() <= MAX_BASE_LEN, "base token too long: {base}");
        debug_assert!(quote.len() <= MAX_QUOTE_LEN, "quote token too long: {quote}");
        Self { base, quote }
    }

    /// Parse "BASE/QUOTE" back into a SymbolId.
    pub fn parse(s: &str) -> Option<Self> {
        let (base, quote) = s.split_once('/')?;
        if base.is_empty() || quote.is_empty() {
            return None;
        }
        Some(Self::new(base, quote))
    }

    /// Render for Upbit/Bithumb style REST/WS market codes: "KRW-BTC".
    pub fn to_upbit_format(&self) -> String {
        format!("{}-{}", self.quote, self.base)
    }

    /// Render for Bithumb's underscore market codes: "BTC_KRW".
    pub fn to_bithumb_format(&self) -> String {
        format!("{}_{}", self.base, self.quote)
    }

    /// Render for Bybit's concatenated perpetual symbols: "BTCUSDT".
    pub fn to_bybit_format(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }

    /// Render for GateIO's futures contract codes: "BTC_USDT".
    pub fn to_gateio_futures_format(&self) -> String {
        format!("{}_{}", self.base, self.quote)
    }

    /// Fast-path check used by the signal engine to recognize the USDT/KRW reference symbol.
    pub fn is_usdt_krw(&self) -> bool {
        self.base.eq_ignore_ascii_case("USDT") && self.quote.eq_ignore_ascii_case("KRW")
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_display_and_parse() {
        let s = SymbolId::new("BTC", "KRW");
        let rendered = s.to_string();
        assert_eq!(rendered, "BTC/KRW");
        assert_eq!(SymbolId::parse(&rendered), Some(s));
    }

    #[test]
    fn parse_rejects_missing_separator() {
        assert_eq!(SymbolId::parse("BTCKRW"), None);
    }

    #[test]
    fn venue_formats() {
        let s = SymbolId::new("BTC", "KRW");
        assert_eq!(s.to_upbit_format(), "KRW-BTC");
        assert_eq!(s.to_bithumb_format(), "BTC_KRW");

        let usdt = SymbolId::new("BTC", "USDT");
        assert_eq!(usdt.to_bybit_format(), "BTCUSDT");
        assert_eq!(usdt.to_gateio_futures_format(), "BTC_USDT");
    }

    #[test]
    fn recognizes_usdt_krw() {
        assert!(SymbolId::new("USDT", "KRW").is_usdt_krw());
        assert!(!SymbolId::new("BTC", "KRW").is_usdt_krw());
    }

    #[test]
    fn equality_and_hash_are_byte_exact() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(SymbolId::new("BTC", "KRW"));
        assert!(set.contains(&SymbolId::new("BTC", "KRW")));
        assert!(!set.contains(&SymbolId::new("btc", "KRW")));
    }
}
