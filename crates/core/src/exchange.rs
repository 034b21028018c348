//! Exchange identifiers.

use serde::{Deserialize, Serialize};

/// Closed enumeration of the venues this engine trades.
///
/// IDs are kept stable with the wider exchange registry this workspace descended from
/// (Upbit=105, Bithumb=106, Bybit=104, GateIO=107) so log lines and persisted snapshots
/// referencing these values stay meaningful across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum Exchange {
    Upbit = 105,
    Bithumb = 106,
    Bybit = 104,
    GateIO = 107,
}

impl Exchange {
    pub fn from_id(id: u16) -> Option<Self> {
        match id {
            105 => Some(Exchange::Upbit),
            106 => Some(Exchange::Bithumb),
            104 => Some(Exchange::Bybit),
            107 => Some(Exchange::GateIO),
            _ => None,
        }
    }

    #[inline]
    pub fn id(self) -> u16 {
        self as u16
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Exchange::Upbit => "Upbit",
            Exchange::Bithumb => "Bithumb",
            Exchange::Bybit => "Bybit",
            Exchange::GateIO => "Gate.io",
        }
    }

    /// True for the Korean-won spot venues (buy side of the hedge).
    #[inline]
    pub fn is_korean(self) -> bool {
        matches!(self, Exchange::Upbit | Exchange::Bithumb)
    }

    /// True for the USDT-margined perpetual venues (short side of the hedge).
    #[inline]
    pub fn is_foreign_perp(self) -> bool {
        matches!(self, Exchange::Bybit | Exchange::GateIO)
    }

    pub fn all_korean() -> &'static [Exchange] {
        &[Exchange::Upbit, Exchange::Bithumb]
    }

    pub fn all_foreign() -> &'static [Exchange] {
        &[Exchange::Bybit, Exchange::GateIO]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_id_round_trips() {
        for ex in [
            Exchange::Upbit,
            Exchange::Bithumb,
            Exchange::Bybit,
            Exchange::GateIO,
        ] {
            assert_eq!(Exchange::from_id(ex.id()), Some(ex));
        }
    }

    #[test]
    fn from_id_rejects_unknown() {
        assert_eq!(Exchange::from_id(9999), None);
    }

    #[test]
    fn classification_is_partitioned() {
        for ex in [Exchange::Upbit, Exchange::Bithumb] {
            assert!(ex.is_korean());
            assert!(!ex.is_foreign_perp());
        }
        for ex in [Exchange::Bybit, Exchange::GateIO] {
            assert!(ex.is_foreign_perp());
            assert!(!ex.is_korean());
        }
    }
}
