//! Order result types shared between the Exchange Capability contract and the executor.

use serde::{Deserialize, Serialize};

/// Per spec §4.8: "Errors are classified by the adapter as rejected, new, partially_filled,
/// filled, cancelled, expired."
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Rejected,
    New,
    PartiallyFilled,
    Filled,
    Cancelled,
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Rejected
                | OrderStatus::Filled
                | OrderStatus::Cancelled
                | OrderStatus::Expired
        )
    }

    pub fn is_rejected(self) -> bool {
        matches!(self, OrderStatus::Rejected | OrderStatus::Expired)
    }
}

/// A reconciled order returned by an Exchange Capability call: `status`, `filled_quantity`,
/// `average_price`, and the venue's own order id string (spec §4.8).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id_str: String,
    pub status: OrderStatus,
    pub filled_quantity: f64,
    pub average_price: f64,
}

impl OrderResult {
    /// The hedge invariant from spec §4.6: "the Korean-side amount is always the amount the
    /// foreign side actually filled." `filled_quantity` takes precedence when positive;
    /// otherwise `fallback_qty` (the lot-size-normalized requested quantity) is authoritative.
    pub fn reconciled_quantity(&self, fallback_qty: f64) -> f64 {
        if self.filled_quantity > 0.0 {
            self.filled_quantity
        } else {
            fallback_qty
        }
    }
}
