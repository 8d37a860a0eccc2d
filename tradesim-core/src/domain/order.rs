//! Order: a transient request derived from a Signal against the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// +1 for buys, -1 for sells.
    pub fn sign(self) -> f64 {
        match self {
            OrderSide::Buy => 1.0,
            OrderSide::Sell => -1.0,
        }
    }
}

/// A market order at the current bar.
///
/// Created per signal and consumed into exactly one Fill or one rejection
/// within the same bar. Orders never outlive the bar that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub side: OrderSide,
    pub quantity: f64,
    /// Reference price before slippage (the bar close).
    pub requested_price: f64,
    pub timestamp: DateTime<Utc>,
    pub bar_index: usize,
}

impl Order {
    pub fn notional(&self) -> f64 {
        self.quantity * self.requested_price
    }
}
