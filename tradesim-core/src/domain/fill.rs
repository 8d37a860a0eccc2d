use super::order::OrderSide;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Execution record for one accepted order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub side: OrderSide,
    pub quantity: f64,
    /// Executed price after slippage and tick rounding.
    pub price: f64,
    pub commission: f64,
    /// Slippage cost in currency (always >= 0).
    pub slippage: f64,
    pub timestamp: DateTime<Utc>,
    pub bar_index: usize,
}

impl Fill {
    pub fn notional(&self) -> f64 {
        self.quantity * self.price
    }
}
