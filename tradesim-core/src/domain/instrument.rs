use serde::{Deserialize, Serialize};

use super::order::OrderSide;

/// Tolerance in tick units before a value is considered off-grid.
const TICK_EPSILON: f64 = 1e-9;

/// Instrument metadata: minimum price increment and lot size.
///
/// The tick size doubles as the monetary rounding increment for cash,
/// realized P&L and equity so long series do not accumulate float drift.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Instrument {
    pub symbol: String,
    pub tick_size: f64,
    pub lot_size: f64,
}

impl Instrument {
    pub fn new(symbol: impl Into<String>, tick_size: f64, lot_size: f64) -> Self {
        Self {
            symbol: symbol.into(),
            tick_size,
            lot_size,
        }
    }

    /// US-equity style instrument: one-cent ticks, whole-share lots.
    pub fn equity(symbol: impl Into<String>) -> Self {
        Self::new(symbol, 0.01, 1.0)
    }

    /// Round a monetary amount to the nearest tick.
    pub fn round_money(&self, amount: f64) -> f64 {
        self.snap(amount, f64::round)
    }

    /// Round a fill price against the trader: buys round up, sells round down.
    pub fn round_price(&self, price: f64, side: OrderSide) -> f64 {
        match side {
            OrderSide::Buy => self.snap(price, |t| (t - TICK_EPSILON).ceil()),
            OrderSide::Sell => self.snap(price, |t| (t + TICK_EPSILON).floor()),
        }
    }

    /// Round a quantity down to a whole number of lots.
    pub fn round_quantity_down(&self, quantity: f64) -> f64 {
        if self.lot_size <= 0.0 {
            return quantity;
        }
        let lots = (quantity / self.lot_size + TICK_EPSILON).floor();
        lots.max(0.0) * self.lot_size
    }

    /// Snap `value` onto the tick grid using `round_fn` on the tick count.
    ///
    /// When the tick divides one evenly (0.01, 0.05, 0.25, 1.0) the division by
    /// the integral ticks-per-unit keeps results like 4999.00 exact.
    fn snap(&self, value: f64, round_fn: impl Fn(f64) -> f64) -> f64 {
        if self.tick_size <= 0.0 || !value.is_finite() {
            return value;
        }
        let per_unit = 1.0 / self.tick_size;
        if (per_unit - per_unit.round()).abs() < 1e-6 {
            let per_unit = per_unit.round();
            round_fn(value * per_unit) / per_unit
        } else {
            round_fn(value / self.tick_size) * self.tick_size
        }
    }
}

impl Default for Instrument {
    fn default() -> Self {
        Self::equity("DEFAULT")
    }
}
