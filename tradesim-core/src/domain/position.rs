use serde::{Deserialize, Serialize};

/// Holding in a single instrument.
///
/// `avg_cost` is the quantity-weighted mean entry price of the open quantity.
/// It is `None` whenever the position is flat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: f64,
    pub avg_cost: Option<f64>,
}

impl Position {
    pub fn flat(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            quantity: 0.0,
            avg_cost: None,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.quantity == 0.0
    }

    pub fn is_long(&self) -> bool {
        self.quantity > 0.0
    }

    pub fn is_short(&self) -> bool {
        self.quantity < 0.0
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        match self.avg_cost {
            Some(cost) => self.quantity * (price - cost),
            None => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_position_has_no_cost() {
        let pos = Position::flat("SPY");
        assert!(pos.is_flat());
        assert_eq!(pos.avg_cost, None);
        assert_eq!(pos.unrealized_pnl(123.0), 0.0);
    }

    #[test]
    fn long_unrealized_pnl() {
        let pos = Position {
            symbol: "SPY".into(),
            quantity: 100.0,
            avg_cost: Some(50.0),
        };
        assert!(pos.is_long());
        assert_eq!(pos.market_value(60.0), 6_000.0);
        assert_eq!(pos.unrealized_pnl(60.0), 1_000.0);
    }

    #[test]
    fn short_unrealized_pnl() {
        let pos = Position {
            symbol: "SPY".into(),
            quantity: -10.0,
            avg_cost: Some(50.0),
        };
        assert!(pos.is_short());
        assert_eq!(pos.unrealized_pnl(45.0), 50.0);
    }
}
