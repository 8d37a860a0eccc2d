//! Position & portfolio ledger: cash, holdings, cost basis and realized P&L.
//!
//! The ledger mutates only through [`Ledger::apply_fill`]. Cash and P&L are
//! rounded to the instrument tick after every fill, and equity is always
//! `cash + quantity * close`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    EquityPoint, ExitReason, Fill, Instrument, OrderSide, Position, Trade, TradeSide,
};

/// Quantities closer to zero than this are treated as flat.
const QTY_EPSILON: f64 = 1e-9;

/// Bookkeeping for the currently open quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct OpenLot {
    entry_bar: usize,
    entry_timestamp: DateTime<Utc>,
    /// Opening commissions not yet attributed to a closed trade.
    commission: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    instrument: Instrument,
    initial_cash: f64,
    cash: f64,
    position: Position,
    realized_pnl: f64,
    total_commission: f64,
    total_slippage: f64,
    open_lot: Option<OpenLot>,
}

impl Ledger {
    pub fn new(initial_cash: f64, instrument: Instrument) -> Self {
        let position = Position::flat(instrument.symbol.clone());
        Self {
            instrument,
            initial_cash,
            cash: initial_cash,
            position,
            realized_pnl: 0.0,
            total_commission: 0.0,
            total_slippage: 0.0,
            open_lot: None,
        }
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn initial_cash(&self) -> f64 {
        self.initial_cash
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    pub fn total_commission(&self) -> f64 {
        self.total_commission
    }

    pub fn total_slippage(&self) -> f64 {
        self.total_slippage
    }

    /// Equity at `close`: cash plus position market value, rounded to the tick.
    pub fn equity(&self, close: f64) -> f64 {
        self.instrument
            .round_money(self.cash + self.position.market_value(close))
    }

    pub fn mark_to_market(&self, timestamp: DateTime<Utc>, close: f64) -> EquityPoint {
        EquityPoint {
            timestamp,
            equity: self.equity(close),
        }
    }

    /// Apply a fill. Returns the trade materialized when the fill reduces,
    /// closes or flips the open quantity.
    pub fn apply_fill(&mut self, fill: &Fill) -> Option<Trade> {
        let notional = fill.quantity * fill.price;
        match fill.side {
            OrderSide::Buy => self.cash -= notional + fill.commission,
            OrderSide::Sell => self.cash += notional - fill.commission,
        }
        self.cash = self.round(self.cash);
        self.total_commission = self.round(self.total_commission + fill.commission);
        self.total_slippage = self.round(self.total_slippage + fill.slippage);

        let held = self.position.quantity;
        let signed = fill.side.sign() * fill.quantity;

        if held.abs() < QTY_EPSILON || held * signed > 0.0 {
            self.increase(fill, signed);
            return None;
        }

        let close_qty = fill.quantity.min(held.abs());
        let open_qty = fill.quantity - close_qty;
        let close_commission = fill.commission * close_qty / fill.quantity;
        let trade = self.close(fill, close_qty, close_commission);

        let remaining = held + signed;
        if open_qty > QTY_EPSILON {
            // Flip: the excess opens a fresh position at the fill price.
            self.position.quantity = remaining;
            self.position.avg_cost = Some(fill.price);
            self.open_lot = Some(OpenLot {
                entry_bar: fill.bar_index,
                entry_timestamp: fill.timestamp,
                commission: fill.commission - close_commission,
            });
        } else if remaining.abs() < QTY_EPSILON {
            self.position.quantity = 0.0;
            self.position.avg_cost = None;
            self.open_lot = None;
        } else {
            self.position.quantity = remaining;
        }

        Some(trade)
    }

    /// Open or add to a position; cost basis becomes the quantity-weighted mean.
    fn increase(&mut self, fill: &Fill, signed: f64) {
        let held = self.position.quantity;
        let new_qty = held + signed;
        let old_cost = self.position.avg_cost.unwrap_or(fill.price) * held.abs();
        let avg = (old_cost + fill.price * fill.quantity) / new_qty.abs();
        self.position.quantity = new_qty;
        self.position.avg_cost = Some(avg);

        match self.open_lot.as_mut() {
            Some(lot) => lot.commission += fill.commission,
            None => {
                self.open_lot = Some(OpenLot {
                    entry_bar: fill.bar_index,
                    entry_timestamp: fill.timestamp,
                    commission: fill.commission,
                })
            }
        }
    }

    /// Realize P&L on `close_qty` of the open position. Cost basis is used, not changed.
    fn close(&mut self, fill: &Fill, close_qty: f64, close_commission: f64) -> Trade {
        let held = self.position.quantity;
        let avg = self.position.avg_cost.unwrap_or(fill.price);
        let side = if held > 0.0 {
            TradeSide::Long
        } else {
            TradeSide::Short
        };
        let per_unit = match side {
            TradeSide::Long => fill.price - avg,
            TradeSide::Short => avg - fill.price,
        };
        let realized = self.round(per_unit * close_qty - close_commission);
        self.realized_pnl = self.round(self.realized_pnl + realized);

        let (entry_bar, entry_timestamp, entry_commission) = match self.open_lot.as_mut() {
            Some(lot) => {
                let share = lot.commission * close_qty / held.abs();
                lot.commission -= share;
                (lot.entry_bar, lot.entry_timestamp, share)
            }
            None => (fill.bar_index, fill.timestamp, 0.0),
        };
        let entry_commission = self.round(entry_commission);

        Trade {
            symbol: self.instrument.symbol.clone(),
            side,
            entry_bar,
            entry_timestamp,
            entry_price: avg,
            exit_bar: fill.bar_index,
            exit_timestamp: fill.timestamp,
            exit_price: fill.price,
            quantity: close_qty,
            exit_commission: self.round(close_commission),
            entry_commission,
            realized_pnl: realized,
            net_pnl: self.round(realized - entry_commission),
            exit_reason: ExitReason::Signal,
        }
    }

    fn round(&self, amount: f64) -> f64 {
        self.instrument.round_money(amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fill(side: OrderSide, quantity: f64, price: f64, commission: f64, bar: usize) -> Fill {
        Fill {
            side,
            quantity,
            price,
            commission,
            slippage: 0.0,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 21, 0, 0).unwrap()
                + chrono::Duration::days(bar as i64),
            bar_index: bar,
        }
    }

    #[test]
    fn fresh_ledger_equity_is_initial_cash() {
        let ledger = Ledger::new(10_000.0, Instrument::equity("SPY"));
        assert_eq!(ledger.equity(123.45), 10_000.0);
        assert!(ledger.position().is_flat());
    }

    #[test]
    fn buy_then_sell_round_trip() {
        let mut ledger = Ledger::new(10_000.0, Instrument::equity("SPY"));

        assert!(ledger.apply_fill(&fill(OrderSide::Buy, 100.0, 50.0, 1.0, 0)).is_none());
        assert_eq!(ledger.cash(), 4_999.0);
        assert_eq!(ledger.position().quantity, 100.0);
        assert_eq!(ledger.position().avg_cost, Some(50.0));

        let trade = ledger
            .apply_fill(&fill(OrderSide::Sell, 100.0, 60.0, 1.0, 5))
            .unwrap();
        assert_eq!(trade.realized_pnl, 999.0);
        assert_eq!(trade.entry_commission, 1.0);
        assert_eq!(trade.net_pnl, 998.0);
        assert_eq!(trade.entry_bar, 0);
        assert_eq!(trade.exit_bar, 5);
        assert_eq!(ledger.cash(), 10_998.0);
        assert!(ledger.position().is_flat());
        assert_eq!(ledger.position().avg_cost, None);
        assert_eq!(ledger.realized_pnl(), 999.0);
        assert_eq!(ledger.total_commission(), 2.0);
    }

    #[test]
    fn average_cost_is_quantity_weighted() {
        let mut ledger = Ledger::new(100_000.0, Instrument::equity("SPY"));
        ledger.apply_fill(&fill(OrderSide::Buy, 100.0, 50.0, 0.0, 0));
        ledger.apply_fill(&fill(OrderSide::Buy, 300.0, 70.0, 0.0, 1));
        // (100*50 + 300*70) / 400 = 65
        assert_eq!(ledger.position().avg_cost, Some(65.0));
    }

    #[test]
    fn partial_sell_keeps_cost_basis() {
        let mut ledger = Ledger::new(100_000.0, Instrument::equity("SPY"));
        ledger.apply_fill(&fill(OrderSide::Buy, 100.0, 50.0, 2.0, 0));
        let trade = ledger
            .apply_fill(&fill(OrderSide::Sell, 40.0, 55.0, 1.0, 3))
            .unwrap();
        assert_eq!(trade.quantity, 40.0);
        assert_eq!(trade.realized_pnl, 199.0);
        // 40% of the 2.00 opening commission
        assert!((trade.entry_commission - 0.8).abs() < 1e-9);
        assert_eq!(ledger.position().quantity, 60.0);
        assert_eq!(ledger.position().avg_cost, Some(50.0));
    }

    #[test]
    fn equity_identity_holds() {
        let mut ledger = Ledger::new(10_000.0, Instrument::equity("SPY"));
        ledger.apply_fill(&fill(OrderSide::Buy, 100.0, 50.0, 1.0, 0));
        assert_eq!(ledger.equity(55.0), ledger.cash() + 100.0 * 55.0);
    }

    #[test]
    fn short_then_cover() {
        let mut ledger = Ledger::new(10_000.0, Instrument::equity("SPY"));
        ledger.apply_fill(&fill(OrderSide::Sell, 10.0, 100.0, 0.0, 0));
        assert_eq!(ledger.position().quantity, -10.0);
        assert_eq!(ledger.cash(), 11_000.0);
        assert_eq!(ledger.equity(100.0), 10_000.0);

        let trade = ledger
            .apply_fill(&fill(OrderSide::Buy, 10.0, 90.0, 0.0, 2))
            .unwrap();
        assert_eq!(trade.side, TradeSide::Short);
        assert_eq!(trade.realized_pnl, 100.0);
        assert!(ledger.position().is_flat());
        assert_eq!(ledger.cash(), 10_100.0);
    }

    #[test]
    fn flip_long_to_short() {
        let mut ledger = Ledger::new(10_000.0, Instrument::equity("SPY"));
        ledger.apply_fill(&fill(OrderSide::Buy, 10.0, 100.0, 0.0, 0));
        let trade = ledger
            .apply_fill(&fill(OrderSide::Sell, 25.0, 110.0, 0.0, 1))
            .unwrap();
        assert_eq!(trade.quantity, 10.0);
        assert_eq!(trade.realized_pnl, 100.0);
        assert_eq!(ledger.position().quantity, -15.0);
        assert_eq!(ledger.position().avg_cost, Some(110.0));
    }
}
