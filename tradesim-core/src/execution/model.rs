//! Execution model: turns an order plus the current bar into a fill or a rejection.
//!
//! Orders are all-or-nothing: there are no partial fills.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::cost_model::{ExecutionConfig, ZeroVolumePolicy};
use crate::domain::{Bar, Fill, Instrument, Order, OrderSide};

/// Cash slack for float comparisons on affordability.
const CASH_EPSILON: f64 = 1e-9;

/// Why an order did not fill. Recorded on the run; the simulation continues.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum OrderRejection {
    #[error("insufficient funds: order needs {required:.2}, available cash {available:.2}")]
    InsufficientFunds { required: f64, available: f64 },
    #[error("invalid sell quantity: requested {requested}, held {held}")]
    InvalidSellQuantity { requested: f64, held: f64 },
    #[error("bar has zero volume and the zero-volume policy rejects orders")]
    ZeroVolume,
    #[error("order quantity rounds to zero lots")]
    EmptyOrder,
}

/// Fill simulator bound to one instrument and one set of cost parameters.
#[derive(Debug, Clone)]
pub struct ExecutionModel {
    config: ExecutionConfig,
    instrument: Instrument,
    allow_short: bool,
}

impl ExecutionModel {
    pub fn new(config: ExecutionConfig, instrument: Instrument, allow_short: bool) -> Self {
        Self {
            config,
            instrument,
            allow_short,
        }
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn allow_short(&self) -> bool {
        self.allow_short
    }

    /// Reference (pre-slippage) price for an order on `bar`.
    ///
    /// Normally the bar close. On a zero-volume bar the configured policy decides.
    pub fn reference_price(
        &self,
        bar: &Bar,
        prior_close: Option<f64>,
    ) -> Result<f64, OrderRejection> {
        if bar.has_volume() {
            return Ok(bar.close);
        }
        match self.config.zero_volume {
            ZeroVolumePolicy::Reject => Err(OrderRejection::ZeroVolume),
            ZeroVolumePolicy::FillAtPriorClose => Ok(prior_close.unwrap_or(bar.close)),
        }
    }

    /// Slipped, tick-rounded price and the slippage cost in currency.
    pub fn fill_price(
        &self,
        side: OrderSide,
        reference: f64,
        quantity: f64,
        volume: f64,
    ) -> (f64, f64) {
        let fraction = self.config.slippage.impact_fraction(quantity, volume);
        let slipped = reference * (1.0 + side.sign() * fraction);
        let price = self.instrument.round_price(slipped, side);
        let cost = ((price - reference) * side.sign() * quantity).max(0.0);
        (price, self.instrument.round_money(cost))
    }

    /// Whole lots a buyer can afford with `budget` at `reference`.
    ///
    /// Prices at the slippage model's worst case so the resulting order never
    /// fails the funds check because of its own market impact.
    pub fn max_buy_quantity(&self, budget: f64, reference: f64) -> f64 {
        let worst = self.config.slippage.worst_case_fraction();
        let price = self
            .instrument
            .round_price(reference * (1.0 + worst), OrderSide::Buy);
        let raw = self.config.commission.max_affordable_quantity(budget, price);
        let mut qty = self.instrument.round_quantity_down(raw);
        // Commission rounding can push the last lot over budget.
        while qty > 0.0 && self.buy_cost(qty, price) > budget + CASH_EPSILON {
            qty = self
                .instrument
                .round_quantity_down(qty - self.instrument.lot_size.max(1e-12));
        }
        qty
    }

    /// Cash needed for a single lot at `reference`, worst-case slippage included.
    pub fn lot_cost(&self, reference: f64) -> f64 {
        let worst = self.config.slippage.worst_case_fraction();
        let price = self
            .instrument
            .round_price(reference * (1.0 + worst), OrderSide::Buy);
        self.instrument
            .round_money(self.buy_cost(self.instrument.lot_size, price))
    }

    fn commission(&self, notional: f64) -> f64 {
        self.instrument
            .round_money(self.config.commission.compute(notional))
    }

    fn buy_cost(&self, quantity: f64, price: f64) -> f64 {
        let notional = quantity * price;
        notional + self.commission(notional)
    }

    /// Execute `order` against `bar`.
    ///
    /// `held` is the signed position quantity before the order.
    pub fn execute(
        &self,
        order: &Order,
        bar: &Bar,
        cash: f64,
        held: f64,
    ) -> Result<Fill, OrderRejection> {
        if order.quantity <= 0.0 {
            return Err(OrderRejection::EmptyOrder);
        }
        if !bar.has_volume() && self.config.zero_volume == ZeroVolumePolicy::Reject {
            return Err(OrderRejection::ZeroVolume);
        }

        if order.side == OrderSide::Sell && !self.allow_short {
            let available = held.max(0.0);
            if order.quantity > available + CASH_EPSILON {
                return Err(OrderRejection::InvalidSellQuantity {
                    requested: order.quantity,
                    held: available,
                });
            }
        }

        let (price, slippage) =
            self.fill_price(order.side, order.requested_price, order.quantity, bar.volume);
        let notional = order.quantity * price;
        let commission = self.commission(notional);

        match order.side {
            OrderSide::Buy => {
                let required = self.instrument.round_money(notional + commission);
                if required > cash + CASH_EPSILON {
                    return Err(OrderRejection::InsufficientFunds {
                        required,
                        available: cash,
                    });
                }
            }
            // A commission larger than the proceeds must still be payable.
            OrderSide::Sell => {
                let available = self.instrument.round_money(cash + notional);
                if commission > available + CASH_EPSILON {
                    return Err(OrderRejection::InsufficientFunds {
                        required: commission,
                        available,
                    });
                }
            }
        }

        Ok(Fill {
            side: order.side,
            quantity: order.quantity,
            price,
            commission,
            slippage,
            timestamp: order.timestamp,
            bar_index: order.bar_index,
        })
    }
}
