//! Bar-by-bar simulation loop.
//!
//! Per bar, in order:
//! 1. Between-bar checks: cancellation, wall-clock budget
//! 2. Protective exits: stop-loss / take-profit against the bar close
//! 3. Strategy: history up to and including this bar + current position → Signal
//! 4. Order: Signal sized against the ledger
//! 5. Execution: Order + bar → Fill or rejection; fills go to the ledger
//! 6. Liquidation of open quantity on the final bar (if configured)
//! 7. Mark-to-market at the close, equity point, ruin check
//!
//! Nothing here is random. Given the same bars, strategy and config the run is
//! bit-for-bit reproducible.

use std::time::Instant;

use log::{debug, warn};

use crate::domain::{Bar, BarSeries, ExitReason, Fill, Order, OrderSide, OrderSize, Signal, Trade};
use crate::execution::{ExecutionModel, OrderRejection};
use crate::ledger::Ledger;
use crate::strategy::Strategy;

use super::control::RunControl;
use super::state::{EngineConfig, RejectedOrder, RunResult, RunState, TerminationReason};

/// Single-run simulation engine bound to one immutable configuration.
#[derive(Debug, Clone)]
pub struct SimulationEngine {
    config: EngineConfig,
    execution: ExecutionModel,
}

/// Fills, trades and rejections accumulated over one run.
#[derive(Debug, Default)]
struct Journal {
    trades: Vec<Trade>,
    fills: Vec<Fill>,
    rejections: Vec<RejectedOrder>,
}

impl Journal {
    fn record(
        &mut self,
        outcome: Result<Fill, OrderRejection>,
        ledger: &mut Ledger,
        exit_reason: ExitReason,
        bar: &Bar,
        bar_index: usize,
        signal: Signal,
    ) {
        match outcome {
            Ok(fill) => {
                if let Some(mut trade) = ledger.apply_fill(&fill) {
                    trade.exit_reason = exit_reason;
                    self.trades.push(trade);
                }
                self.fills.push(fill);
            }
            Err(reason) => {
                debug!(
                    "bar {bar_index}: {signal:?} rejected ({}): {reason}",
                    exit_reason.name()
                );
                self.rejections.push(RejectedOrder {
                    bar_index,
                    timestamp: bar.timestamp,
                    signal,
                    reason,
                });
            }
        }
    }
}

/// Between-bar checks, then Initialized -> Running on the first bar.
///
/// A run stopped before its first bar stays Initialized and never passes
/// through Running.
fn begin_bar(
    state: &mut RunState,
    control: &RunControl,
    started: Instant,
    bar_index: usize,
) -> Option<TerminationReason> {
    let stop = control.check(started, bar_index);
    if stop.is_none() && bar_index == 0 {
        // Fresh state; Initialized -> Running cannot fail.
        let _ = state.start();
    }
    stop
}

impl SimulationEngine {
    pub fn new(config: EngineConfig) -> Self {
        let execution = ExecutionModel::new(
            config.execution.clone(),
            config.instrument.clone(),
            config.allow_short,
        );
        Self { config, execution }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one deterministic pass over `series`.
    pub fn run<S: Strategy + ?Sized>(
        &self,
        series: &BarSeries,
        strategy: &S,
        control: &RunControl,
    ) -> RunResult {
        let bars = series.bars();
        let started = Instant::now();
        let mut ledger = Ledger::new(self.config.initial_cash, self.config.instrument.clone());
        let mut state = RunState::Initialized;
        let mut equity_curve = Vec::with_capacity(bars.len());
        let mut journal = Journal::default();
        let mut prior_close: Option<f64> = None;
        let mut stop: Option<TerminationReason> = None;

        for (t, bar) in bars.iter().enumerate() {
            if let Some(reason) = begin_bar(&mut state, control, started, t) {
                stop = Some(reason);
                break;
            }

            if let Some(reason) = self.config.exits.triggered(ledger.position(), bar.close) {
                self.exit_position(reason, bar, t, prior_close, &mut ledger, &mut journal);
            }

            let signal = match strategy.on_bar(&bars[..=t], ledger.position()) {
                Ok(signal) => signal,
                Err(err) => {
                    stop = Some(TerminationReason::StrategyError {
                        bar_index: t,
                        detail: err.to_string(),
                    });
                    break;
                }
            };
            if let Err(err) = signal.validate() {
                stop = Some(TerminationReason::InvalidSignal {
                    bar_index: t,
                    detail: err.to_string(),
                });
                break;
            }

            if !signal.is_hold() {
                let outcome = self
                    .build_order(&signal, bar, t, prior_close, &ledger)
                    .and_then(|order| {
                        let held = ledger.position().quantity;
                        self.execution.execute(&order, bar, ledger.cash(), held)
                    });
                journal.record(outcome, &mut ledger, ExitReason::Signal, bar, t, signal);
            }

            if t + 1 == bars.len() && self.config.liquidate_at_end && !ledger.position().is_flat()
            {
                self.exit_position(
                    ExitReason::EndOfSeries,
                    bar,
                    t,
                    prior_close,
                    &mut ledger,
                    &mut journal,
                );
            }

            let point = ledger.mark_to_market(bar.timestamp, bar.close);
            debug_assert!(
                self.config.allow_short || ledger.cash() >= 0.0,
                "cash went negative with shorting disabled: {}",
                ledger.cash()
            );
            equity_curve.push(point);
            prior_close = Some(bar.close);

            if point.equity <= 0.0 {
                stop = Some(TerminationReason::EquityDepleted {
                    bar_index: t,
                    equity: point.equity,
                });
                break;
            }
        }

        match stop {
            Some(reason) => {
                warn!(
                    "{} run terminated early ({}): {:?}",
                    strategy.name(),
                    reason.kind(),
                    reason
                );
                // Running -> TerminatedEarly (or Initialized -> TerminatedEarly).
                let _ = state.terminate(reason);
            }
            None => {
                let _ = state.complete();
            }
        }

        RunResult {
            state,
            initial_cash: self.config.initial_cash,
            bars_processed: equity_curve.len(),
            equity_curve,
            trades: journal.trades,
            fills: journal.fills,
            rejections: journal.rejections,
            final_cash: ledger.cash(),
            final_position: ledger.position().clone(),
            realized_pnl: ledger.realized_pnl(),
            total_commission: ledger.total_commission(),
            total_slippage: ledger.total_slippage(),
        }
    }

    /// Translate a non-Hold signal into a market order at this bar.
    fn build_order(
        &self,
        signal: &Signal,
        bar: &Bar,
        bar_index: usize,
        prior_close: Option<f64>,
        ledger: &Ledger,
    ) -> Result<Order, OrderRejection> {
        let reference = self.execution.reference_price(bar, prior_close)?;
        let instrument = self.execution.instrument();
        let (side, quantity) = match *signal {
            Signal::Buy(size) => {
                let quantity = match size {
                    Some(OrderSize::Quantity(q)) => instrument.round_quantity_down(q),
                    Some(OrderSize::Fraction(f)) => {
                        self.sized_buy(ledger.cash() * f, reference)?
                    }
                    Some(OrderSize::Risk {
                        risk_fraction,
                        stop_distance,
                        max_position_fraction,
                    }) => {
                        let cash = ledger.cash();
                        let at_risk = instrument.round_quantity_down(
                            cash * risk_fraction / (reference * stop_distance),
                        );
                        at_risk.min(self.sized_buy(cash * max_position_fraction, reference)?)
                    }
                    None => self.sized_buy(ledger.cash(), reference)?,
                };
                (OrderSide::Buy, quantity)
            }
            Signal::Sell(size) => {
                let held = ledger.position().quantity.max(0.0);
                let quantity = match size {
                    Some(OrderSize::Quantity(q)) => instrument.round_quantity_down(q),
                    Some(OrderSize::Fraction(f)) => instrument.round_quantity_down(held * f),
                    // Risk sizing is buy-only; validation rejects it earlier.
                    Some(OrderSize::Risk { .. }) => 0.0,
                    None => held,
                };
                (OrderSide::Sell, quantity)
            }
            Signal::Hold => return Err(OrderRejection::EmptyOrder),
        };
        if quantity <= 0.0 {
            return Err(OrderRejection::EmptyOrder);
        }
        Ok(Order {
            side,
            quantity,
            requested_price: reference,
            timestamp: bar.timestamp,
            bar_index,
        })
    }

    /// Whole lots affordable from `budget`; a budget short of one lot is a funds rejection.
    fn sized_buy(&self, budget: f64, reference: f64) -> Result<f64, OrderRejection> {
        let quantity = self.execution.max_buy_quantity(budget, reference);
        if quantity <= 0.0 {
            return Err(OrderRejection::InsufficientFunds {
                required: self.execution.lot_cost(reference),
                available: budget,
            });
        }
        Ok(quantity)
    }

    /// Close the whole open position at this bar through the execution model.
    fn exit_position(
        &self,
        reason: ExitReason,
        bar: &Bar,
        bar_index: usize,
        prior_close: Option<f64>,
        ledger: &mut Ledger,
        journal: &mut Journal,
    ) {
        let quantity = ledger.position().quantity;
        let (side, signal) = if quantity > 0.0 {
            (OrderSide::Sell, Signal::sell_quantity(quantity))
        } else {
            (OrderSide::Buy, Signal::buy_quantity(quantity.abs()))
        };
        let outcome = self
            .execution
            .reference_price(bar, prior_close)
            .and_then(|requested_price| {
                let order = Order {
                    side,
                    quantity: quantity.abs(),
                    requested_price,
                    timestamp: bar.timestamp,
                    bar_index,
                };
                self.execution.execute(&order, bar, ledger.cash(), quantity)
            });
        journal.record(outcome, ledger, reason, bar, bar_index, signal);
    }
}

/// Convenience wrapper: build an engine for `config` and run once.
pub fn run_simulation<S: Strategy + ?Sized>(
    series: &BarSeries,
    strategy: &S,
    config: &EngineConfig,
    control: &RunControl,
) -> RunResult {
    SimulationEngine::new(config.clone()).run(series, strategy, control)
}
