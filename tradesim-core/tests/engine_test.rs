//! Integration tests for the simulation engine.
//!
//! Tests:
//! 1. Ledger scenarios: buy then sell with flat commission
//! 2. Rejections: insufficient funds, zero volume, oversell
//! 3. Hold-only runs keep equity flat
//! 4. Early termination: invalid signal, strategy error, cancel, timeout, ruin
//! 5. Determinism and no-lookahead
//! 6. Protective exits and risk sizing

use std::sync::Mutex;
use std::time::Duration as StdDuration;

use chrono::{Duration, TimeZone, Utc};
use tradesim_core::domain::{Bar, BarSeries, ExitReason, OrderSize, Position, Signal};
use tradesim_core::engine::{
    run_simulation, CancelToken, EngineConfig, ProtectiveExits, RunControl, RunState,
    TerminationReason,
};
use tradesim_core::execution::{
    CommissionModel, ExecutionConfig, OrderRejection, SlippageModel, ZeroVolumePolicy,
};
use tradesim_core::strategy::{BuyAndHold, HoldStrategy, MaCrossover, Strategy, StrategyError};

// ── Helpers ──────────────────────────────────────────────────────────

fn bar(day: i64, close: f64, volume: f64) -> Bar {
    let base = Utc.with_ymd_and_hms(2024, 1, 2, 21, 0, 0).unwrap();
    Bar {
        timestamp: base + Duration::days(day),
        open: close,
        high: close,
        low: close,
        close,
        volume,
    }
}

fn series(closes: &[f64]) -> BarSeries {
    BarSeries::new(
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| bar(i as i64, c, 1_000_000.0))
            .collect(),
    )
    .unwrap()
}

fn wavy_series(n: usize) -> BarSeries {
    let closes: Vec<f64> = (0..n)
        .map(|i| 100.0 + (i as f64 * 0.15).sin() * 12.0 + i as f64 * 0.05)
        .collect();
    series(&closes)
}

fn flat_fee(cash: f64) -> EngineConfig {
    EngineConfig {
        initial_cash: cash,
        execution: ExecutionConfig {
            slippage: SlippageModel::none(),
            commission: CommissionModel::FlatFee { amount: 1.0 },
            zero_volume: ZeroVolumePolicy::Reject,
        },
        liquidate_at_end: false,
        ..EngineConfig::default()
    }
}

/// Replays a fixed signal per bar index, Hold past the end.
struct Scripted(Vec<Signal>);

impl Strategy for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn on_bar(&self, history: &[Bar], _position: &Position) -> Result<Signal, StrategyError> {
        Ok(self.0.get(history.len() - 1).copied().unwrap_or_default())
    }
}

// ── 1. Ledger scenarios ──────────────────────────────────────────────

#[test]
fn buy_100_at_50_leaves_4999_cash() {
    let strat = Scripted(vec![Signal::buy_quantity(100.0)]);
    let result = run_simulation(
        &series(&[50.0]),
        &strat,
        &flat_fee(10_000.0),
        &RunControl::unbounded(),
    );
    assert!(result.is_completed());
    assert_eq!(result.final_cash, 4_999.0);
    assert_eq!(result.final_position.quantity, 100.0);
    assert_eq!(result.final_position.avg_cost, Some(50.0));
    assert_eq!(result.fills.len(), 1);
    // Equity at the close: 4999 + 100 * 50
    assert_eq!(result.final_equity(), 9_999.0);
}

#[test]
fn sell_100_at_60_realizes_999() {
    let strat = Scripted(vec![Signal::buy_quantity(100.0), Signal::sell_quantity(100.0)]);
    let result = run_simulation(
        &series(&[50.0, 60.0]),
        &strat,
        &flat_fee(10_000.0),
        &RunControl::unbounded(),
    );
    assert_eq!(result.final_cash, 10_998.0);
    assert_eq!(result.final_position.quantity, 0.0);
    assert_eq!(result.final_position.avg_cost, None);
    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.trades[0].realized_pnl, 999.0);
    assert_eq!(result.realized_pnl, 999.0);
    assert_eq!(result.total_commission, 2.0);
}

// ── 2. Rejections ────────────────────────────────────────────────────

#[test]
fn insufficient_funds_rejected_state_unchanged() {
    let strat = Scripted(vec![Signal::buy_quantity(300.0)]);
    let result = run_simulation(
        &series(&[50.0, 51.0]),
        &strat,
        &flat_fee(10_000.0),
        &RunControl::unbounded(),
    );
    assert!(result.is_completed());
    assert!(result.fills.is_empty());
    assert_eq!(result.final_cash, 10_000.0);
    assert!(result.final_position.is_flat());
    assert_eq!(result.rejections.len(), 1);
    assert_eq!(
        result.rejections[0].reason,
        OrderRejection::InsufficientFunds {
            required: 15_001.0,
            available: 10_000.0,
        }
    );
}

#[test]
fn oversell_rejected_and_run_continues() {
    let strat = Scripted(vec![
        Signal::buy_quantity(10.0),
        Signal::sell_quantity(20.0),
        Signal::sell_quantity(10.0),
    ]);
    let result = run_simulation(
        &series(&[50.0, 50.0, 50.0]),
        &strat,
        &flat_fee(10_000.0),
        &RunControl::unbounded(),
    );
    assert!(result.is_completed());
    assert_eq!(result.fills.len(), 2);
    assert!(matches!(
        result.rejections[0].reason,
        OrderRejection::InvalidSellQuantity { .. }
    ));
    assert!(result.final_position.is_flat());
}

#[test]
fn fractional_buy_too_small_for_one_lot() {
    let strat = Scripted(vec![Signal::Buy(Some(OrderSize::Fraction(0.001)))]);
    let result = run_simulation(
        &series(&[50.0]),
        &strat,
        &flat_fee(10_000.0),
        &RunControl::unbounded(),
    );
    assert!(matches!(
        result.rejections[0].reason,
        OrderRejection::InsufficientFunds { .. }
    ));
}

#[test]
fn zero_volume_bar_follows_policy() {
    let bars = BarSeries::new(vec![bar(0, 50.0, 1_000.0), bar(1, 52.0, 0.0)]).unwrap();
    let strat = Scripted(vec![Signal::Hold, Signal::buy_quantity(10.0)]);

    let rejecting = run_simulation(&bars, &strat, &flat_fee(10_000.0), &RunControl::unbounded());
    assert_eq!(rejecting.rejections[0].reason, OrderRejection::ZeroVolume);

    let mut config = flat_fee(10_000.0);
    config.execution.zero_volume = ZeroVolumePolicy::FillAtPriorClose;
    let frozen = run_simulation(&bars, &strat, &config, &RunControl::unbounded());
    assert!(frozen.rejections.is_empty());
    assert_eq!(frozen.fills[0].price, 50.0);
}

// ── 3. Hold-only ─────────────────────────────────────────────────────

#[test]
fn hold_only_keeps_initial_equity_everywhere() {
    let result = run_simulation(
        &wavy_series(120),
        &HoldStrategy,
        &EngineConfig::new(25_000.0),
        &RunControl::unbounded(),
    );
    assert!(result.is_completed());
    assert_eq!(result.equity_curve.len(), 120);
    assert!(result.equity_curve.iter().all(|p| p.equity == 25_000.0));
    assert_eq!(result.equity_values()[0], 25_000.0);
}

#[test]
fn equity_identity_at_end() {
    let mut config = EngineConfig::new(50_000.0);
    config.liquidate_at_end = false;
    let bars = wavy_series(60);
    let result = run_simulation(&bars, &BuyAndHold, &config, &RunControl::unbounded());
    let close = bars[bars.len() - 1].close;
    let expected = result.final_cash + result.final_position.quantity * close;
    assert!((result.final_equity() - expected).abs() < 0.01);
    assert!(result.final_cash >= 0.0);
}

// ── 4. Early termination ─────────────────────────────────────────────

#[test]
fn invalid_signal_terminates_run() {
    let strat = Scripted(vec![Signal::Hold, Signal::buy_quantity(f64::NAN)]);
    let result = run_simulation(
        &series(&[50.0, 51.0, 52.0]),
        &strat,
        &flat_fee(1_000.0),
        &RunControl::unbounded(),
    );
    match result.termination() {
        Some(TerminationReason::InvalidSignal { bar_index, .. }) => assert_eq!(*bar_index, 1),
        other => panic!("expected InvalidSignal, got {other:?}"),
    }
    assert_eq!(result.bars_processed, 1);
}

struct Failing;

impl Strategy for Failing {
    fn name(&self) -> &str {
        "failing"
    }

    fn on_bar(&self, history: &[Bar], _position: &Position) -> Result<Signal, StrategyError> {
        if history.len() == 3 {
            return Err(StrategyError::new("failing", "indicator blew up"));
        }
        Ok(Signal::Hold)
    }
}

#[test]
fn strategy_error_terminates_with_detail() {
    let result = run_simulation(
        &wavy_series(10),
        &Failing,
        &flat_fee(1_000.0),
        &RunControl::unbounded(),
    );
    match result.termination() {
        Some(TerminationReason::StrategyError { bar_index, detail }) => {
            assert_eq!(*bar_index, 2);
            assert!(detail.contains("indicator blew up"));
        }
        other => panic!("expected StrategyError, got {other:?}"),
    }
    assert_eq!(result.equity_curve.len(), 2);
}

#[test]
fn cancelled_run_reports_partial_results() {
    let token = CancelToken::new();
    token.cancel();
    let control = RunControl::unbounded().with_cancel(token);
    let result = run_simulation(&wavy_series(10), &HoldStrategy, &flat_fee(1_000.0), &control);
    assert_eq!(
        result.state,
        RunState::TerminatedEarly {
            reason: TerminationReason::Cancelled { bars_processed: 0 }
        }
    );
    assert_eq!(result.final_equity(), 1_000.0);
}

/// Holds, and requests cancellation while processing bar `at`.
struct CancelAt {
    at: usize,
    token: CancelToken,
}

impl Strategy for CancelAt {
    fn name(&self) -> &str {
        "cancel_at"
    }

    fn on_bar(&self, history: &[Bar], _position: &Position) -> Result<Signal, StrategyError> {
        if history.len() - 1 == self.at {
            self.token.cancel();
        }
        Ok(Signal::Hold)
    }
}

#[test]
fn cancel_mid_run_keeps_bars_already_processed() {
    let token = CancelToken::new();
    let strat = CancelAt {
        at: 4,
        token: token.clone(),
    };
    let control = RunControl::unbounded().with_cancel(token);
    let result = run_simulation(&wavy_series(10), &strat, &flat_fee(1_000.0), &control);
    // Bar 4 finishes; the flag is seen before bar 5.
    assert_eq!(
        result.state,
        RunState::TerminatedEarly {
            reason: TerminationReason::Cancelled { bars_processed: 5 }
        }
    );
    assert_eq!(result.equity_curve.len(), 5);
    assert_eq!(result.bars_processed, 5);
}

#[test]
fn zero_timeout_marks_timeout_kind() {
    let control = RunControl::with_timeout(StdDuration::ZERO);
    let result = run_simulation(&wavy_series(10), &HoldStrategy, &flat_fee(1_000.0), &control);
    let reason = result.termination().unwrap();
    assert!(reason.is_timeout());
    assert!(reason.is_failure());
}

#[test]
fn short_squeeze_depletes_equity() {
    let mut config = flat_fee(1_000.0);
    config.allow_short = true;
    let strat = Scripted(vec![Signal::sell_quantity(100.0)]);
    let result = run_simulation(
        &series(&[50.0, 55.0, 70.0, 200.0]),
        &strat,
        &config,
        &RunControl::unbounded(),
    );
    match result.termination() {
        Some(TerminationReason::EquityDepleted { bar_index, equity }) => {
            assert_eq!(*bar_index, 2);
            assert!(*equity <= 0.0);
        }
        other => panic!("expected EquityDepleted, got {other:?}"),
    }
    assert!(!result.termination().unwrap().is_failure());
}

// ── 5. Determinism / lookahead ───────────────────────────────────────

#[test]
fn identical_inputs_identical_outputs() {
    let bars = wavy_series(250);
    let strat = MaCrossover::new(5, 20).unwrap();
    let config = EngineConfig::new(100_000.0);
    let a = run_simulation(&bars, &strat, &config, &RunControl::unbounded());
    let b = run_simulation(&bars, &strat, &config, &RunControl::unbounded());
    assert!(!a.trades.is_empty());
    assert_eq!(a, b);
}

/// Records the length and last timestamp of every history it is shown.
struct Recorder(Mutex<Vec<(usize, chrono::DateTime<Utc>)>>);

impl Strategy for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    fn on_bar(&self, history: &[Bar], _position: &Position) -> Result<Signal, StrategyError> {
        let last = history[history.len() - 1].timestamp;
        self.0.lock().unwrap().push((history.len(), last));
        Ok(Signal::Hold)
    }
}

#[test]
fn strategy_never_sees_future_bars() {
    let bars = wavy_series(15);
    let recorder = Recorder(Mutex::new(Vec::new()));
    run_simulation(&bars, &recorder, &flat_fee(1_000.0), &RunControl::unbounded());
    let seen = recorder.0.into_inner().unwrap();
    assert_eq!(seen.len(), 15);
    for (t, (len, last)) in seen.into_iter().enumerate() {
        assert_eq!(len, t + 1);
        assert_eq!(last, bars[t].timestamp);
    }
}

// ── Protective exits and risk sizing ─────────────────────────────────

#[test]
fn short_stop_loss_buys_back_on_rally() {
    let mut config = flat_fee(10_000.0);
    config.allow_short = true;
    config.exits = ProtectiveExits::new(Some(0.10), Some(0.20));
    let strat = Scripted(vec![Signal::sell_quantity(10.0)]);
    let result = run_simulation(
        &series(&[100.0, 105.0, 112.0, 120.0]),
        &strat,
        &config,
        &RunControl::unbounded(),
    );
    assert!(result.is_completed());
    assert!(result.final_position.is_flat());
    assert_eq!(result.trades.len(), 1);
    assert_eq!(result.trades[0].exit_reason, ExitReason::StopLoss);
    assert_eq!(result.trades[0].exit_bar, 2);
    assert_eq!(result.trades[0].realized_pnl, -121.0);
}

#[test]
fn exit_reasons_cover_every_close() {
    let mut config = flat_fee(10_000.0);
    config.liquidate_at_end = true;
    config.exits = ProtectiveExits::new(None, Some(0.10));
    let strat = Scripted(vec![
        Signal::buy_quantity(10.0),
        Signal::Hold,
        Signal::buy_quantity(10.0),
        Signal::sell_all(),
        Signal::buy_quantity(10.0),
    ]);
    let result = run_simulation(
        &series(&[100.0, 111.0, 111.0, 112.0, 112.0, 113.0]),
        &strat,
        &config,
        &RunControl::unbounded(),
    );
    let reasons: Vec<ExitReason> = result.trades.iter().map(|t| t.exit_reason).collect();
    assert_eq!(
        reasons,
        vec![
            ExitReason::TakeProfit,
            ExitReason::Signal,
            ExitReason::EndOfSeries
        ]
    );
}

#[test]
fn risk_sized_buy_with_slippage_stays_affordable() {
    let mut config = flat_fee(5_000.0);
    config.execution.slippage = SlippageModel::FixedBps { bps: 50.0 };
    let strat = Scripted(vec![Signal::buy_risk(0.02)]);
    let result = run_simulation(&series(&[40.0, 41.0]), &strat, &config, &RunControl::unbounded());
    assert!(result.rejections.is_empty());
    assert!(result.final_cash >= 0.0);
    assert!(result.final_position.quantity > 0.0);
    assert!(result.final_position.quantity * 40.0 <= 500.0);
}

