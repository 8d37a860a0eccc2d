//! Engine configuration, the run state machine, and run result types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{EquityPoint, ExitReason, Fill, Instrument, Position, Signal, Trade};
use crate::execution::{ExecutionConfig, OrderRejection};

/// Immutable configuration for one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub initial_cash: f64,
    /// Permit sells beyond the held quantity.
    pub allow_short: bool,
    pub instrument: Instrument,
    pub execution: ExecutionConfig,
    /// Close any open quantity at the final bar's close so the last trade is realized.
    pub liquidate_at_end: bool,
    pub exits: ProtectiveExits,
}

/// Stop-loss and take-profit levels, as fractions of the average cost.
///
/// Checked at each bar's close before the strategy is consulted. A triggered
/// exit closes the whole position through the execution model.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectiveExits {
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
}

impl ProtectiveExits {
    pub fn new(stop_loss: Option<f64>, take_profit: Option<f64>) -> Self {
        Self {
            stop_loss,
            take_profit,
        }
    }

    /// The exit `close` triggers for `position`. The stop wins if both fire.
    pub fn triggered(&self, position: &Position, close: f64) -> Option<ExitReason> {
        let cost = position.avg_cost?;
        if position.is_flat() {
            return None;
        }
        // Signed move in the position's favor.
        let gain = if position.is_long() {
            (close - cost) / cost
        } else {
            (cost - close) / cost
        };
        if self.stop_loss.is_some_and(|stop| gain <= -stop) {
            Some(ExitReason::StopLoss)
        } else if self.take_profit.is_some_and(|target| gain >= target) {
            Some(ExitReason::TakeProfit)
        } else {
            None
        }
    }
}

impl EngineConfig {
    pub fn new(initial_cash: f64) -> Self {
        Self {
            initial_cash,
            ..Self::default()
        }
    }

    /// Same config with a different execution friction (cost jitter).
    pub fn with_execution(&self, execution: ExecutionConfig) -> Self {
        Self {
            execution,
            ..self.clone()
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_cash: 100_000.0,
            allow_short: false,
            instrument: Instrument::default(),
            execution: ExecutionConfig::default(),
            liquidate_at_end: true,
            exits: ProtectiveExits::default(),
        }
    }
}

/// Why a run stopped before the end of the bar series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerminationReason {
    /// Equity fell to zero or below after marking to market.
    EquityDepleted { bar_index: usize, equity: f64 },
    /// The strategy returned a malformed signal.
    InvalidSignal { bar_index: usize, detail: String },
    /// The strategy reported a fatal error.
    StrategyError { bar_index: usize, detail: String },
    /// Cancellation was requested; results are partial.
    Cancelled { bars_processed: usize },
    /// The per-run wall-clock budget ran out; results are partial.
    Timeout {
        bars_processed: usize,
        elapsed_ms: u64,
    },
    /// The run's bar series could not be built or validated.
    InvalidSeries { detail: String },
}

impl TerminationReason {
    /// Stable name for grouping in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            TerminationReason::EquityDepleted { .. } => "equity_depleted",
            TerminationReason::InvalidSignal { .. } => "invalid_signal",
            TerminationReason::StrategyError { .. } => "strategy_error",
            TerminationReason::Cancelled { .. } => "cancelled",
            TerminationReason::Timeout { .. } => "timeout",
            TerminationReason::InvalidSeries { .. } => "invalid_series",
        }
    }

    /// Ruin is a legitimate outcome; everything else means the run failed.
    pub fn is_failure(&self) -> bool {
        !matches!(self, TerminationReason::EquityDepleted { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, TerminationReason::Timeout { .. })
    }
}

/// SimulationRun lifecycle. Transitions only move forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Initialized,
    Running,
    Completed,
    TerminatedEarly { reason: TerminationReason },
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("illegal run state transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: &'static str,
    pub to: &'static str,
}

impl RunState {
    pub fn name(&self) -> &'static str {
        match self {
            RunState::Initialized => "initialized",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::TerminatedEarly { .. } => "terminated_early",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::TerminatedEarly { .. })
    }

    /// Initialized → Running.
    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.advance(RunState::Running)
    }

    /// Running → Completed.
    pub fn complete(&mut self) -> Result<(), TransitionError> {
        self.advance(RunState::Completed)
    }

    /// Running → TerminatedEarly, or Initialized → TerminatedEarly for a run
    /// that never got to its first bar.
    pub fn terminate(&mut self, reason: TerminationReason) -> Result<(), TransitionError> {
        self.advance(RunState::TerminatedEarly { reason })
    }

    fn advance(&mut self, next: RunState) -> Result<(), TransitionError> {
        let allowed = matches!(
            (&*self, &next),
            (RunState::Initialized, RunState::Running)
                | (RunState::Initialized, RunState::TerminatedEarly { .. })
                | (RunState::Running, RunState::Completed)
                | (RunState::Running, RunState::TerminatedEarly { .. })
        );
        if !allowed {
            return Err(TransitionError {
                from: self.name(),
                to: next.name(),
            });
        }
        *self = next;
        Ok(())
    }
}

/// An order that was refused. The run continues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedOrder {
    pub bar_index: usize,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub signal: Signal,
    pub reason: OrderRejection,
}

/// Everything one pass over a bar series produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub state: RunState,
    pub initial_cash: f64,
    /// One point per processed bar, marked at the bar close.
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<Trade>,
    pub fills: Vec<Fill>,
    pub rejections: Vec<RejectedOrder>,
    pub final_cash: f64,
    pub final_position: Position,
    pub realized_pnl: f64,
    pub total_commission: f64,
    pub total_slippage: f64,
    pub bars_processed: usize,
}

impl RunResult {
    /// A run that ended before processing any bar.
    pub fn aborted(config: &EngineConfig, reason: TerminationReason) -> Self {
        let mut state = RunState::Initialized;
        // Initialized -> TerminatedEarly is always legal.
        let _ = state.terminate(reason);
        Self {
            state,
            initial_cash: config.initial_cash,
            equity_curve: Vec::new(),
            trades: Vec::new(),
            fills: Vec::new(),
            rejections: Vec::new(),
            final_cash: config.initial_cash,
            final_position: Position::flat(config.instrument.symbol.clone()),
            realized_pnl: 0.0,
            total_commission: 0.0,
            total_slippage: 0.0,
            bars_processed: 0,
        }
    }

    pub fn final_equity(&self) -> f64 {
        self.equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(self.initial_cash)
    }

    /// Equity values, prefixed with the initial cash so returns include bar 0.
    pub fn equity_values(&self) -> Vec<f64> {
        std::iter::once(self.initial_cash)
            .chain(self.equity_curve.iter().map(|p| p.equity))
            .collect()
    }

    pub fn is_completed(&self) -> bool {
        self.state == RunState::Completed
    }

    pub fn termination(&self) -> Option<&TerminationReason> {
        match &self.state {
            RunState::TerminatedEarly { reason } => Some(reason),
            _ => None,
        }
    }
}
