//! Trade: a realized (full or partial) close of open quantity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSide {
    Long,
    Short,
}

/// What closed a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// A strategy signal reduced or closed the position.
    #[default]
    Signal,
    /// The protective stop-loss fired at the bar close.
    StopLoss,
    /// The protective take-profit fired at the bar close.
    TakeProfit,
    /// Open quantity was liquidated on the final bar.
    EndOfSeries,
}

impl ExitReason {
    pub fn name(&self) -> &'static str {
        match self {
            ExitReason::Signal => "signal",
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::EndOfSeries => "end_of_series",
        }
    }
}

/// A closed slice of a position: entry → exit.
///
/// `realized_pnl` follows the ledger formula (exit commission only).
/// `entry_commission` is the share of opening commissions attributed to the
/// closed quantity, so `net_pnl` is the trade's full contribution to equity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,
    pub side: TradeSide,

    // ── Entry ──
    pub entry_bar: usize,
    pub entry_timestamp: DateTime<Utc>,
    /// Average cost basis at the time of the close.
    pub entry_price: f64,

    // ── Exit ──
    pub exit_bar: usize,
    pub exit_timestamp: DateTime<Utc>,
    pub exit_price: f64,

    pub quantity: f64,

    // ── PnL ──
    pub exit_commission: f64,
    pub entry_commission: f64,
    pub realized_pnl: f64,
    pub net_pnl: f64,

    #[serde(default)]
    pub exit_reason: ExitReason,
}

impl Trade {
    pub fn is_winner(&self) -> bool {
        self.net_pnl > 0.0
    }

    pub fn bars_held(&self) -> usize {
        self.exit_bar.saturating_sub(self.entry_bar)
    }

    /// Return on the trade as a fraction of entry notional.
    pub fn return_pct(&self) -> f64 {
        let notional = self.entry_price * self.quantity;
        if notional == 0.0 {
            return 0.0;
        }
        self.net_pnl / notional
    }
}

/// Mark-to-market equity at one bar close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: f64,
}
