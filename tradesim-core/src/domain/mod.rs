//! Domain types for the simulation engine.

pub mod bar;
pub mod fill;
pub mod instrument;
pub mod order;
pub mod position;
pub mod signal;
pub mod trade;

pub use bar::{close_returns, validate_series, Bar, BarError, BarSeries};
pub use fill::Fill;
pub use instrument::Instrument;
pub use order::{Order, OrderSide};
pub use position::Position;
pub use signal::{OrderSize, Signal, SignalError};
pub use trade::{EquityPoint, ExitReason, Trade, TradeSide};
