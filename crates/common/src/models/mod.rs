pub mod bar;
pub mod holding;
pub mod journal;
pub mod performance;
pub mod position;
pub mod signal;
pub mod suggestion;

pub use bar::{Bar, Quote};
pub use holding::BrokerHolding;
pub use journal::DailyJournal;
pub use performance::SignalPerformance;
pub use position::{ExitReason, Position, PositionInsert, PositionStatus};
pub use signal::{SignalCall, SignalKind, Timeframe, TradeAction};
pub use suggestion::{Suggestion, SuggestionInsert, SuggestionStatus};
