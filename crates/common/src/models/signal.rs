use serde::{Deserialize, Serialize};
use std::fmt;

/// Trade direction. Stored as TEXT ("BUY"/"SELL") and used verbatim in
/// notifications, matching broker terminology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Buy,
    Sell,
}

impl TradeAction {
    /// +1 for longs, -1 for shorts. P&L = (exit - entry) * qty * sign.
    pub fn sign(self) -> f64 {
        match self {
            TradeAction::Buy => 1.0,
            TradeAction::Sell => -1.0,
        }
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeAction::Buy => write!(f, "BUY"),
            TradeAction::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Timeframe {
    Daily,
    Weekly,
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timeframe::Daily => write!(f, "daily"),
            Timeframe::Weekly => write!(f, "weekly"),
        }
    }
}

/// The four swing detectors. Performance rows and weight maps are keyed by
/// `name()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    EmaCrossover,
    RsiDivergence,
    SupportResistance,
    VolumeBreakout,
}

impl SignalKind {
    pub const ALL: [SignalKind; 4] = [
        SignalKind::EmaCrossover,
        SignalKind::RsiDivergence,
        SignalKind::SupportResistance,
        SignalKind::VolumeBreakout,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SignalKind::EmaCrossover => "ema_crossover",
            SignalKind::RsiDivergence => "rsi_divergence",
            SignalKind::SupportResistance => "support_resistance",
            SignalKind::VolumeBreakout => "volume_breakout",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One detector's directional call for one symbol. Never persisted on its
/// own; the screener folds fired calls into a suggestion's `signals_fired`
/// JSON column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalCall {
    pub signal: SignalKind,
    pub action: TradeAction,
    /// Conviction in [0, 1].
    pub strength: f64,
    pub entry: f64,
    pub target: f64,
    pub stop_loss: f64,
    pub timeframe: Timeframe,
}

impl SignalCall {
    /// Reward:risk of the proposed levels. 0.0 when the stop sits on the
    /// wrong side of entry (degenerate setup).
    pub fn risk_reward(&self) -> f64 {
        let (reward, risk) = match self.action {
            TradeAction::Buy => (self.target - self.entry, self.entry - self.stop_loss),
            TradeAction::Sell => (self.entry - self.target, self.stop_loss - self.entry),
        };
        if risk > 0.0 { reward / risk } else { 0.0 }
    }
}
