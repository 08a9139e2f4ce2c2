use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::{debug, info};

use common::models::{Bar, SignalCall, SignalPerformance, Timeframe, TradeAction};

use crate::signals::{all_signals, Signal, MIN_BARS};

/// A symbol that survived validation, consensus and the reward:risk gate.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub symbol: String,
    pub action: TradeAction,
    pub composite_score: f64,
    pub entry: f64,
    pub target: f64,
    pub stop_loss: f64,
    pub risk_reward: f64,
    pub signals_fired: Vec<SignalCall>,
    pub timeframe: Timeframe,
}

/// Why a symbol produced no candidate. The batch-level counters feed the
/// one-line screen summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolVerdict {
    Candidate,
    InsufficientHistory,
    NoSignal,
    ConsensusConflict,
}

#[derive(Debug, Clone, Default)]
pub struct ScreenCounters {
    pub fetch_errors: usize,
    pub insufficient: usize,
    pub no_signal: usize,
    pub consensus_conflicts: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct ScreenerConfig {
    pub min_risk_reward: f64,
    pub top_n: usize,
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            min_risk_reward: 2.0,
            top_n: 5,
        }
    }
}

/// Runs the detector set over one symbol at a time and ranks the survivors.
/// Pure given (bars, weights): scores depend only on the weight snapshot
/// passed in, so a run is restartable and safely parallel across symbols.
pub struct Screener {
    signals: Vec<Box<dyn Signal>>,
    config: ScreenerConfig,
}

impl Screener {
    pub fn new(config: ScreenerConfig) -> Self {
        Self {
            signals: all_signals(),
            config,
        }
    }

    /// Run every detector over one symbol's series and fold agreeing calls
    /// into a candidate.
    pub fn evaluate_symbol(
        &self,
        symbol: &str,
        bars: &[Bar],
        weights: &HashMap<String, f64>,
    ) -> (SymbolVerdict, Option<Candidate>) {
        if bars.len() < MIN_BARS {
            debug!("{symbol}: insufficient data ({} bars), skipping", bars.len());
            return (SymbolVerdict::InsufficientHistory, None);
        }

        let fired: Vec<SignalCall> = self
            .signals
            .iter()
            .filter_map(|s| s.evaluate(bars))
            .filter(|call| {
                let ok = is_valid(call, self.config.min_risk_reward);
                if !ok {
                    debug!(
                        "{symbol} [{}]: fired but failed validation (R:R={:.2}, strength={:.2})",
                        call.signal,
                        call.risk_reward(),
                        call.strength
                    );
                }
                ok
            })
            .collect();

        if fired.is_empty() {
            return (SymbolVerdict::NoSignal, None);
        }

        let Some(action) = consensus(&fired) else {
            info!("{symbol}: conflicting signal directions, skipping");
            return (SymbolVerdict::ConsensusConflict, None);
        };

        let composite = composite_score(&fired, weights);
        let best = best_levels(&fired);

        let candidate = Candidate {
            symbol: symbol.to_string(),
            action,
            composite_score: composite,
            entry: best.entry,
            target: best.target,
            stop_loss: best.stop_loss,
            risk_reward: best.risk_reward(),
            timeframe: best.timeframe,
            signals_fired: fired.clone(),
        };
        (SymbolVerdict::Candidate, Some(candidate))
    }

    /// Composite desc, then reward:risk desc, then symbol asc: a fully
    /// deterministic ordering, truncated to the configured top N.
    pub fn rank(&self, mut candidates: Vec<Candidate>) -> Vec<Candidate> {
        candidates.sort_by(|a, b| {
            b.composite_score
                .partial_cmp(&a.composite_score)
                .unwrap_or(Ordering::Equal)
                .then(
                    b.risk_reward
                        .partial_cmp(&a.risk_reward)
                        .unwrap_or(Ordering::Equal),
                )
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        candidates.truncate(self.config.top_n);
        candidates
    }

    pub fn log_summary(&self, scanned: usize, found: usize, counters: &ScreenCounters) {
        info!(
            "Screener found {found} setups from {scanned} symbols — fetch_errors={}, \
             insufficient_bars={}, no_signal={}, consensus_conflict={}",
            counters.fetch_errors,
            counters.insufficient,
            counters.no_signal,
            counters.consensus_conflicts
        );
    }
}

/// A fired call must carry real conviction and clear the reward:risk gate.
pub fn is_valid(call: &SignalCall, min_risk_reward: f64) -> bool {
    call.strength > 0.0 && call.risk_reward() >= min_risk_reward
}

/// The consensus rule: every fired signal must agree on direction. Partial
/// agreement never partially counts; any long/short split discards the
/// symbol.
pub fn consensus(fired: &[SignalCall]) -> Option<TradeAction> {
    let first = fired.first()?.action;
    if fired.iter().all(|c| c.action == first) {
        Some(first)
    } else {
        None
    }
}

/// Weighted average of the fired signals' strengths. Unknown signals weigh
/// the default 1.0.
pub fn composite_score(fired: &[SignalCall], weights: &HashMap<String, f64>) -> f64 {
    let weight_of = |call: &SignalCall| {
        weights
            .get(call.signal.name())
            .copied()
            .unwrap_or(SignalPerformance::DEFAULT_WEIGHT)
    };
    let total: f64 = fired.iter().map(weight_of).sum();
    if total <= 0.0 {
        return 0.0;
    }
    fired.iter().map(|c| c.strength * weight_of(c)).sum::<f64>() / total
}

/// Price levels come from the highest-strength fired signal; on a tie the
/// earlier detector (fixed evaluation order) wins.
pub fn best_levels(fired: &[SignalCall]) -> &SignalCall {
    fired
        .iter()
        .skip(1)
        .fold(&fired[0], |best, c| if c.strength > best.strength { c } else { best })
}
