use common::models::{Bar, SignalCall, SignalKind, Timeframe, TradeAction};

use super::{atr_series, pivot_highs, pivot_lows, round2, sma_series, Signal, MIN_BARS};

/// Two levels within this fraction are merged into one.
const LEVEL_MERGE_THRESHOLD: f64 = 0.005;
/// Breakout candle must close this fraction beyond the level.
const BREAKOUT_THRESHOLD: f64 = 0.003;
/// Volume must be at least this multiple of its 20-bar average.
const MIN_VOLUME_RATIO: f64 = 1.3;

/// Support/resistance breakout with volume confirmation.
///
/// Levels come from clustered pivot highs/lows over the lookback window. A
/// close beyond a level with above-average volume targets the next level
/// out, or an ATR projection when the breakout clears every known level.
pub struct SupportResistance {
    lookback: usize,
    pivot_window: usize,
    atr_target_mult: f64,
}

impl Default for SupportResistance {
    fn default() -> Self {
        Self {
            lookback: 60,
            pivot_window: 5,
            atr_target_mult: 2.0,
        }
    }
}

/// Merge nearby price levels, averaging members of a cluster.
fn cluster_levels(mut levels: Vec<f64>, threshold: f64) -> Vec<f64> {
    if levels.is_empty() {
        return levels;
    }
    levels.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mut clusters = vec![levels[0]];
    for level in levels.into_iter().skip(1) {
        let last = clusters.last_mut().unwrap();
        if (level - *last) / *last > threshold {
            clusters.push(level);
        } else {
            *last = (*last + level) / 2.0;
        }
    }
    clusters
}

impl Signal for SupportResistance {
    fn kind(&self) -> SignalKind {
        SignalKind::SupportResistance
    }

    fn evaluate(&self, bars: &[Bar]) -> Option<SignalCall> {
        if bars.len() < MIN_BARS.max(self.lookback + 20) {
            return None;
        }

        let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();
        let vol_ma = sma_series(&volumes, 20);
        let atr = atr_series(bars, 14)?;

        let n = bars.len();
        let last = &bars[n - 1];
        let close = last.close;
        let atr_last = atr[n - 1];
        let vol_ratio = if vol_ma[n - 1] > 0.0 {
            last.volume / vol_ma[n - 1]
        } else {
            0.0
        };

        let recent = &bars[n - self.lookback..];
        let highs: Vec<f64> = recent.iter().map(|b| b.high).collect();
        let lows: Vec<f64> = recent.iter().map(|b| b.low).collect();

        let resistance_levels = cluster_levels(
            pivot_highs(&highs, self.pivot_window)
                .into_iter()
                .map(|i| highs[i])
                .collect(),
            LEVEL_MERGE_THRESHOLD,
        );
        let support_levels = cluster_levels(
            pivot_lows(&lows, self.pivot_window)
                .into_iter()
                .map(|i| lows[i])
                .collect(),
            LEVEL_MERGE_THRESHOLD,
        );

        // Breakout above resistance: strongest (highest) broken level wins.
        for &resistance in resistance_levels.iter().rev() {
            if close > resistance * (1.0 + BREAKOUT_THRESHOLD) && vol_ratio >= MIN_VOLUME_RATIO {
                let target = resistance_levels
                    .iter()
                    .copied()
                    .filter(|&r| r > close)
                    .fold(f64::INFINITY, f64::min);
                let target = if target.is_finite() {
                    target
                } else {
                    close + self.atr_target_mult * atr_last
                };
                return Some(SignalCall {
                    signal: self.kind(),
                    action: TradeAction::Buy,
                    strength: ((vol_ratio - MIN_VOLUME_RATIO) / 2.0 + 0.5).min(1.0),
                    entry: round2(close),
                    target: round2(target),
                    stop_loss: round2(resistance - 0.5 * atr_last),
                    timeframe: Timeframe::Daily,
                });
            }
        }

        // Breakdown below support: lowest broken level wins.
        for &support in &support_levels {
            if close < support * (1.0 - BREAKOUT_THRESHOLD) && vol_ratio >= MIN_VOLUME_RATIO {
                let target = support_levels
                    .iter()
                    .copied()
                    .filter(|&s| s < close)
                    .fold(f64::NEG_INFINITY, f64::max);
                let target = if target.is_finite() {
                    target
                } else {
                    close - self.atr_target_mult * atr_last
                };
                return Some(SignalCall {
                    signal: self.kind(),
                    action: TradeAction::Sell,
                    strength: ((vol_ratio - MIN_VOLUME_RATIO) / 2.0 + 0.5).min(1.0),
                    entry: round2(close),
                    target: round2(target),
                    stop_loss: round2(support + 0.5 * atr_last),
                    timeframe: Timeframe::Daily,
                });
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::test_support::{bar, series};

    /// Triangle wave between 95 and 105: clean pivot highs at 105 and lows
    /// at 95, then a high-volume close above the ceiling.
    fn range_then_breakout() -> Vec<common::models::Bar> {
        let mut closes = Vec::new();
        for cycle in 0..5 {
            for step in 0..10 {
                closes.push(95.0 + step as f64); // 95..104
            }
            for step in 0..10 {
                closes.push(105.0 - step as f64); // 105..96
            }
            let _ = cycle;
        }
        let mut bars = series(&closes);
        // Breakout candle: closes well above the 106-ish resistance band on
        // double volume.
        bars.push(bar(bars.len(), 104.0, 108.5, 2_400_000.0));
        bars
    }

    #[test]
    fn resistance_breakout_fires_long() {
        let bars = range_then_breakout();

        let call = SupportResistance::default()
            .evaluate(&bars)
            .expect("high-volume close above resistance should fire");
        assert_eq!(call.action, TradeAction::Buy);
        assert!(call.stop_loss < call.entry);
        assert!(call.target > call.entry);
        assert!(call.strength >= 0.5 && call.strength <= 1.0);
    }

    #[test]
    fn breakout_without_volume_stays_quiet() {
        let mut bars = range_then_breakout();
        let last = bars.len() - 1;
        bars[last].volume = 1_000_000.0; // same as every other bar
        assert!(SupportResistance::default().evaluate(&bars).is_none());
    }

    #[test]
    fn range_bound_close_stays_quiet() {
        let mut bars = range_then_breakout();
        bars.pop();
        assert!(SupportResistance::default().evaluate(&bars).is_none());
    }

    #[test]
    fn insufficient_history_is_quietly_skipped() {
        let bars = series(&vec![100.0; 70]);
        assert!(SupportResistance::default().evaluate(&bars).is_none());
    }

    #[test]
    fn cluster_levels_merges_nearby() {
        let clustered = cluster_levels(vec![100.0, 100.2, 105.0], 0.005);
        assert_eq!(clustered.len(), 2);
        assert!((clustered[0] - 100.1).abs() < 1e-9);
        assert_eq!(clustered[1], 105.0);
    }
}
