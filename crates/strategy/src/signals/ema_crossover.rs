use common::models::{Bar, SignalCall, SignalKind, Timeframe, TradeAction};

use super::{atr_series, ema_series, round2, Signal, MIN_BARS};

/// 20/50 EMA crossover with price confirmation.
///
/// Fires only when the cross happens on the latest bar and the close sits
/// beyond the fast EMA. Stop goes under the swing low (over the swing high)
/// of the five bars before the cross; target is an ATR projection.
pub struct EmaCrossover {
    fast: usize,
    slow: usize,
    atr_period: usize,
    atr_target_mult: f64,
}

impl Default for EmaCrossover {
    fn default() -> Self {
        Self {
            fast: 20,
            slow: 50,
            atr_period: 14,
            atr_target_mult: 2.0,
        }
    }
}

impl Signal for EmaCrossover {
    fn kind(&self) -> SignalKind {
        SignalKind::EmaCrossover
    }

    fn evaluate(&self, bars: &[Bar]) -> Option<SignalCall> {
        if bars.len() < MIN_BARS.max(self.slow + 5) {
            return None;
        }

        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let ema_fast = ema_series(&closes, self.fast);
        let ema_slow = ema_series(&closes, self.slow);
        let atr = atr_series(bars, self.atr_period)?;

        let n = bars.len();
        let (prev_fast, prev_slow) = (ema_fast[n - 2], ema_slow[n - 2]);
        let (last_fast, last_slow) = (ema_fast[n - 1], ema_slow[n - 1]);
        let last = &bars[n - 1];

        let bullish_cross =
            prev_fast <= prev_slow && last_fast > last_slow && last.close > last_fast;
        let bearish_cross =
            prev_fast >= prev_slow && last_fast < last_slow && last.close < last_fast;

        if !bullish_cross && !bearish_cross {
            return None;
        }

        let atr_last = atr[n - 1];
        let close = last.close;

        let (action, stop_loss, target) = if bullish_cross {
            let swing_low = bars[n - 6..n - 1]
                .iter()
                .map(|b| b.low)
                .fold(f64::INFINITY, f64::min);
            (
                TradeAction::Buy,
                round2(swing_low - 0.5 * atr_last),
                round2(close + self.atr_target_mult * atr_last),
            )
        } else {
            let swing_high = bars[n - 6..n - 1]
                .iter()
                .map(|b| b.high)
                .fold(f64::NEG_INFINITY, f64::max);
            (
                TradeAction::Sell,
                round2(swing_high + 0.5 * atr_last),
                round2(close - self.atr_target_mult * atr_last),
            )
        };

        // A cross with a >2% EMA gap is as clean as it gets.
        let gap_pct = (last_fast - last_slow).abs() / last_slow;
        let strength = (gap_pct * 50.0).min(1.0);

        Some(SignalCall {
            signal: self.kind(),
            action,
            strength,
            entry: round2(close),
            target,
            stop_loss,
            timeframe: Timeframe::Daily,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::test_support::series;

    #[test]
    fn bullish_cross_on_last_bar_fires_long() {
        let mut closes = vec![100.0; 99];
        closes.push(110.0);
        let bars = series(&closes);

        let call = EmaCrossover::default()
            .evaluate(&bars)
            .expect("cross on the last bar should fire");
        assert_eq!(call.action, TradeAction::Buy);
        assert!(call.stop_loss < call.entry);
        assert!(call.target > call.entry);
        assert!(call.strength > 0.0 && call.strength <= 1.0);
    }

    #[test]
    fn bearish_cross_fires_short() {
        let mut closes = vec![100.0; 99];
        closes.push(90.0);
        let bars = series(&closes);

        let call = EmaCrossover::default().evaluate(&bars).unwrap();
        assert_eq!(call.action, TradeAction::Sell);
        assert!(call.stop_loss > call.entry);
        assert!(call.target < call.entry);
    }

    #[test]
    fn no_cross_means_no_signal() {
        let bars = series(&vec![100.0; 100]);
        assert!(EmaCrossover::default().evaluate(&bars).is_none());
    }

    #[test]
    fn insufficient_history_is_quietly_skipped() {
        let bars = series(&vec![100.0; 59]);
        assert!(EmaCrossover::default().evaluate(&bars).is_none());
    }
}
