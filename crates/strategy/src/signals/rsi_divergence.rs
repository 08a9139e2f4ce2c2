use common::models::{Bar, SignalCall, SignalKind, Timeframe, TradeAction};

use super::{atr_series, pivot_highs, pivot_lows, round2, rsi_series, Signal, MIN_BARS};

/// RSI divergence on daily pivots.
///
/// Bullish: price prints a lower low while RSI prints a higher low with the
/// RSI still in its oversold neighbourhood. Bearish is the mirror image.
/// Compares the last two swing pivots inside the lookback window.
pub struct RsiDivergence {
    rsi_period: usize,
    lookback: usize,
    pivot_window: usize,
    oversold: f64,
    overbought: f64,
    atr_target_mult: f64,
}

impl Default for RsiDivergence {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            lookback: 25,
            pivot_window: 3,
            oversold: 40.0,
            overbought: 60.0,
            atr_target_mult: 2.5,
        }
    }
}

impl RsiDivergence {
    fn bullish(
        &self,
        bars: &[Bar],
        rsi: &[f64],
        atr_last: f64,
        start: usize,
    ) -> Option<SignalCall> {
        let lows: Vec<f64> = bars[start..].iter().map(|b| b.low).collect();
        let pivots = pivot_lows(&lows, self.pivot_window);
        if pivots.len() < 2 {
            return None;
        }
        let (p1, p2) = (start + pivots[pivots.len() - 2], start + pivots[pivots.len() - 1]);

        let price_made_lower_low = bars[p2].low < bars[p1].low;
        let rsi_made_higher_low = rsi[p2] > rsi[p1];
        let rsi_in_zone = rsi[p2] < self.oversold + 15.0;
        if !(price_made_lower_low && rsi_made_higher_low && rsi_in_zone) {
            return None;
        }

        let close = bars[bars.len() - 1].close;
        Some(SignalCall {
            signal: SignalKind::RsiDivergence,
            action: TradeAction::Buy,
            strength: ((rsi[p2] - rsi[p1]) / 15.0).min(1.0),
            entry: round2(close),
            target: round2(close + self.atr_target_mult * atr_last),
            stop_loss: round2(bars[p2].low - 0.3 * atr_last),
            timeframe: Timeframe::Daily,
        })
    }

    fn bearish(
        &self,
        bars: &[Bar],
        rsi: &[f64],
        atr_last: f64,
        start: usize,
    ) -> Option<SignalCall> {
        let highs: Vec<f64> = bars[start..].iter().map(|b| b.high).collect();
        let pivots = pivot_highs(&highs, self.pivot_window);
        if pivots.len() < 2 {
            return None;
        }
        let (p1, p2) = (start + pivots[pivots.len() - 2], start + pivots[pivots.len() - 1]);

        let price_made_higher_high = bars[p2].high > bars[p1].high;
        let rsi_made_lower_high = rsi[p2] < rsi[p1];
        let rsi_in_zone = rsi[p2] > self.overbought - 15.0;
        if !(price_made_higher_high && rsi_made_lower_high && rsi_in_zone) {
            return None;
        }

        let close = bars[bars.len() - 1].close;
        Some(SignalCall {
            signal: SignalKind::RsiDivergence,
            action: TradeAction::Sell,
            strength: ((rsi[p1] - rsi[p2]) / 15.0).min(1.0),
            entry: round2(close),
            target: round2(close - self.atr_target_mult * atr_last),
            stop_loss: round2(bars[p2].high + 0.3 * atr_last),
            timeframe: Timeframe::Daily,
        })
    }
}

impl Signal for RsiDivergence {
    fn kind(&self) -> SignalKind {
        SignalKind::RsiDivergence
    }

    fn evaluate(&self, bars: &[Bar]) -> Option<SignalCall> {
        if bars.len() < MIN_BARS.max(self.lookback + self.rsi_period) {
            return None;
        }

        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let rsi = rsi_series(&closes, self.rsi_period);
        let atr = atr_series(bars, 14)?;
        let atr_last = atr[bars.len() - 1];
        let start = bars.len() - self.lookback;

        self.bullish(bars, &rsi, atr_last, start)
            .or_else(|| self.bearish(bars, &rsi, atr_last, start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::test_support::series;

    /// Sharp sell-off to the first low, weak drift to a marginally lower
    /// second low: price diverges from momentum.
    fn bullish_divergence_closes() -> Vec<f64> {
        let mut closes = vec![100.0; 60];
        // Hard leg down: 97 .. 79
        for i in 1..=7 {
            closes.push(100.0 - 3.0 * i as f64);
        }
        // Bounce: 80 .. 84
        for i in 1..=5 {
            closes.push(79.0 + i as f64);
        }
        // Slow drift to a lower low: 83.5 .. 78.5
        for i in 1..=11 {
            closes.push(84.0 - 0.5 * i as f64);
        }
        // Turn back up so the second low is a pivot
        closes.extend_from_slice(&[79.5, 80.5, 81.5]);
        closes
    }

    #[test]
    fn bullish_divergence_fires_long() {
        let bars = series(&bullish_divergence_closes());

        let call = RsiDivergence::default()
            .evaluate(&bars)
            .expect("lower low with stronger RSI should fire");
        assert_eq!(call.action, TradeAction::Buy);
        assert!(call.strength > 0.0 && call.strength <= 1.0);
        assert!(call.stop_loss < call.entry);
        assert!(call.target > call.entry);
    }

    #[test]
    fn steady_downtrend_without_divergence_stays_quiet() {
        // Monotone decline: every pivot-low candidate keeps falling along
        // with RSI, so no higher-low divergence exists.
        let closes: Vec<f64> = (0..80).map(|i| 150.0 - i as f64).collect();
        let bars = series(&closes);
        assert!(RsiDivergence::default().evaluate(&bars).is_none());
    }

    #[test]
    fn insufficient_history_is_quietly_skipped() {
        let bars = series(&vec![100.0; 30]);
        assert!(RsiDivergence::default().evaluate(&bars).is_none());
    }
}
