use common::models::{Bar, SignalCall, SignalKind, Timeframe, TradeAction};

use super::{atr_series, round2, sma_series, Signal, MIN_BARS};

const MIN_VOLUME_MULTIPLIER: f64 = 2.0;
/// Body must be at least this share of the candle range.
const MIN_BODY_RATIO: f64 = 0.60;

/// Exceptional volume on a strong directional candle, the institutional
/// accumulation/distribution footprint. Indecisive candles (doji, hammer)
/// are skipped no matter how large the volume.
pub struct VolumeBreakout {
    vol_ma_period: usize,
    atr_period: usize,
    atr_target_mult: f64,
}

impl Default for VolumeBreakout {
    fn default() -> Self {
        Self {
            vol_ma_period: 20,
            atr_period: 14,
            atr_target_mult: 2.0,
        }
    }
}

impl Signal for VolumeBreakout {
    fn kind(&self) -> SignalKind {
        SignalKind::VolumeBreakout
    }

    fn evaluate(&self, bars: &[Bar]) -> Option<SignalCall> {
        if bars.len() < MIN_BARS.max(self.vol_ma_period + 5) {
            return None;
        }

        let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();
        let vol_ma = sma_series(&volumes, self.vol_ma_period);
        let atr = atr_series(bars, self.atr_period)?;

        let n = bars.len();
        let last = &bars[n - 1];
        let vol_ratio = if vol_ma[n - 1] > 0.0 {
            last.volume / vol_ma[n - 1]
        } else {
            0.0
        };
        if vol_ratio < MIN_VOLUME_MULTIPLIER {
            return None;
        }

        if last.high - last.low <= 0.0 || last.body_ratio() < MIN_BODY_RATIO {
            return None;
        }

        let close = last.close;
        let atr_last = atr[n - 1];
        let (action, stop_loss, target) = if last.is_bullish() {
            (
                TradeAction::Buy,
                round2(last.low - 0.2 * atr_last),
                round2(close + self.atr_target_mult * atr_last),
            )
        } else {
            (
                TradeAction::Sell,
                round2(last.high + 0.2 * atr_last),
                round2(close - self.atr_target_mult * atr_last),
            )
        };

        Some(SignalCall {
            signal: self.kind(),
            action,
            strength: ((vol_ratio - MIN_VOLUME_MULTIPLIER) / 3.0 + 0.5).min(1.0),
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
    use crate::signals::test_support::{bar, series};

    fn flat_with_last(open: f64, close: f64, volume: f64) -> Vec<common::models::Bar> {
        let mut bars = series(&vec![100.0; 99]);
        bars.push(bar(99, open, close, volume));
        bars
    }

    #[test]
    fn surge_on_strong_bullish_candle_fires_long() {
        // 3x average volume, body 3 of range 5.
        let bars = flat_with_last(100.0, 103.0, 3_000_000.0);

        let call = VolumeBreakout::default()
            .evaluate(&bars)
            .expect("volume surge with a strong body should fire");
        assert_eq!(call.action, TradeAction::Buy);
        assert!(call.stop_loss < call.entry);
        assert!(call.target > call.entry);
        assert!(call.strength >= 0.5 && call.strength <= 1.0);
    }

    #[test]
    fn surge_on_strong_bearish_candle_fires_short() {
        let bars = flat_with_last(103.0, 100.0, 3_000_000.0);

        let call = VolumeBreakout::default().evaluate(&bars).unwrap();
        assert_eq!(call.action, TradeAction::Sell);
        assert!(call.stop_loss > call.entry);
        assert!(call.target < call.entry);
    }

    #[test]
    fn doji_is_rejected_despite_volume() {
        // Body 0.2 of range 2.2: indecisive.
        let bars = flat_with_last(100.0, 100.2, 5_000_000.0);
        assert!(VolumeBreakout::default().evaluate(&bars).is_none());
    }

    #[test]
    fn average_volume_stays_quiet() {
        let bars = flat_with_last(100.0, 103.0, 1_100_000.0);
        assert!(VolumeBreakout::default().evaluate(&bars).is_none());
    }

    #[test]
    fn insufficient_history_is_quietly_skipped() {
        let bars = flat_with_last(100.0, 103.0, 3_000_000.0)[..50].to_vec();
        assert!(VolumeBreakout::default().evaluate(&bars).is_none());
    }
}
