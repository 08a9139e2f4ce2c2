pub mod ema_crossover;
pub mod rsi_divergence;
pub mod support_resistance;
pub mod volume_breakout;

pub use ema_crossover::EmaCrossover;
pub use rsi_divergence::RsiDivergence;
pub use support_resistance::SupportResistance;
pub use volume_breakout::VolumeBreakout;

use common::models::{Bar, SignalCall, SignalKind};
use ta::indicators::{
    AverageTrueRange, ExponentialMovingAverage, RelativeStrengthIndex, SimpleMovingAverage,
};
use ta::{DataItem, Next};

/// Minimum usable history for any detector. Shorter series are a normal
/// "insufficient history" outcome, not an error.
pub const MIN_BARS: usize = 60;

/// One swing detector. Pure function of the bar series: no I/O, no state
/// between calls, identical input gives identical output.
pub trait Signal: Send + Sync {
    fn kind(&self) -> SignalKind;
    fn evaluate(&self, bars: &[Bar]) -> Option<SignalCall>;
}

pub fn all_signals() -> Vec<Box<dyn Signal>> {
    vec![
        Box::new(EmaCrossover::default()),
        Box::new(RsiDivergence::default()),
        Box::new(SupportResistance::default()),
        Box::new(VolumeBreakout::default()),
    ]
}

// ── Indicator series helpers ────────────────────────────────────────────────

pub(crate) fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    let mut ema = ExponentialMovingAverage::new(period).unwrap();
    values.iter().map(|v| ema.next(*v)).collect()
}

pub(crate) fn rsi_series(values: &[f64], period: usize) -> Vec<f64> {
    let mut rsi = RelativeStrengthIndex::new(period).unwrap();
    values.iter().map(|v| rsi.next(*v)).collect()
}

pub(crate) fn sma_series(values: &[f64], period: usize) -> Vec<f64> {
    let mut sma = SimpleMovingAverage::new(period).unwrap();
    values.iter().map(|v| sma.next(*v)).collect()
}

/// ATR over the full series. None when a bar fails OHLC sanity (the whole
/// series is then unusable for level math).
pub(crate) fn atr_series(bars: &[Bar], period: usize) -> Option<Vec<f64>> {
    let mut atr = AverageTrueRange::new(period).unwrap();
    let mut out = Vec::with_capacity(bars.len());
    for bar in bars {
        let item = DataItem::builder()
            .open(bar.open)
            .high(bar.high)
            .low(bar.low)
            .close(bar.close)
            .volume(bar.volume)
            .build()
            .ok()?;
        out.push(atr.next(&item));
    }
    Some(out)
}

/// Indices of local maxima with `window` bars on each side.
pub(crate) fn pivot_highs(values: &[f64], window: usize) -> Vec<usize> {
    pivots(values, window, |v, w| v >= w)
}

/// Indices of local minima with `window` bars on each side.
pub(crate) fn pivot_lows(values: &[f64], window: usize) -> Vec<usize> {
    pivots(values, window, |v, w| v <= w)
}

fn pivots(values: &[f64], window: usize, dominates: fn(f64, f64) -> bool) -> Vec<usize> {
    if values.len() < 2 * window + 1 {
        return Vec::new();
    }
    (window..values.len() - window)
        .filter(|&i| {
            values[i - window..=i + window]
                .iter()
                .all(|&v| dominates(values[i], v))
        })
        .collect()
}

/// Prices are quoted to the paisa.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{Duration, TimeZone, Utc};
    use common::models::Bar;

    /// Synthetic daily series: open = close, range ±1, constant volume.
    pub fn series(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| bar(i, close, close, 1_000_000.0))
            .collect()
    }

    pub fn bar(day: usize, open: f64, close: f64, volume: f64) -> Bar {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let high = open.max(close) + 1.0;
        let low = open.min(close) - 1.0;
        Bar {
            ts: start + Duration::days(day as i64),
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pivots_find_interior_extremes() {
        let values = [1.0, 2.0, 5.0, 2.0, 1.0, 2.0, 0.5, 2.0, 3.0];
        assert_eq!(pivot_highs(&values, 2), vec![2]);
        assert_eq!(pivot_lows(&values, 2), vec![6]);
    }

    #[test]
    fn pivots_need_full_window() {
        let values = [3.0, 1.0, 2.0];
        assert!(pivot_highs(&values, 2).is_empty());
    }

    #[test]
    fn ema_of_constant_is_constant() {
        let values = vec![50.0; 30];
        let ema = ema_series(&values, 10);
        assert!((ema.last().unwrap() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn round2_is_paisa_precision() {
        assert_eq!(round2(101.236), 101.24);
        assert_eq!(round2(101.234), 101.23);
    }
}
