use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{error, info};

use common::models::SignalPerformance;
use storage::repositories::PerformanceRepository;

const MIN_TRADES_FOR_CALIBRATION: i64 = 10;
const HIGH_WIN_RATE: f64 = 0.60;
const LOW_WIN_RATE: f64 = 0.35;
const HIGH_AVG_PNL_PCT: f64 = 1.5;
const LOW_AVG_PNL_PCT: f64 = -1.0;
/// Fixed step, never proportional to the stats: conservative on purpose so
/// weights drift rather than oscillate.
const WEIGHT_STEP: f64 = 0.1;

/// Weekly weight adjustment from accumulated per-signal stats. Returns the
/// resulting weight map; one signal's failure never blocks the others.
pub async fn calibrate(
    pool: &SqlitePool,
    now: DateTime<Utc>,
) -> Result<HashMap<String, f64>, sqlx::Error> {
    info!("Running signal calibrator");
    let mut updated: HashMap<String, f64> = HashMap::new();

    for sp in PerformanceRepository::all(pool).await? {
        if sp.executed_signals < MIN_TRADES_FOR_CALIBRATION {
            info!(
                "Skipping {} — only {} trades (need {})",
                sp.signal_name, sp.executed_signals, MIN_TRADES_FOR_CALIBRATION
            );
            updated.insert(sp.signal_name, sp.signal_weight);
            continue;
        }

        let high_performer = sp.win_rate > HIGH_WIN_RATE && sp.avg_pnl_pct > HIGH_AVG_PNL_PCT;
        let low_performer = sp.win_rate < LOW_WIN_RATE || sp.avg_pnl_pct < LOW_AVG_PNL_PCT;

        let old_weight = sp.signal_weight;
        let new_weight = if high_performer {
            let w = (old_weight + WEIGHT_STEP).min(SignalPerformance::MAX_WEIGHT);
            info!(
                "{}: boosted {:.2} -> {:.2} (win_rate={:.0}%, avg_pnl={:+.1}%)",
                sp.signal_name,
                old_weight,
                w,
                sp.win_rate * 100.0,
                sp.avg_pnl_pct
            );
            w
        } else if low_performer {
            let w = (old_weight - WEIGHT_STEP).max(SignalPerformance::MIN_WEIGHT);
            info!(
                "{}: reduced {:.2} -> {:.2} (win_rate={:.0}%, avg_pnl={:+.1}%)",
                sp.signal_name,
                old_weight,
                w,
                sp.win_rate * 100.0,
                sp.avg_pnl_pct
            );
            w
        } else {
            old_weight
        };

        if let Err(e) = PerformanceRepository::set_weight(pool, sp.id, new_weight, now).await {
            error!("Calibration failed for {}: {e}", sp.signal_name);
            continue;
        }
        updated.insert(sp.signal_name, new_weight);
    }

    info!("Calibration complete: {:?}", updated);
    Ok(updated)
}

/// The latest committed weight snapshot for the screener. Always read from
/// the store, never cached in process memory.
pub async fn current_weights(pool: &SqlitePool) -> Result<HashMap<String, f64>, sqlx::Error> {
    PerformanceRepository::weights(pool).await
}
