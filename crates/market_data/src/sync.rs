//! Broker <-> ledger reconciliation.
//!
//! Broker state is ground truth; the ledger is a derived view. The user
//! never has to declare trades made directly in the broker app: every sync
//! diffs the account snapshot against open ledger positions and repairs the
//! ledger inside one transaction.
//!
//! Split into a pure planner and a transactional applier. Planning against
//! an already-reconciled ledger yields an empty plan, which is what makes
//! repeated syncs safe: no double-counted P&L, no duplicate positions.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{info, warn};

use common::error::{BrokerError, ReconciliationConflict};
use common::models::{BrokerHolding, ExitReason, Position, PositionInsert};
use storage::repositories::{JournalRepository, PositionsRepository};

use crate::traits::BrokerGateway;

/// What the broker reports right now. Snapshots carry no history, only
/// current holdings and free cash.
#[derive(Debug, Clone)]
pub struct BrokerSnapshot {
    pub holdings: Vec<BrokerHolding>,
    pub cash_balance: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct SyncPolicy {
    /// Cash deltas at or under this are slippage/fees noise, not transfers.
    pub fund_alert_threshold_inr: f64,
    /// Protective stop distance for externally-opened positions.
    pub default_stop_pct: f64,
    /// Default target distance for externally-opened positions.
    pub default_target_pct: f64,
    /// Baseline before any sync has stamped a balance: the configured fund
    /// size. Without it the first sync would misread the opening capital as
    /// one giant deposit.
    pub initial_balance_inr: f64,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            fund_alert_threshold_inr: 500.0,
            default_stop_pct: 0.06,
            default_target_pct: 0.10,
            initial_balance_inr: 500_000.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlannedOpen {
    pub insert: PositionInsert,
    pub last_price: f64,
}

#[derive(Debug, Clone)]
pub struct PlannedClose {
    pub position_id: i64,
    pub symbol: String,
    pub exit_price: f64,
}

/// Same symbol open on both sides with different quantities. Surfaced only;
/// auto-correcting would fight the user's partial exits.
#[derive(Debug, Clone)]
pub struct QuantityDrift {
    pub symbol: String,
    pub ledger_qty: i64,
    pub broker_qty: i64,
}

#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    pub to_open: Vec<PlannedOpen>,
    pub to_close: Vec<PlannedClose>,
    pub conflicts: Vec<ReconciliationConflict>,
    pub quantity_drift: Vec<QuantityDrift>,
    pub fund_balance_inr: f64,
    pub fund_delta_inr: f64,
    pub fund_alert: bool,
}

impl SyncPlan {
    pub fn has_structural_changes(&self) -> bool {
        !self.to_open.is_empty() || !self.to_close.is_empty()
    }
}

/// Set-diff over symbols, pure. B\L opens, L\B closes, B∩L is structurally
/// untouched (conflicts and drift are surfaced, never resolved here).
pub fn plan(
    snapshot: &BrokerSnapshot,
    open_positions: &[Position],
    last_known_balance: f64,
    policy: &SyncPolicy,
) -> SyncPlan {
    let mut plan = SyncPlan::default();

    // BTreeMaps keep the open/close order deterministic across runs.
    let mut held: BTreeMap<&str, &BrokerHolding> = BTreeMap::new();
    let mut last_prices: BTreeMap<&str, f64> = BTreeMap::new();
    for h in &snapshot.holdings {
        if h.last_price > 0.0 {
            last_prices.insert(h.symbol.as_str(), h.last_price);
        }
        if h.quantity > 0 {
            held.insert(h.symbol.as_str(), h);
        }
    }

    let ledger: BTreeMap<&str, &Position> = open_positions
        .iter()
        .map(|p| (p.symbol.as_str(), p))
        .collect();

    // In broker, not in ledger: an external buy. Adopt it with conservative
    // default levels the user should review.
    for (&symbol, h) in &held {
        if ledger.contains_key(symbol) {
            continue;
        }
        let entry = if h.avg_price > 0.0 { h.avg_price } else { h.last_price };
        let (stop, target) = default_levels(entry, h.side.sign(), policy);
        plan.to_open.push(PlannedOpen {
            insert: PositionInsert {
                suggestion_id: None,
                symbol: symbol.to_string(),
                action: h.side,
                entry_price: entry,
                quantity: h.quantity,
                current_stop: stop,
                target,
                is_externally_created: true,
            },
            last_price: h.last_price,
        });
    }

    // In ledger, gone from broker: an external sell. Close at the broker's
    // last reported price when a residual row carries one, else at the
    // ledger-tracked target.
    for (&symbol, pos) in &ledger {
        if let Some(h) = held.get(symbol) {
            if h.side != pos.action {
                plan.conflicts.push(ReconciliationConflict {
                    symbol: symbol.to_string(),
                    broker_side: h.side,
                    ledger_side: pos.action,
                });
            } else if h.quantity != pos.quantity {
                plan.quantity_drift.push(QuantityDrift {
                    symbol: symbol.to_string(),
                    ledger_qty: pos.quantity,
                    broker_qty: h.quantity,
                });
            }
            continue;
        }
        let exit_price = last_prices.get(symbol).copied().unwrap_or(pos.target);
        plan.to_close.push(PlannedClose {
            position_id: pos.id,
            symbol: symbol.to_string(),
            exit_price,
        });
    }

    plan.fund_balance_inr = snapshot.cash_balance;
    plan.fund_delta_inr = snapshot.cash_balance - last_known_balance;
    plan.fund_alert = plan.fund_delta_inr.abs() > policy.fund_alert_threshold_inr;
    plan
}

fn default_levels(entry: f64, sign: f64, policy: &SyncPolicy) -> (f64, f64) {
    let stop = round2(entry * (1.0 - sign * policy.default_stop_pct));
    let target = round2(entry * (1.0 + sign * policy.default_target_pct));
    (stop, target)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Default)]
pub struct SyncOutcome {
    pub opened: Vec<Position>,
    pub closed: Vec<Position>,
    pub conflicts: Vec<ReconciliationConflict>,
    pub quantity_drift: Vec<QuantityDrift>,
    pub fund_balance_inr: f64,
    pub fund_delta_inr: f64,
    pub fund_alert: bool,
}

impl SyncOutcome {
    pub fn has_position_changes(&self) -> bool {
        !self.opened.is_empty() || !self.closed.is_empty()
    }
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Broker(#[from] BrokerError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Full reconciliation: fetch, plan, apply, stamp. Not internally
/// reentrant-safe; callers serialize syncs (the binary holds a mutex).
///
/// A `BrokerError` aborts before any ledger write; a DB error rolls the
/// whole transaction back. Either way the ledger keeps its pre-call state.
pub async fn run_sync(
    broker: &dyn BrokerGateway,
    pool: &SqlitePool,
    policy: &SyncPolicy,
    now: DateTime<Utc>,
) -> Result<SyncOutcome, SyncError> {
    let snapshot = fetch_snapshot(broker).await?;

    let open_positions = PositionsRepository::open(pool).await?;
    let last_known_balance = JournalRepository::last_synced_balance(pool)
        .await?
        .unwrap_or(policy.initial_balance_inr);

    let plan = plan(&snapshot, &open_positions, last_known_balance, policy);
    for c in &plan.conflicts {
        warn!("Sync: {c}");
    }
    for d in &plan.quantity_drift {
        warn!(
            "Sync: quantity drift on {} — ledger {} vs broker {}",
            d.symbol, d.ledger_qty, d.broker_qty
        );
    }

    let outcome = apply(pool, plan, now).await?;
    if outcome.fund_alert {
        let direction = if outcome.fund_delta_inr > 0.0 { "added" } else { "withdrawn" };
        info!(
            "Sync: funds {direction} — ₹{:.0} (balance now ₹{:.0})",
            outcome.fund_delta_inr.abs(),
            outcome.fund_balance_inr
        );
    }
    Ok(outcome)
}

pub async fn fetch_snapshot(broker: &dyn BrokerGateway) -> Result<BrokerSnapshot, BrokerError> {
    let holdings = broker.holdings().await?;
    let cash_balance = broker.cash_balance().await?;
    Ok(BrokerSnapshot {
        holdings,
        cash_balance,
    })
}

/// Commit the whole plan or none of it. `last_sync_at` moves on every sync,
/// changes or not; `fund_added_inr` accrues only alert-worthy positive
/// deltas.
async fn apply(
    pool: &SqlitePool,
    plan: SyncPlan,
    now: DateTime<Utc>,
) -> Result<SyncOutcome, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let mut outcome = SyncOutcome {
        conflicts: plan.conflicts.clone(),
        quantity_drift: plan.quantity_drift.clone(),
        fund_balance_inr: plan.fund_balance_inr,
        fund_delta_inr: plan.fund_delta_inr,
        fund_alert: plan.fund_alert,
        ..SyncOutcome::default()
    };

    for po in &plan.to_open {
        let id = PositionsRepository::insert(&mut *tx, &po.insert, now).await?;
        if let Some(p) = PositionsRepository::get(&mut *tx, id).await? {
            info!(
                "Sync: external buy — {} ×{} @ ₹{:.2}",
                p.symbol, p.quantity, p.entry_price
            );
            outcome.opened.push(p);
        }
    }

    for pc in &plan.to_close {
        if let Some(p) =
            PositionsRepository::close(&mut tx, pc.position_id, pc.exit_price, ExitReason::Manual, now)
                .await?
        {
            info!(
                "Sync: external sell — {}, P&L ₹{:+.0} ({:+.1}%)",
                p.symbol,
                p.pnl_inr.unwrap_or(0.0),
                p.pnl_pct.unwrap_or(0.0)
            );
            outcome.closed.push(p);
        }
    }

    let added = if plan.fund_alert && plan.fund_delta_inr > 0.0 {
        plan.fund_delta_inr
    } else {
        0.0
    };
    JournalRepository::stamp_sync(
        &mut tx,
        now.date_naive(),
        plan.fund_balance_inr,
        added,
        now,
    )
    .await?;

    tx.commit().await?;
    Ok(outcome)
}
