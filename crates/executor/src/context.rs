use std::sync::Arc;

use chrono::Utc;
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use common::config::Settings;
use market_data::sync::{run_sync, SyncError, SyncOutcome, SyncPolicy};
use market_data::traits::{BrokerGateway, MarketDataSource};

use crate::services::notifier::Notifier;

/// Everything a pipeline run needs, wired once at startup.
pub struct AppContext {
    pub settings: Settings,
    pub pool: SqlitePool,
    pub market: Arc<dyn MarketDataSource>,
    pub broker: Arc<dyn BrokerGateway>,
    pub notifier: Arc<dyn Notifier>,
    sync_lock: Mutex<()>,
}

impl AppContext {
    pub fn new(
        settings: Settings,
        pool: SqlitePool,
        market: Arc<dyn MarketDataSource>,
        broker: Arc<dyn BrokerGateway>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            settings,
            pool,
            market,
            broker,
            notifier,
            sync_lock: Mutex::new(()),
        }
    }

    pub fn sync_policy(&self) -> SyncPolicy {
        SyncPolicy {
            fund_alert_threshold_inr: self.settings.fund_alert_threshold_inr,
            initial_balance_inr: self.settings.fund_size_inr,
            ..SyncPolicy::default()
        }
    }

    /// Reconcile under the process-wide lock: one sync in flight at a time,
    /// run to completion.
    pub async fn reconcile(&self) -> Result<SyncOutcome, SyncError> {
        let _guard = self.sync_lock.lock().await;
        run_sync(
            self.broker.as_ref(),
            &self.pool,
            &self.sync_policy(),
            Utc::now(),
        )
        .await
    }
}
