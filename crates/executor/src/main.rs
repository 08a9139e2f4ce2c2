use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tracing::info;

use common::config::{BrokerKind, Settings};
use common::logger;
use market_data::remote::{AngelOneClient, ZerodhaClient};
use market_data::traits::{BrokerGateway, MarketDataSource};

use crate::context::AppContext;
use crate::services::notifier::{LogNotifier, Notifier, TelegramNotifier};

mod commands;
mod context;
mod pipelines;
mod services;

#[derive(Parser)]
#[command(name = "swingbot")]
#[command(about = "Swing-trading screener and broker-ledger sync for NSE equities", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Morning run: sync, screen the watchlist, send the day's setups
    PreMarket,
    /// Hourly run: sync, then watch entries and stop/target breaches
    Monitor,
    /// After the close: settle breached positions, send the EOD review
    PostMarket,
    /// Reconcile the ledger against the broker account now
    Sync,
    /// Recompute signal weights from accumulated outcomes
    Calibrate,
    /// Confirm that a suggested limit order was placed
    Execute { suggestion_id: i64 },
    /// Pass on a suggestion
    Skip { suggestion_id: i64 },
    /// List open ledger positions
    Positions,
    /// Exchange a Zerodha request token for a daily access token
    Login { request_token: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    logger::setup_logger();
    dotenv().ok();
    let cli = Cli::parse();
    let settings = Settings::from_env()?;

    // The daily token exchange runs before a broker session exists.
    if let Commands::Login { request_token } = &cli.command {
        let client = ZerodhaClient::new(settings.zerodha_api_key.clone(), String::new());
        let token = client
            .generate_session(request_token, &settings.zerodha_api_secret)
            .await?;
        println!("ZERODHA_ACCESS_TOKEN={token}");
        return Ok(());
    }

    let pool = storage::db::connect(&settings.database_path).await?;
    let (market, broker) = build_broker(&settings);
    let notifier = build_notifier(&settings);
    let ctx = AppContext::new(settings, pool, market, broker, notifier);

    match cli.command {
        Commands::PreMarket => pipelines::pre_market::run(&ctx).await?,
        Commands::Monitor => pipelines::monitor::run(&ctx).await?,
        Commands::PostMarket => pipelines::post_market::run(&ctx).await?,
        Commands::Sync => {
            let outcome = ctx.reconcile().await?;
            pipelines::record_sync_outcomes(&ctx, &outcome).await;
            pipelines::notify_sync(&ctx, &outcome).await;
            info!(
                "Sync complete: {} opened, {} closed, balance ₹{:.0}",
                outcome.opened.len(),
                outcome.closed.len(),
                outcome.fund_balance_inr
            );
        }
        Commands::Calibrate => {
            let weights = learning::calibrator::calibrate(&ctx.pool, chrono::Utc::now()).await?;
            for (name, weight) in &weights {
                println!("{name}: {weight:.2}");
            }
        }
        Commands::Execute { suggestion_id } => commands::execute(&ctx, suggestion_id).await?,
        Commands::Skip { suggestion_id } => commands::skip(&ctx, suggestion_id).await?,
        Commands::Positions => commands::positions(&ctx).await?,
        Commands::Login { .. } => unreachable!("handled before startup"),
    }
    Ok(())
}

/// One client serves both capabilities: every supported broker can report
/// history, quotes, holdings and cash.
fn build_broker(settings: &Settings) -> (Arc<dyn MarketDataSource>, Arc<dyn BrokerGateway>) {
    match settings.broker {
        BrokerKind::Zerodha => {
            let client = Arc::new(ZerodhaClient::new(
                settings.zerodha_api_key.clone(),
                settings.zerodha_access_token.clone(),
            ));
            (
                client.clone() as Arc<dyn MarketDataSource>,
                client as Arc<dyn BrokerGateway>,
            )
        }
        BrokerKind::AngelOne => {
            let client = Arc::new(AngelOneClient::new(
                settings.angel_one_api_key.clone(),
                settings.angel_one_jwt_token.clone(),
            ));
            (
                client.clone() as Arc<dyn MarketDataSource>,
                client as Arc<dyn BrokerGateway>,
            )
        }
    }
}

fn build_notifier(settings: &Settings) -> Arc<dyn Notifier> {
    match (&settings.telegram_bot_token, settings.telegram_chat_id) {
        (Some(token), Some(chat_id)) => Arc::new(TelegramNotifier::new(token, chat_id)),
        _ => {
            info!("Telegram not configured; notifications go to the log");
            Arc::new(LogNotifier)
        }
    }
}
