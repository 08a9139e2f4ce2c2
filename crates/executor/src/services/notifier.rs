use async_trait::async_trait;
use teloxide::prelude::*;
use tracing::{error, info};

/// Delivery boundary for everything the pipelines want the user to see.
/// Sends are fire-and-forget: a failed notification never fails a pipeline.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &str);
}

pub struct TelegramNotifier {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramNotifier {
    pub fn new(token: &str, chat_id: i64) -> Self {
        Self {
            bot: Bot::new(token),
            chat_id: ChatId(chat_id),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, message: &str) {
        if let Err(e) = self.bot.send_message(self.chat_id, message).await {
            error!("Failed to send Telegram message: {e}");
        }
    }
}

/// Fallback when Telegram is unconfigured: everything lands in the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &str) {
        info!("NOTIFY:\n{message}");
    }
}
