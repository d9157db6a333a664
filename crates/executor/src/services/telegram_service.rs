use pnl::{RunMode, RunReport};
use teloxide::prelude::*;
use tracing::{error, info};

use crate::config::TelegramConfig;

pub struct TelegramService {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramService {
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            bot: Bot::new(&config.bot_token),
            chat_id: ChatId(config.chat_id),
        }
    }

    /// Delivery problems are logged and swallowed; the run outcome is already
    /// decided by the time this is called.
    pub async fn send(&self, text: String) {
        match self.bot.send_message(self.chat_id, text).await {
            Ok(_) => info!("Run report sent to Telegram"),
            Err(e) => error!("Failed to send Telegram message: {}", e),
        }
    }
}

pub fn report_message(mode: RunMode, report: &RunReport) -> String {
    let status = if report.has_errors() {
        format!("finished with {} errors", report.error_count())
    } else {
        "finished cleanly".to_string()
    };
    format!("Reconciler {mode} run {status}\n{report}")
}

pub fn failure_message(mode: RunMode, err: &anyhow::Error) -> String {
    format!("Reconciler {mode} run aborted: {err:#}")
}
