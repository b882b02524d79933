// Copyright (C) 2025 Category Labs, Inc.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Telegram alerts for conditions a trader has to act on.

use crate::position::PositionKey;
use crate::rpc::OrderId;
use teloxide::prelude::*;
use tracing::{error, info, warn};

#[derive(Clone, Default)]
pub struct TelegramNotifier {
    bot: Option<Bot>,
    chat_id: Option<ChatId>,
}

impl TelegramNotifier {
    pub fn new(token: Option<String>, chat_id: Option<String>) -> Self {
        info!(
            "📱 Initializing Telegram: token={}, chat_id={}",
            token.as_ref().map(|_| "SET").unwrap_or("NONE"),
            chat_id.as_ref().map(|_| "SET").unwrap_or("NONE")
        );

        let bot = token.map(Bot::new);
        let chat_id = chat_id.and_then(|id| match id.parse::<i64>() {
            Ok(num) => Some(ChatId(num)),
            Err(_) => {
                warn!("TELEGRAM_CHAT_ID {:?} is not numeric, alerts disabled", id);
                None
            }
        });

        Self { bot, chat_id }
    }

    /// Notifier that drops every message.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.bot.is_some() && self.chat_id.is_some()
    }

    pub async fn send_message(&self, message: &str) {
        if let (Some(bot), Some(chat_id)) = (&self.bot, &self.chat_id) {
            let result = bot.send_message(*chat_id, message).await;
            match result {
                Ok(_) => info!("📤 Sent Telegram message"),
                Err(e) => error!("Failed to send Telegram message: {}", e),
            }
        }
    }

    pub async fn alert_unprotected(&self, key: &PositionKey, order_id: &OrderId, reason: &str) {
        self.send_message(&unprotected_message(key, order_id, reason))
            .await;
    }

    pub async fn alert_trail_failed(&self, key: &PositionKey) {
        self.send_message(&format!(
            "⚠️ TRAIL LOST\n{} disappeared from the trailing engine. Check its stop order.",
            key
        ))
        .await;
    }
}

fn unprotected_message(key: &PositionKey, order_id: &OrderId, reason: &str) -> String {
    format!(
        "🚨 UNPROTECTED ORDER\n{}: stop order {} is live but trailing did not start.\nReason: {}\nManage it manually.",
        key, order_id, reason
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_settings_disable_alerts() {
        assert!(!TelegramNotifier::disabled().is_enabled());
        assert!(!TelegramNotifier::new(Some("123:abc".into()), Some("not-a-number".into())).is_enabled());
        assert!(TelegramNotifier::new(Some("123:abc".into()), Some("-100200".into())).is_enabled());
    }

    #[test]
    fn unprotected_alert_names_the_order() {
        let text = unprotected_message(&PositionKey::new("NSE", "INFY"), &OrderId::from("123"), "engine down");
        assert!(text.contains("NSE:INFY"));
        assert!(text.contains("123"));
        assert!(text.contains("engine down"));
    }
}
