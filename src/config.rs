// Copyright (C) 2025 Category Labs, Inc.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Configuration module - loads settings from environment variables.

use crate::rpc::{Identity, RpcConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Main configuration for the trail client.
#[derive(Debug, Clone)]
pub struct Config {
    // Remote service
    pub api_url: String,
    pub user_id: Option<String>,
    pub request_timeout_sec: u64,

    // Trailing
    pub poll_interval_ms: u64,
    pub log_capacity: usize,
    pub auto_trail: bool,

    // Journal
    pub journal_file: PathBuf,

    // Telegram
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();

        Ok(Self {
            // Remote service
            api_url: env_var("TRAIL_API_URL")?,
            user_id: optional_var("TRAIL_USER_ID").or_else(|| optional_var("USER_ID")),
            request_timeout_sec: env_var_or("TRAIL_REQUEST_TIMEOUT_SEC", "10")
                .parse()
                .unwrap_or(10),

            // Trailing
            poll_interval_ms: env_var_or("TRAIL_POLL_INTERVAL_MS", "2000")
                .parse()
                .unwrap_or(2000),
            log_capacity: env_var_or("TRAIL_LOG_CAPACITY", "20")
                .parse()
                .unwrap_or(20),
            auto_trail: env_var_or("TRAIL_AUTO_MODE", "false")
                .parse()
                .unwrap_or(false),

            // Journal
            journal_file: env_var_or("TRAIL_JOURNAL_FILE", "orders.json").into(),

            // Telegram
            telegram_bot_token: optional_var("TELEGRAM_BOT_TOKEN"),
            telegram_chat_id: optional_var("TELEGRAM_CHAT_ID"),
        })
    }

    pub fn rpc_config(&self) -> RpcConfig {
        RpcConfig {
            base_url: self.api_url.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_sec),
        }
    }

    /// Caller identity, if one is configured and non-blank.
    pub fn identity(&self) -> Option<Identity> {
        let raw = self.user_id.as_ref()?;
        match Identity::new(raw.as_str()) {
            Ok(identity) => Some(identity),
            Err(e) => {
                warn!("Ignoring configured user id: {}", e);
                None
            }
        }
    }
}

fn env_var(name: &str) -> Result<String, String> {
    std::env::var(name).map_err(|_| format!("{} not set", name))
}

fn env_var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(user_id: Option<&str>) -> Config {
        Config {
            api_url: "http://localhost:3000/api/".into(),
            user_id: user_id.map(String::from),
            request_timeout_sec: 5,
            poll_interval_ms: 2000,
            log_capacity: 20,
            auto_trail: false,
            journal_file: "orders.json".into(),
            telegram_bot_token: None,
            telegram_chat_id: None,
        }
    }

    #[test]
    fn blank_user_id_means_no_identity() {
        assert!(config(None).identity().is_none());
        assert!(config(Some("   ")).identity().is_none());
        assert_eq!(config(Some("AB1234")).identity().unwrap().as_str(), "AB1234");
    }

    #[test]
    fn rpc_config_carries_timeout() {
        let rpc = config(None).rpc_config();
        assert_eq!(rpc.request_timeout, Duration::from_secs(5));
        assert_eq!(rpc.base_url, "http://localhost:3000/api/");
    }
}
