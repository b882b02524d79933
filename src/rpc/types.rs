// Copyright (C) 2025 Category Labs, Inc.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Wire payloads for the order and trailing service.

use crate::error::ValidationError;
use crate::position::{Position, PositionKey};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::warn;

/// Already-resolved caller identity attached to every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ValidationError::MissingIdentity);
        }
        Ok(Self(id.trim().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Broker order id. The backend sends either a string or a number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        OrderId(s.to_string())
    }
}

impl<'de> Deserialize<'de> for OrderId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => OrderId(s),
            Raw::Number(n) => OrderId(n.to_string()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Buy,
    Sell,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionType::Buy => write!(f, "BUY"),
            TransactionType::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    #[serde(rename = "MARKET")]
    Market,
    /// Stop-loss limit: `triggerPrice` arms it, `price` caps the fill.
    #[serde(rename = "SL")]
    StopLoss,
}

/// `POST place-order` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub exchange: String,
    pub symbol: String,
    pub transaction_type: TransactionType,
    pub quantity: u64,
    pub product: String,
    pub order_type: OrderType,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub trigger_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub price: Option<Decimal>,
}

impl OrderRequest {
    pub fn key(&self) -> PositionKey {
        PositionKey::new(self.exchange.clone(), self.symbol.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub success: bool,
    #[serde(default)]
    pub order_id: Option<OrderId>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Which trail registration endpoint to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrailMode {
    #[default]
    Standard,
    Auto,
}

impl TrailMode {
    pub fn path(self) -> &'static str {
        match self {
            TrailMode::Standard => "start-trail",
            TrailMode::Auto => "start-auto-trail",
        }
    }
}

/// `POST start-trail` / `start-auto-trail` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTrailRequest {
    pub symbol: String,
    pub exchange: String,
    pub order_id: OrderId,
    pub trigger_price: Decimal,
    pub limit_price: Decimal,
    pub trail_points: Decimal,
    pub quantity: u64,
    pub product: String,
    pub avg_price: Decimal,
}

impl StartTrailRequest {
    pub fn key(&self) -> PositionKey {
        PositionKey::new(self.exchange.clone(), self.symbol.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTrailResponse {
    pub success: bool,
    #[serde(default)]
    pub position_key: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopTrailRequest {
    pub position_key: String,
}

/// Bare `{success, error?}` acknowledgement.
#[derive(Debug, Clone, Deserialize)]
pub struct AckResponse {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PositionsResponse {
    pub success: bool,
    #[serde(default)]
    pub positions: Vec<Position>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Trail state as the remote engine reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteTrailStatus {
    Starting,
    Active,
    Stopped,
    Failed,
    #[serde(other)]
    Unknown,
}

/// Per-key fields of a trail status snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrailFields {
    pub order_id: Option<OrderId>,
    pub trail_points: Decimal,
    pub trigger_price: Decimal,
    pub limit_price: Decimal,
    pub current_price: Option<Decimal>,
    pub pnl: Option<Decimal>,
    pub update_count: u64,
    pub status: Option<RemoteTrailStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub time: String,
    pub msg: String,
}

impl LogEntry {
    pub fn new(time: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            time: time.into(),
            msg: msg.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub success: bool,
    #[serde(default)]
    pub positions: HashMap<String, TrailFields>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    #[serde(default)]
    pub ticker_connected: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Authoritative remote view of every running trail.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusSnapshot {
    pub trails: HashMap<PositionKey, TrailFields>,
    /// Oldest first, as sent by the remote.
    pub logs: Vec<LogEntry>,
    pub ticker_connected: bool,
}

impl From<StatusResponse> for StatusSnapshot {
    fn from(response: StatusResponse) -> Self {
        let trails = response
            .positions
            .into_iter()
            .filter_map(|(raw, fields)| match raw.parse::<PositionKey>() {
                Ok(key) => Some((key, fields)),
                Err(e) => {
                    warn!("Dropping trail status entry: {}", e);
                    None
                }
            })
            .collect();

        Self {
            trails,
            logs: response.logs,
            ticker_connected: response.ticker_connected,
        }
    }
}

/// One line of an exit-all report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitResult {
    pub symbol: String,
    pub success: bool,
    #[serde(default)]
    pub order_id: Option<OrderId>,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExitAllResponse {
    pub success: bool,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<ExitResult>,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn identity_must_be_non_blank() {
        assert_eq!(Identity::new("  "), Err(ValidationError::MissingIdentity));
        assert_eq!(Identity::new(" AB1234 ").unwrap().as_str(), "AB1234");
    }

    #[test]
    fn order_id_accepts_numbers_and_strings() {
        let a: OrderResponse = serde_json::from_str(r#"{"success":true,"orderId":123}"#).unwrap();
        let b: OrderResponse = serde_json::from_str(r#"{"success":true,"orderId":"240611000123"}"#).unwrap();
        assert_eq!(a.order_id, Some(OrderId::from("123")));
        assert_eq!(b.order_id, Some(OrderId::from("240611000123")));
    }

    #[test]
    fn market_order_omits_prices() {
        let order = OrderRequest {
            exchange: "NSE".into(),
            symbol: "INFY".into(),
            transaction_type: TransactionType::Sell,
            quantity: 10,
            product: "MIS".into(),
            order_type: OrderType::Market,
            trigger_price: None,
            price: None,
        };
        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["transactionType"], "SELL");
        assert_eq!(json["orderType"], "MARKET");
        assert!(json.get("triggerPrice").is_none());
        assert!(json.get("price").is_none());
    }

    #[test]
    fn status_response_parses_keys_and_skips_garbage() {
        let json = r#"{
            "success": true,
            "positions": {
                "NSE:INFY": {"orderId": 7, "trailPoints": 2, "triggerPrice": 98.0,
                             "limitPrice": 93.1, "currentPrice": 101.5, "pnl": 15.0,
                             "updateCount": 4, "status": "active"},
                "garbage": {}
            },
            "logs": [{"time": "09:15:01", "msg": "trail moved"}],
            "tickerConnected": true
        }"#;
        let response: StatusResponse = serde_json::from_str(json).unwrap();
        let snapshot = StatusSnapshot::from(response);

        assert_eq!(snapshot.trails.len(), 1);
        let fields = &snapshot.trails[&PositionKey::new("NSE", "INFY")];
        assert_eq!(fields.trigger_price, dec!(98));
        assert_eq!(fields.update_count, 4);
        assert_eq!(fields.status, Some(RemoteTrailStatus::Active));
        assert!(snapshot.ticker_connected);
        assert_eq!(snapshot.logs, vec![LogEntry::new("09:15:01", "trail moved")]);
    }

    #[test]
    fn unknown_remote_status_does_not_fail_decoding() {
        let fields: TrailFields = serde_json::from_str(r#"{"status":"paused"}"#).unwrap();
        assert_eq!(fields.status, Some(RemoteTrailStatus::Unknown));
    }
}
