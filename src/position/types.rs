// Copyright (C) 2025 Category Labs, Inc.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Broker position snapshot and its identity key.

use crate::error::ValidationError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// `(exchange, symbol)` identity of a position, rendered as `EXCHANGE:SYMBOL`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PositionKey {
    exchange: String,
    symbol: String,
}

impl PositionKey {
    pub fn new(exchange: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            symbol: symbol.into(),
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.exchange, self.symbol)
    }
}

impl FromStr for PositionKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once(':') {
            Some((exchange, symbol)) if !exchange.is_empty() && !symbol.is_empty() => {
                Ok(Self::new(exchange, symbol))
            }
            _ => Err(ValidationError::InvalidKey(s.to_string())),
        }
    }
}

impl TryFrom<String> for PositionKey {
    type Error = ValidationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<PositionKey> for String {
    fn from(key: PositionKey) -> Self {
        key.to_string()
    }
}

/// One open position as reported by the broker.
///
/// Positions are snapshots: a refresh replaces them wholesale and nothing
/// patches individual fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub exchange: String,
    pub symbol: String,
    /// Positive = long, negative = short.
    pub quantity: i64,
    pub average_price: Decimal,
    #[serde(default)]
    pub last_price: Decimal,
    #[serde(default)]
    pub product: String,
    #[serde(default)]
    pub pnl: Option<Decimal>,
}

impl Position {
    pub fn key(&self) -> PositionKey {
        PositionKey::new(self.exchange.clone(), self.symbol.clone())
    }

    pub fn is_long(&self) -> bool {
        self.quantity > 0
    }

    pub fn is_flat(&self) -> bool {
        self.quantity == 0
    }

    /// Server-supplied P&L, or `(last - average) * quantity` when absent.
    pub fn pnl(&self) -> Decimal {
        self.pnl
            .unwrap_or_else(|| (self.last_price - self.average_price) * Decimal::from(self.quantity))
    }
}

#[cfg(test)]
pub(crate) fn test_position(exchange: &str, symbol: &str, quantity: i64, average: Decimal) -> Position {
    Position {
        exchange: exchange.to_string(),
        symbol: symbol.to_string(),
        quantity,
        average_price: average,
        last_price: average,
        product: "MIS".to_string(),
        pnl: None,
    }
}
