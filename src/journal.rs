// Copyright (C) 2025 Category Labs, Inc.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Journal of submitted orders, including orders left without trail cover.

use crate::position::PositionKey;
use crate::rpc::{OrderId, TransactionType};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderKind {
    /// Stop-loss order a trail is registered against.
    Protective,
    Exit,
    Reverse,
}

/// One order the client submitted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderRecord {
    pub key: PositionKey,
    pub kind: OrderKind,
    pub order_id: OrderId,
    pub transaction_type: TransactionType,
    pub quantity: u64,
    pub trigger_price: Option<Decimal>,
    pub limit_price: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
}

/// A live protective order whose trail registration failed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnprotectedOrder {
    pub key: PositionKey,
    pub order_id: OrderId,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct JournalData {
    orders: Vec<OrderRecord>,
    unprotected: Vec<UnprotectedOrder>,
}

/// Order journal, persisted as JSON when backed by a file.
#[derive(Debug, Default)]
pub struct OrderJournal {
    path: Option<PathBuf>,
    data: JournalData,
}

impl OrderJournal {
    /// Journal that is never written to disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the journal from `path`, starting fresh if it is missing or unreadable.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let data = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!("Failed to parse {}: {}", path.display(), e);
                JournalData::default()
            }),
            Err(_) => {
                info!("No order journal at {}, starting fresh", path.display());
                JournalData::default()
            }
        };

        info!(
            "📒 Loaded {} journaled orders ({} unprotected)",
            data.orders.len(),
            data.unprotected.len()
        );
        Self {
            path: Some(path),
            data,
        }
    }

    pub fn save(&self) -> Result<(), String> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(&self.data)
            .map_err(|e| format!("Failed to serialize journal: {}", e))?;
        fs::write(path, json).map_err(|e| format!("Failed to write journal: {}", e))?;
        Ok(())
    }

    pub fn record(&mut self, order: OrderRecord) {
        info!(
            "📝 {:?} {} {} x{} (order {})",
            order.kind, order.transaction_type, order.key, order.quantity, order.order_id
        );
        self.data.orders.push(order);
        if let Err(e) = self.save() {
            warn!("Failed to save journal: {}", e);
        }
    }

    pub fn record_unprotected(&mut self, order: UnprotectedOrder) {
        error!(
            "🚨 Journaling UNPROTECTED order {} for {}: {}",
            order.order_id, order.key, order.reason
        );
        self.data.unprotected.push(order);
        if let Err(e) = self.save() {
            warn!("Failed to save journal: {}", e);
        }
    }

    pub fn orders(&self) -> &[OrderRecord] {
        &self.data.orders
    }

    pub fn unprotected(&self) -> &[UnprotectedOrder] {
        &self.data.unprotected
    }

    pub fn summary(&self) -> JournalSummary {
        let mut summary = JournalSummary {
            unprotected: self.data.unprotected.len(),
            ..JournalSummary::default()
        };
        for order in &self.data.orders {
            match order.kind {
                OrderKind::Protective => summary.protective += 1,
                OrderKind::Exit => summary.exits += 1,
                OrderKind::Reverse => summary.reversals += 1,
            }
        }
        summary
    }

    pub fn log_summary(&self) {
        let summary = self.summary();
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!("📒 Order journal:");
        info!("   Protective: {}", summary.protective);
        info!("   Exits: {}, Reversals: {}", summary.exits, summary.reversals);
        if summary.unprotected > 0 {
            warn!("   UNPROTECTED orders on record: {}", summary.unprotected);
        }
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct JournalSummary {
    pub protective: usize,
    pub exits: usize,
    pub reversals: usize,
    pub unprotected: usize,
}
