// Copyright (C) 2025 Category Labs, Inc.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Background loop that folds remote trail snapshots into the registry.

use crate::rpc::{Identity, TrailService};
use crate::telegram::TelegramNotifier;
use crate::trail::registry::{ReconcileReport, TrailRegistry};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Everything one reconciliation loop needs.
pub struct Reconciler {
    pub service: Arc<dyn TrailService>,
    pub identity: Identity,
    pub registry: Arc<RwLock<TrailRegistry>>,
    pub notifier: Arc<TelegramNotifier>,
    pub interval: Duration,
}

impl Reconciler {
    /// Fetch one snapshot and merge it. Returns `None` if the poll failed or
    /// `cancel` fired before the merge.
    pub async fn tick(&self, cancel: &CancellationToken) -> Option<ReconcileReport> {
        let ticket = self.registry.write().await.begin_poll();

        let result = tokio::select! {
            _ = cancel.cancelled() => return None,
            result = self.service.trail_status(&self.identity) => result,
        };

        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("⚠️ Trail status poll failed, retrying next tick: {}", e);
                return None;
            }
        };

        let report = {
            let mut registry = self.registry.write().await;
            // Checked under the lock so nothing lands after a shutdown.
            if cancel.is_cancelled() {
                return None;
            }
            registry.apply(ticket, snapshot)
        };

        debug!(
            "Reconciled: {} activated, {} adopted, {} failed, {} new log lines",
            report.activated.len(),
            report.adopted.len(),
            report.failed.len(),
            report.new_logs
        );
        for key in &report.failed {
            self.notifier.alert_trail_failed(key).await;
        }
        Some(report)
    }

    /// Poll until no live trail remains or `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            "📡 Trail reconciler started (polling every {}ms)",
            self.interval.as_millis()
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }

            self.tick(&cancel).await;

            let mut registry = self.registry.write().await;
            if cancel.is_cancelled() {
                break;
            }
            if registry.live_count() == 0 {
                registry.set_polling(false);
                info!("No live trails left, reconciler stopping");
                return;
            }
        }

        info!("🛑 Trail reconciler cancelled");
    }
}

/// Spawn the reconciliation loop as a background task.
pub fn spawn_reconciler(reconciler: Reconciler, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(reconciler.run(cancel))
}
