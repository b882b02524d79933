// Copyright (C) 2025 Category Labs, Inc.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Trailing-stop lifecycle: price, protect, register, track, stop.

use crate::config::Config;
use crate::error::{TrailError, ValidationError};
use crate::journal::{OrderJournal, OrderKind, OrderRecord, UnprotectedOrder};
use crate::position::{Position, PositionKey, SelectionSet};
use crate::pricing::{compute_stop_prices, exit_quantity, exit_side, reversal_quantity, StopPrices};
use crate::rpc::{
    Identity, OrderId, OrderRequest, OrderType, StartTrailRequest, TrailMode, TrailService,
};
use crate::telegram::TelegramNotifier;
use crate::trail::outcome::{BatchResult, ExitAllSummary, ItemOutcome, TrailPlacement};
use crate::trail::reconciler::{spawn_reconciler, Reconciler};
use crate::trail::registry::{ReconcileReport, RegistryView, TrailRegistration, TrailRegistry};
use chrono::Utc;
use futures_util::future::join_all;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Coordinator tuning.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub poll_interval: Duration,
    pub trail_mode: TrailMode,
    pub log_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(2000),
            trail_mode: TrailMode::Standard,
            log_capacity: 20,
        }
    }
}

impl CoordinatorConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            trail_mode: if config.auto_trail {
                TrailMode::Auto
            } else {
                TrailMode::Standard
            },
            log_capacity: config.log_capacity,
        }
    }
}

/// Owns the trail registry and drives every remote call that touches it.
pub struct TrailCoordinator {
    service: Arc<dyn TrailService>,
    identity: Option<Identity>,
    config: CoordinatorConfig,
    registry: Arc<RwLock<TrailRegistry>>,
    journal: Arc<Mutex<OrderJournal>>,
    notifier: Arc<TelegramNotifier>,
    shutdown: CancellationToken,
    reconciler: Mutex<Option<JoinHandle<()>>>,
}

impl TrailCoordinator {
    pub fn new(
        service: Arc<dyn TrailService>,
        identity: Option<Identity>,
        config: CoordinatorConfig,
    ) -> Self {
        let registry = TrailRegistry::new(config.log_capacity);
        Self {
            service,
            identity,
            config,
            registry: Arc::new(RwLock::new(registry)),
            journal: Arc::new(Mutex::new(OrderJournal::in_memory())),
            notifier: Arc::new(TelegramNotifier::disabled()),
            shutdown: CancellationToken::new(),
            reconciler: Mutex::new(None),
        }
    }

    pub fn with_journal(mut self, journal: OrderJournal) -> Self {
        self.journal = Arc::new(Mutex::new(journal));
        self
    }

    pub fn with_notifier(mut self, notifier: TelegramNotifier) -> Self {
        self.notifier = Arc::new(notifier);
        self
    }

    fn identity(&self) -> Result<&Identity, ValidationError> {
        self.identity.as_ref().ok_or(ValidationError::MissingIdentity)
    }

    pub fn journal(&self) -> Arc<Mutex<OrderJournal>> {
        Arc::clone(&self.journal)
    }

    /// Consistent copy of the registry for display.
    pub async fn view(&self) -> RegistryView {
        self.registry.read().await.view()
    }

    pub async fn get(&self, key: &PositionKey) -> Option<TrailRegistration> {
        self.registry.read().await.get(key).cloned()
    }

    pub async fn is_polling(&self) -> bool {
        self.registry.read().await.is_polling()
    }

    /// Protect each position with a stop-loss order and trail it.
    ///
    /// Validation failures reject the whole batch before any remote call.
    /// Otherwise every input position gets exactly one outcome, in order. A
    /// key repeated within the batch fails with `AlreadyTrailing`.
    pub async fn start_trail(
        &self,
        positions: &[Position],
        trail_points: Decimal,
    ) -> Result<BatchResult, ValidationError> {
        if positions.is_empty() {
            return Err(ValidationError::EmptySelection);
        }
        if trail_points <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveTrailPoints(trail_points));
        }
        let identity = self.identity()?;

        info!(
            "🎯 Starting trails on {} position(s), {} points",
            positions.len(),
            trail_points
        );
        let outcomes = join_all(
            positions
                .iter()
                .map(|position| self.start_one(identity, position, trail_points)),
        )
        .await;

        let batch = BatchResult::new(outcomes);
        if batch.succeeded() > 0 {
            self.ensure_reconciler().await;
        }
        info!(
            "Trail batch done: {} started, {} failed",
            batch.succeeded(),
            batch.failed()
        );
        Ok(batch)
    }

    async fn start_one(
        &self,
        identity: &Identity,
        position: &Position,
        trail_points: Decimal,
    ) -> ItemOutcome {
        let key = position.key();
        let result = self.try_start(identity, position, trail_points).await;
        if let Err(e) = &result {
            if !e.is_partial_protection() {
                warn!("❌ Trail not started for {}: {}", key, e);
            }
        }
        ItemOutcome { key, result }
    }

    async fn try_start(
        &self,
        identity: &Identity,
        position: &Position,
        trail_points: Decimal,
    ) -> Result<TrailPlacement, TrailError> {
        let key = position.key();
        if position.is_flat() {
            return Err(ValidationError::FlatPosition(key).into());
        }
        let prices = compute_stop_prices(position, trail_points)?;
        self.registry.write().await.reserve(&key)?;
        let order = OrderRequest {
            exchange: position.exchange.clone(),
            symbol: position.symbol.clone(),
            transaction_type: exit_side(position),
            quantity: exit_quantity(position),
            product: position.product.clone(),
            order_type: OrderType::StopLoss,
            trigger_price: Some(prices.trigger),
            price: Some(prices.limit),
        };

        let order_id = match self.service.place_order(identity, &order).await {
            Ok(id) => id,
            Err(e) => {
                self.registry.write().await.release(&key);
                return Err(e.into());
            }
        };
        self.journal_order(&order, OrderKind::Protective, &order_id, Some(prices))
            .await;

        let request = StartTrailRequest {
            symbol: position.symbol.clone(),
            exchange: position.exchange.clone(),
            order_id: order_id.clone(),
            trigger_price: prices.trigger,
            limit_price: prices.limit,
            trail_points,
            quantity: order.quantity,
            product: position.product.clone(),
            avg_price: position.average_price,
        };

        match self
            .service
            .start_trail(identity, self.config.trail_mode, &request)
            .await
        {
            Ok(remote_key) => {
                if let Some(remote_key) = remote_key.filter(|k| *k != key.to_string()) {
                    warn!("Remote filed trail for {} under {}", key, remote_key);
                }
                let mut registry = self.registry.write().await;
                if self.shutdown.is_cancelled() {
                    registry.release(&key);
                } else {
                    registry.insert_starting(key.clone(), order_id.clone(), trail_points, prices);
                }
                drop(registry);

                info!(
                    "🛡️ Trail registered for {}: trigger {} limit {} (order {})",
                    key, prices.trigger, prices.limit, order_id
                );
                Ok(TrailPlacement {
                    key,
                    order_id,
                    prices,
                    transaction_type: order.transaction_type,
                    quantity: order.quantity,
                })
            }
            Err(source) => {
                self.registry.write().await.release(&key);
                error!(
                    "🚨 Order {} for {} is LIVE but UNPROTECTED: trail registration failed: {}",
                    order_id, key, source
                );
                self.journal.lock().await.record_unprotected(UnprotectedOrder {
                    key: key.clone(),
                    order_id: order_id.clone(),
                    reason: source.to_string(),
                    timestamp: Utc::now(),
                });
                self.notifier
                    .alert_unprotected(&key, &order_id, &source.to_string())
                    .await;
                Err(TrailError::PartialProtection {
                    key,
                    order_id,
                    source,
                })
            }
        }
    }

    /// Cancel the remote trail, then drop the local entry.
    ///
    /// Returns the removed registration (status `Stopped`), if one was tracked.
    /// On failure the registry is left as it was.
    pub async fn stop_trail(&self, key: &PositionKey) -> Result<Option<TrailRegistration>, TrailError> {
        let identity = self.identity()?;

        if let Err(e) = self.service.stop_trail(identity, key).await {
            warn!("❌ Failed to stop trail for {}: {}", key, e);
            return Err(e.into());
        }

        let removed = self.registry.write().await.remove(key);
        info!("⏹️ Trail stopped for {}", key);
        Ok(removed)
    }

    /// Flatten the position with a market order.
    pub async fn exit_position(&self, position: &Position) -> Result<OrderId, TrailError> {
        self.market_order(position, exit_quantity(position), OrderKind::Exit)
            .await
    }

    /// Flip the position with a single market order of twice its size.
    pub async fn reverse_position(&self, position: &Position) -> Result<OrderId, TrailError> {
        let quantity = reversal_quantity(position)?;
        self.market_order(position, quantity, OrderKind::Reverse)
            .await
    }

    async fn market_order(
        &self,
        position: &Position,
        quantity: u64,
        kind: OrderKind,
    ) -> Result<OrderId, TrailError> {
        let identity = self.identity()?;
        if position.is_flat() {
            return Err(ValidationError::FlatPosition(position.key()).into());
        }

        let order = OrderRequest {
            exchange: position.exchange.clone(),
            symbol: position.symbol.clone(),
            transaction_type: exit_side(position),
            quantity,
            product: position.product.clone(),
            order_type: OrderType::Market,
            trigger_price: None,
            price: None,
        };

        let order_id = self.service.place_order(identity, &order).await.map_err(|e| {
            warn!("❌ {:?} order for {} failed: {}", kind, position.key(), e);
            TrailError::from(e)
        })?;
        self.journal_order(&order, kind, &order_id, None).await;
        Ok(order_id)
    }

    /// Ask the remote to market-exit everything.
    pub async fn exit_all_positions(&self) -> Result<ExitAllSummary, TrailError> {
        let identity = self.identity()?;
        let response = self.service.exit_all_positions(identity).await?;
        let summary = ExitAllSummary::from(response);
        info!(
            "🚪 Exit all: {} total, {} ok, {} failed",
            summary.total, summary.successful, summary.failed
        );
        Ok(summary)
    }

    /// Trail every selected position; clears the selection if all succeeded.
    pub async fn start_trail_selected(
        &self,
        selection: &mut SelectionSet,
        trail_points: Decimal,
    ) -> Result<BatchResult, ValidationError> {
        let positions = selection.all().to_vec();
        let batch = self.start_trail(&positions, trail_points).await?;
        if batch.all_succeeded() {
            selection.clear();
        }
        Ok(batch)
    }

    /// Exit the one selected position.
    pub async fn exit_selected(&self, selection: &mut SelectionSet) -> Result<OrderId, TrailError> {
        let position = selection.single()?.clone();
        let order_id = self.exit_position(&position).await?;
        selection.clear();
        Ok(order_id)
    }

    /// Reverse the one selected position.
    pub async fn reverse_selected(&self, selection: &mut SelectionSet) -> Result<OrderId, TrailError> {
        let position = selection.single()?.clone();
        let order_id = self.reverse_position(&position).await?;
        selection.clear();
        Ok(order_id)
    }

    /// Run one reconciliation pass now, outside the background loop.
    /// Picks up trails the remote is already running.
    pub async fn sync_now(&self) -> Result<ReconcileReport, TrailError> {
        let identity = self.identity()?;
        let ticket = self.registry.write().await.begin_poll();
        let snapshot = self.service.trail_status(identity).await?;

        let mut registry = self.registry.write().await;
        if self.shutdown.is_cancelled() {
            return Ok(ReconcileReport::default());
        }
        Ok(registry.apply(ticket, snapshot))
    }

    /// Start the background loop if there is something to poll and it is
    /// not already running.
    pub async fn ensure_reconciler(&self) {
        let Ok(identity) = self.identity() else {
            return;
        };

        let mut registry = self.registry.write().await;
        if registry.is_polling() || registry.live_count() == 0 || self.shutdown.is_cancelled() {
            return;
        }
        registry.set_polling(true);

        let reconciler = Reconciler {
            service: Arc::clone(&self.service),
            identity: identity.clone(),
            registry: Arc::clone(&self.registry),
            notifier: Arc::clone(&self.notifier),
            interval: self.config.poll_interval,
        };
        let handle = spawn_reconciler(reconciler, self.shutdown.child_token());
        drop(registry);

        *self.reconciler.lock().await = Some(handle);
    }

    /// Cancel polling. Once this returns no poll result can change the registry.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.registry.write().await.set_polling(false);

        let handle = self.reconciler.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Reconciler task ended abnormally: {}", e);
            }
        }
    }

    async fn journal_order(
        &self,
        order: &OrderRequest,
        kind: OrderKind,
        order_id: &OrderId,
        prices: Option<StopPrices>,
    ) {
        self.journal.lock().await.record(OrderRecord {
            key: order.key(),
            kind,
            order_id: order_id.clone(),
            transaction_type: order.transaction_type,
            quantity: order.quantity,
            trigger_price: prices.map(|p| p.trigger),
            limit_price: prices.map(|p| p.limit),
            timestamp: Utc::now(),
        });
    }
}
