// Copyright (C) 2025 Category Labs, Inc.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Contract of the remote order-routing and trailing service.

use super::types::{
    ExitAllResponse, Identity, OrderId, OrderRequest, StartTrailRequest, StatusSnapshot, TrailMode,
};
use crate::error::RemoteError;
use crate::position::{Position, PositionKey};
use async_trait::async_trait;

/// Remote backend the coordinator talks to.
///
/// Implementations map `success: false` responses to [`RemoteError::Rejected`]
/// so callers only ever see the happy payload or an error.
#[async_trait]
pub trait TrailService: Send + Sync {
    /// Current open positions.
    async fn positions(&self, identity: &Identity) -> Result<Vec<Position>, RemoteError>;

    /// Submit an order. Returns the broker order id.
    async fn place_order(
        &self,
        identity: &Identity,
        order: &OrderRequest,
    ) -> Result<OrderId, RemoteError>;

    /// Register a trail against an already placed protective order.
    /// Returns the key the remote filed it under, if it says.
    async fn start_trail(
        &self,
        identity: &Identity,
        mode: TrailMode,
        request: &StartTrailRequest,
    ) -> Result<Option<String>, RemoteError>;

    /// Cancel the trail for a position.
    async fn stop_trail(&self, identity: &Identity, key: &PositionKey) -> Result<(), RemoteError>;

    /// Snapshot of every trail the remote is running.
    async fn trail_status(&self, identity: &Identity) -> Result<StatusSnapshot, RemoteError>;

    /// Market-exit every open position.
    async fn exit_all_positions(&self, identity: &Identity) -> Result<ExitAllResponse, RemoteError>;
}
