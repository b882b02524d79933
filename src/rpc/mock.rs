// Copyright (C) 2025 Category Labs, Inc.
// SPDX-License-Identifier: GPL-3.0-or-later

//! In-memory [`TrailService`] that records calls and returns scripted responses.
//!
//! ```ignore
//! let service = MockTrailService::builder()
//!     .next_order_id(123)
//!     .reject_trail("NSE:INFY", "trail engine offline")
//!     .build();
//! ```

use super::service::TrailService;
use super::types::{
    ExitAllResponse, Identity, OrderId, OrderRequest, StartTrailRequest, StatusSnapshot,
    TrailMode,
};
use crate::error::RemoteError;
use crate::position::{Position, PositionKey};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

/// A recorded remote call, for assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    Positions,
    PlaceOrder(OrderRequest),
    StartTrail(TrailMode, StartTrailRequest),
    StopTrail(PositionKey),
    TrailStatus,
    ExitAll,
}

#[derive(Debug, Default)]
struct MockState {
    positions: Vec<Position>,
    next_order_id: u64,
    order_errors: HashMap<PositionKey, String>,
    trail_errors: HashMap<PositionKey, String>,
    stop_error: Option<String>,
    status_queue: VecDeque<Result<StatusSnapshot, RemoteError>>,
    default_status: StatusSnapshot,
    exit_all: ExitAllResponse,
    calls: Vec<RecordedCall>,
}

/// Builder for [`MockTrailService`].
#[derive(Debug, Default)]
pub struct MockTrailServiceBuilder {
    state: MockState,
    status_gate: Option<Arc<Notify>>,
    trail_gate: Option<Arc<Notify>>,
}

impl MockTrailServiceBuilder {
    pub fn with_position(mut self, position: Position) -> Self {
        self.state.positions.push(position);
        self
    }

    pub fn next_order_id(mut self, id: u64) -> Self {
        self.state.next_order_id = id;
        self
    }

    /// Reject `place-order` for this key.
    pub fn reject_order(mut self, key: &str, message: &str) -> Self {
        self.state.order_errors.insert(parse_key(key), message.to_string());
        self
    }

    /// Reject trail registration for this key (after the order goes through).
    pub fn reject_trail(mut self, key: &str, message: &str) -> Self {
        self.state.trail_errors.insert(parse_key(key), message.to_string());
        self
    }

    pub fn reject_stop(mut self, message: &str) -> Self {
        self.state.stop_error = Some(message.to_string());
        self
    }

    /// Snapshot returned whenever the scripted queue is empty.
    pub fn default_status(mut self, snapshot: StatusSnapshot) -> Self {
        self.state.default_status = snapshot;
        self
    }

    pub fn exit_all(mut self, response: ExitAllResponse) -> Self {
        self.state.exit_all = response;
        self
    }

    /// Make every `trail-status` call wait for a permit on the gate.
    pub fn hold_status(mut self, gate: Arc<Notify>) -> Self {
        self.status_gate = Some(gate);
        self
    }

    /// Make every trail registration wait for a permit on the gate.
    pub fn hold_trail(mut self, gate: Arc<Notify>) -> Self {
        self.trail_gate = Some(gate);
        self
    }

    pub fn build(self) -> MockTrailService {
        MockTrailService {
            state: Mutex::new(self.state),
            status_gate: self.status_gate,
            trail_gate: self.trail_gate,
        }
    }
}

/// Scripted stand-in for the remote service.
#[derive(Debug)]
pub struct MockTrailService {
    state: Mutex<MockState>,
    status_gate: Option<Arc<Notify>>,
    trail_gate: Option<Arc<Notify>>,
}

impl MockTrailService {
    pub fn builder() -> MockTrailServiceBuilder {
        MockTrailServiceBuilder {
            state: MockState {
                next_order_id: 1,
                ..MockState::default()
            },
            status_gate: None,
            trail_gate: None,
        }
    }

    /// Queue the next `trail-status` result.
    pub fn push_status(&self, result: Result<StatusSnapshot, RemoteError>) {
        self.lock().status_queue.push_back(result);
    }

    pub fn set_default_status(&self, snapshot: StatusSnapshot) {
        self.lock().default_status = snapshot;
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    pub fn count_calls(&self, pred: impl Fn(&RecordedCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| pred(c)).count()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A panic inside a test thread poisons the lock; the data is still usable.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn parse_key(raw: &str) -> PositionKey {
    raw.parse()
        .unwrap_or_else(|_| panic!("mock configured with bad key {raw:?}"))
}

#[async_trait]
impl TrailService for MockTrailService {
    async fn positions(&self, _identity: &Identity) -> Result<Vec<Position>, RemoteError> {
        let mut state = self.lock();
        state.calls.push(RecordedCall::Positions);
        Ok(state.positions.clone())
    }

    async fn place_order(
        &self,
        _identity: &Identity,
        order: &OrderRequest,
    ) -> Result<OrderId, RemoteError> {
        let mut state = self.lock();
        state.calls.push(RecordedCall::PlaceOrder(order.clone()));
        if let Some(message) = state.order_errors.get(&order.key()) {
            return Err(RemoteError::Rejected(message.clone()));
        }
        let id = state.next_order_id;
        state.next_order_id += 1;
        Ok(OrderId(id.to_string()))
    }

    async fn start_trail(
        &self,
        _identity: &Identity,
        mode: TrailMode,
        request: &StartTrailRequest,
    ) -> Result<Option<String>, RemoteError> {
        let result = {
            let mut state = self.lock();
            state.calls.push(RecordedCall::StartTrail(mode, request.clone()));
            match state.trail_errors.get(&request.key()) {
                Some(message) => Err(RemoteError::Rejected(message.clone())),
                None => Ok(Some(request.key().to_string())),
            }
        };
        if let Some(gate) = &self.trail_gate {
            gate.notified().await;
        }
        result
    }

    async fn stop_trail(&self, _identity: &Identity, key: &PositionKey) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.calls.push(RecordedCall::StopTrail(key.clone()));
        match &state.stop_error {
            Some(message) => Err(RemoteError::Rejected(message.clone())),
            None => Ok(()),
        }
    }

    async fn trail_status(&self, _identity: &Identity) -> Result<StatusSnapshot, RemoteError> {
        let result = {
            let mut state = self.lock();
            state.calls.push(RecordedCall::TrailStatus);
            match state.status_queue.pop_front() {
                Some(scripted) => scripted,
                None => Ok(state.default_status.clone()),
            }
        };
        if let Some(gate) = &self.status_gate {
            gate.notified().await;
        }
        result
    }

    async fn exit_all_positions(&self, _identity: &Identity) -> Result<ExitAllResponse, RemoteError> {
        let mut state = self.lock();
        state.calls.push(RecordedCall::ExitAll);
        Ok(state.exit_all.clone())
    }
}
