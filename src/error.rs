// Copyright (C) 2025 Category Labs, Inc.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Error taxonomy for trail operations.

use crate::position::PositionKey;
use crate::rpc::OrderId;
use rust_decimal::Decimal;

/// Input problems caught before anything is sent to the remote service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("no position selected")]
    EmptySelection,

    #[error("expected exactly one selected position, found {0}")]
    MultipleSelection(usize),

    #[error("trail points must be positive, got {0}")]
    NonPositiveTrailPoints(Decimal),

    #[error("caller identity is missing")]
    MissingIdentity,

    #[error("position {0} has zero quantity")]
    FlatPosition(PositionKey),

    #[error("trail of {trail_points} points puts the stop for {key} at {trigger}")]
    NonPositiveStop {
        key: PositionKey,
        trail_points: Decimal,
        trigger: Decimal,
    },

    #[error("order quantity for {0} is out of range")]
    QuantityOverflow(PositionKey),

    #[error("invalid position key {0:?}, expected EXCHANGE:SYMBOL")]
    InvalidKey(String),
}

/// Failure talking to the remote order/trailing service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("remote returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("{0}")]
    Rejected(String),

    #[error("malformed response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// A `success: false` response, using the remote message when present.
    pub fn rejected(message: Option<String>, fallback: &str) -> Self {
        match message {
            Some(msg) if !msg.trim().is_empty() => RemoteError::Rejected(msg),
            _ => RemoteError::Rejected(fallback.to_string()),
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            RemoteError::Decode(e.to_string())
        } else {
            RemoteError::Transport(e.to_string())
        }
    }
}

/// Errors surfaced by coordinator operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrailError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("{0} is already being trailed")]
    AlreadyTrailing(PositionKey),

    /// The protective order is live at the broker but no trail covers it.
    #[error("order {order_id} for {key} is live but UNPROTECTED, trail registration failed: {source}")]
    PartialProtection {
        key: PositionKey,
        order_id: OrderId,
        source: RemoteError,
    },
}

impl TrailError {
    pub fn is_partial_protection(&self) -> bool {
        matches!(self, TrailError::PartialProtection { .. })
    }
}
