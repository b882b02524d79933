// Copyright (C) 2025 Category Labs, Inc.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Remote order-routing and trailing service: contract, HTTP client, mock.

pub mod mock;
mod provider;
mod service;
mod types;

pub use provider::{HttpTrailService, RpcConfig, IDENTITY_HEADER};
pub use service::TrailService;
pub use types::{
    ExitAllResponse, ExitResult, Identity, LogEntry, OrderId, OrderRequest, OrderType,
    RemoteTrailStatus, StartTrailRequest, StatusSnapshot, TrailFields, TrailMode,
    TransactionType,
};
