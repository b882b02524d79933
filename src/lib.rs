// Copyright (C) 2025 Category Labs, Inc.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Trail Keeper - trailing stop-loss lifecycle client for a remote
//! order-routing and trailing service.

pub mod config;
pub mod error;
pub mod journal;
pub mod position;
pub mod pricing;
pub mod rpc;
pub mod telegram;
pub mod trail;

pub use config::Config;
pub use error::{RemoteError, TrailError, ValidationError};
pub use position::{Position, PositionBook, PositionKey, SelectionSet};
pub use trail::{BatchResult, CoordinatorConfig, TrailCoordinator};
