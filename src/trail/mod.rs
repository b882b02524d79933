// Copyright (C) 2025 Category Labs, Inc.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Trailing-stop lifecycle: registry, reconciliation loop and coordinator.

pub mod coordinator;
pub mod outcome;
pub mod reconciler;
pub mod registry;

pub use coordinator::{CoordinatorConfig, TrailCoordinator};
pub use outcome::{BatchResult, ExitAllSummary, ItemOutcome, TrailPlacement};
pub use reconciler::{spawn_reconciler, Reconciler};
pub use registry::{
    LogBuffer, ReconcileReport, RegistryView, TrailRegistration, TrailRegistry, TrailStatus,
    GRACE_MISSED_POLLS, MIN_LOG_CAPACITY,
};
