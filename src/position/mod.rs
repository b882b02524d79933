// Copyright (C) 2025 Category Labs, Inc.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Positions: broker snapshots, the refreshable book and the selection set.

pub mod book;
pub mod selection;
pub mod types;

pub use book::PositionBook;
pub use selection::SelectionSet;
pub use types::{Position, PositionKey};
