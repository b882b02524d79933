// Copyright (C) 2025 Category Labs, Inc.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Positions picked by the trader for batch operations.

use crate::error::ValidationError;
use crate::position::{Position, PositionKey};
use tracing::debug;

/// Insertion-ordered set of positions, unique by [`PositionKey`].
///
/// `toggle` is the only way in, so toggling twice always restores the set.
#[derive(Debug, Clone, Default)]
pub struct SelectionSet {
    selected: Vec<Position>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the position, or remove it if one with the same key is present.
    /// Returns whether the position is selected afterwards.
    pub fn toggle(&mut self, position: Position) -> bool {
        let key = position.key();
        match self.selected.iter().position(|p| p.key() == key) {
            Some(idx) => {
                self.selected.remove(idx);
                debug!("Deselected {}", key);
                false
            }
            None => {
                self.selected.push(position);
                debug!("Selected {}", key);
                true
            }
        }
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    pub fn contains(&self, key: &PositionKey) -> bool {
        self.selected.iter().any(|p| &p.key() == key)
    }

    /// Selected positions in the order they were picked.
    pub fn all(&self) -> &[Position] {
        &self.selected
    }

    /// The single selected position, for exit/reverse style actions.
    pub fn single(&self) -> Result<&Position, ValidationError> {
        match self.selected.as_slice() {
            [] => Err(ValidationError::EmptySelection),
            [only] => Ok(only),
            many => Err(ValidationError::MultipleSelection(many.len())),
        }
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::types::test_position;
    use rust_decimal_macros::dec;

    #[test]
    fn double_toggle_restores_selection() {
        let mut selection = SelectionSet::new();
        selection.toggle(test_position("NSE", "INFY", 10, dec!(100)));
        selection.toggle(test_position("NSE", "TCS", -5, dec!(3500)));
        let before: Vec<PositionKey> = selection.all().iter().map(Position::key).collect();

        let extra = test_position("BSE", "SBIN", 1, dec!(600));
        assert!(selection.toggle(extra.clone()));
        assert!(!selection.toggle(extra));

        let after: Vec<PositionKey> = selection.all().iter().map(Position::key).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn identity_is_by_key_not_snapshot() {
        let mut selection = SelectionSet::new();
        selection.toggle(test_position("NSE", "INFY", 10, dec!(100)));

        // A refreshed snapshot of the same position deselects it.
        let refreshed = test_position("NSE", "INFY", 15, dec!(101));
        assert!(!selection.toggle(refreshed));
        assert!(selection.is_empty());
    }

    #[test]
    fn keeps_insertion_order() {
        let mut selection = SelectionSet::new();
        for symbol in ["C", "A", "B"] {
            selection.toggle(test_position("NSE", symbol, 1, dec!(10)));
        }
        let symbols: Vec<&str> = selection.all().iter().map(|p| p.symbol.as_str()).collect();
        assert_eq!(symbols, ["C", "A", "B"]);
        assert!(selection.contains(&PositionKey::new("NSE", "A")));
    }

    #[test]
    fn single_requires_exactly_one() {
        let mut selection = SelectionSet::new();
        assert_eq!(selection.single(), Err(ValidationError::EmptySelection));

        selection.toggle(test_position("NSE", "INFY", 10, dec!(100)));
        assert_eq!(selection.single().unwrap().symbol, "INFY");

        selection.toggle(test_position("NSE", "TCS", 10, dec!(100)));
        assert_eq!(selection.single(), Err(ValidationError::MultipleSelection(2)));

        selection.clear();
        assert!(selection.is_empty());
    }
}
