// Copyright (C) 2025 Category Labs, Inc.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Latest positions snapshot from the broker.

use crate::error::RemoteError;
use crate::position::{Position, PositionKey};
use crate::rpc::{Identity, TrailService};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info};

/// Holds the most recent positions refresh. Each refresh replaces the
/// whole book; entries are never patched in place.
#[derive(Debug, Default)]
pub struct PositionBook {
    positions: Vec<Position>,
    refreshed_at: Option<DateTime<Utc>>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch positions from the broker and replace the book.
    pub async fn refresh(
        &mut self,
        service: &dyn TrailService,
        identity: &Identity,
    ) -> Result<usize, RemoteError> {
        let positions = service.positions(identity).await?;
        self.replace(positions);
        info!("📊 Loaded {} open positions", self.positions.len());
        Ok(self.positions.len())
    }

    pub fn replace(&mut self, positions: Vec<Position>) {
        self.positions = positions;
        self.refreshed_at = Some(Utc::now());
        debug!("Position book replaced ({} positions)", self.positions.len());
    }

    pub fn get(&self, key: &PositionKey) -> Option<&Position> {
        self.positions.iter().find(|p| &p.key() == key)
    }

    pub fn all(&self) -> &[Position] {
        &self.positions
    }

    pub fn total_pnl(&self) -> Decimal {
        self.positions.iter().map(Position::pnl).sum()
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::types::test_position;
    use crate::rpc::mock::MockTrailService;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn refresh_replaces_wholesale() {
        let service = MockTrailService::builder()
            .with_position(test_position("NSE", "INFY", 10, dec!(100)))
            .build();
        let identity = Identity::new("AB1234").unwrap();

        let mut book = PositionBook::new();
        book.replace(vec![
            test_position("NSE", "OLD1", 1, dec!(1)),
            test_position("NSE", "OLD2", 1, dec!(1)),
        ]);

        assert_eq!(book.refresh(&service, &identity).await.unwrap(), 1);
        assert!(book.get(&PositionKey::new("NSE", "OLD1")).is_none());
        assert!(book.get(&PositionKey::new("NSE", "INFY")).is_some());
        assert!(book.refreshed_at().is_some());
    }

    #[test]
    fn total_pnl_sums_positions() {
        let mut winner = test_position("NSE", "A", 10, dec!(100));
        winner.last_price = dec!(110);
        let mut loser = test_position("NSE", "B", 1, dec!(50));
        loser.pnl = Some(dec!(-30));

        let mut book = PositionBook::new();
        book.replace(vec![winner, loser]);
        assert_eq!(book.total_pnl(), dec!(70));
    }
}
