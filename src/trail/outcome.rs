// Copyright (C) 2025 Category Labs, Inc.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Per-position results of batch operations.

use crate::error::TrailError;
use crate::position::PositionKey;
use crate::pricing::StopPrices;
use crate::rpc::{ExitAllResponse, ExitResult, OrderId, TransactionType};
use tracing::warn;

/// A protective order with a trail registered against it.
#[derive(Debug, Clone, PartialEq)]
pub struct TrailPlacement {
    pub key: PositionKey,
    pub order_id: OrderId,
    pub prices: StopPrices,
    pub transaction_type: TransactionType,
    pub quantity: u64,
}

/// Exactly one of these per requested position.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemOutcome {
    pub key: PositionKey,
    pub result: Result<TrailPlacement, TrailError>,
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Live order with no trail covering it.
    pub fn is_unprotected(&self) -> bool {
        matches!(&self.result, Err(e) if e.is_partial_protection())
    }

    pub fn error_message(&self) -> Option<String> {
        self.result.as_ref().err().map(ToString::to_string)
    }
}

/// Outcome of `start_trail` over a set of positions.
///
/// Partial protection outcomes mean real orders sit at the broker without
/// a trail; check [`BatchResult::unprotected`].
#[must_use = "a batch may contain live orders that are not protected by a trail"]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResult {
    outcomes: Vec<ItemOutcome>,
}

impl BatchResult {
    pub fn new(outcomes: Vec<ItemOutcome>) -> Self {
        Self { outcomes }
    }

    pub fn outcomes(&self) -> &[ItemOutcome] {
        &self.outcomes
    }

    pub fn get(&self, key: &PositionKey) -> Option<&ItemOutcome> {
        self.outcomes.iter().find(|o| &o.key == key)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(ItemOutcome::is_success)
    }

    /// `(key, order id)` of every order left without trail coverage.
    pub fn unprotected(&self) -> impl Iterator<Item = (&PositionKey, &OrderId)> {
        self.outcomes.iter().filter_map(|o| match &o.result {
            Err(TrailError::PartialProtection { key, order_id, .. }) => Some((key, order_id)),
            _ => None,
        })
    }
}

/// Exit-all result with counts that always agree with the records.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitAllSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<ExitResult>,
}

impl ExitAllSummary {
    pub fn from_results(results: Vec<ExitResult>) -> Self {
        let successful = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            successful,
            failed: results.len() - successful,
            results,
        }
    }
}

impl From<ExitAllResponse> for ExitAllSummary {
    fn from(response: ExitAllResponse) -> Self {
        let summary = Self::from_results(response.results);
        if (response.total, response.successful, response.failed)
            != (summary.total, summary.successful, summary.failed)
        {
            warn!(
                "Exit-all counts from remote ({}/{}/{}) disagree with its results ({}/{}/{})",
                response.total,
                response.successful,
                response.failed,
                summary.total,
                summary.successful,
                summary.failed
            );
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use rust_decimal_macros::dec;

    fn exit_result(symbol: &str, success: bool) -> ExitResult {
        ExitResult {
            symbol: symbol.to_string(),
            success,
            order_id: success.then(|| OrderId::from("9")),
            quantity: Some(10),
            error: (!success).then(|| "insufficient margin".to_string()),
        }
    }

    #[test]
    fn exit_all_summary_counts_every_record() {
        let response = ExitAllResponse {
            success: false,
            total: 3,
            successful: 2,
            failed: 1,
            results: vec![
                exit_result("INFY", true),
                exit_result("TCS", false),
                exit_result("SBIN", true),
            ],
            error: None,
        };

        let summary = ExitAllSummary::from(response);
        assert_eq!((summary.total, summary.successful, summary.failed), (3, 2, 1));
        assert_eq!(summary.results.len(), 3);
    }

    #[test]
    fn summary_trusts_records_over_remote_counts() {
        let response = ExitAllResponse {
            success: true,
            total: 5,
            successful: 5,
            failed: 0,
            results: vec![exit_result("INFY", true)],
            error: None,
        };
        let summary = ExitAllSummary::from(response);
        assert_eq!((summary.total, summary.successful, summary.failed), (1, 1, 0));
    }

    #[test]
    fn batch_reports_unprotected_orders() {
        let key = PositionKey::new("NSE", "INFY");
        let ok = ItemOutcome {
            key: PositionKey::new("NSE", "TCS"),
            result: Ok(TrailPlacement {
                key: PositionKey::new("NSE", "TCS"),
                order_id: OrderId::from("1"),
                prices: StopPrices {
                    trigger: dec!(98),
                    limit: dec!(93.1),
                },
                transaction_type: TransactionType::Sell,
                quantity: 1,
            }),
        };
        let partial = ItemOutcome {
            key: key.clone(),
            result: Err(TrailError::PartialProtection {
                key: key.clone(),
                order_id: OrderId::from("123"),
                source: RemoteError::Rejected("engine down".into()),
            }),
        };

        let batch = BatchResult::new(vec![ok, partial]);
        assert_eq!(batch.succeeded(), 1);
        assert_eq!(batch.failed(), 1);
        assert!(!batch.all_succeeded());
        let unprotected: Vec<_> = batch.unprotected().collect();
        assert_eq!(unprotected, vec![(&key, &OrderId::from("123"))]);
        assert!(batch.get(&key).unwrap().is_unprotected());
    }
}
