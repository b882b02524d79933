// Copyright (C) 2025 Category Labs, Inc.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Stop-loss price rules. Pure functions, no I/O.

use crate::error::ValidationError;
use crate::position::Position;
use crate::rpc::TransactionType;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

/// Exchange price tick.
pub const TICK_SIZE: Decimal = dec!(0.05);

/// Gap between trigger and limit, as a fraction of the trigger.
pub const LIMIT_BUFFER: Decimal = dec!(0.05);

/// Trigger and limit for a protective stop-loss order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopPrices {
    pub trigger: Decimal,
    pub limit: Decimal,
}

/// Round to the nearest tick, halves away from zero.
pub fn round_to_tick(price: Decimal) -> Decimal {
    (price / TICK_SIZE).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero) * TICK_SIZE
}

/// Derive stop prices `trail_points` away from the average price.
///
/// Assumes `trail_points > 0`; callers validate before getting here. Fails
/// if either price would not be positive.
pub fn compute_stop_prices(
    position: &Position,
    trail_points: Decimal,
) -> Result<StopPrices, ValidationError> {
    let long = position.is_long();
    let trigger = if long {
        position.average_price - trail_points
    } else {
        position.average_price + trail_points
    };
    let trigger = round_to_tick(trigger);

    let limit = if long {
        trigger * (Decimal::ONE - LIMIT_BUFFER)
    } else {
        trigger * (Decimal::ONE + LIMIT_BUFFER)
    };

    let limit = round_to_tick(limit);

    if trigger <= Decimal::ZERO || limit <= Decimal::ZERO {
        return Err(ValidationError::NonPositiveStop {
            key: position.key(),
            trail_points,
            trigger,
        });
    }
    Ok(StopPrices { trigger, limit })
}

/// Side that closes the position: long -> SELL, short -> BUY.
pub fn exit_side(position: &Position) -> TransactionType {
    if position.is_long() {
        TransactionType::Sell
    } else {
        TransactionType::Buy
    }
}

/// Quantity that flattens the position.
pub fn exit_quantity(position: &Position) -> u64 {
    position.quantity.unsigned_abs()
}

/// Quantity that flattens and re-opens the opposite way in one order.
pub fn reversal_quantity(position: &Position) -> Result<u64, ValidationError> {
    position
        .quantity
        .unsigned_abs()
        .checked_mul(2)
        .ok_or_else(|| ValidationError::QuantityOverflow(position.key()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::types::test_position;
    use proptest::prelude::*;

    #[test]
    fn long_scenario() {
        let position = test_position("NSE", "INFY", 10, dec!(100.00));
        let prices = compute_stop_prices(&position, dec!(2)).unwrap();
        assert_eq!(prices.trigger, dec!(98.00));
        assert_eq!(prices.limit, dec!(93.10));
    }

    #[test]
    fn short_scenario() {
        let position = test_position("NSE", "INFY", -10, dec!(100.00));
        let prices = compute_stop_prices(&position, dec!(2)).unwrap();
        assert_eq!(prices.trigger, dec!(102.00));
        assert_eq!(prices.limit, dec!(107.10));
    }

    #[test]
    fn trigger_snaps_to_tick() {
        let position = test_position("NSE", "INFY", 1, dec!(101.37));
        let prices = compute_stop_prices(&position, dec!(1.5)).unwrap();
        // 99.87 -> 99.85, 99.85 * 0.95 = 94.8575 -> 94.85
        assert_eq!(prices.trigger, dec!(99.85));
        assert_eq!(prices.limit, dec!(94.85));
    }

    #[test]
    fn halves_round_up() {
        assert_eq!(round_to_tick(dec!(10.025)), dec!(10.05));
        assert_eq!(round_to_tick(dec!(10.024)), dec!(10.00));
    }

    #[test]
    fn exit_and_reversal_orders() {
        let long = test_position("NSE", "INFY", 25, dec!(100));
        let short = test_position("NSE", "TCS", -7, dec!(100));

        assert_eq!(exit_side(&long), TransactionType::Sell);
        assert_eq!(exit_side(&short), TransactionType::Buy);
        assert_eq!(exit_quantity(&short), 7);
        assert_eq!(reversal_quantity(&long), Ok(50));
        assert_eq!(reversal_quantity(&short), Ok(14));
    }

    #[test]
    fn reversal_of_extreme_quantity_is_rejected() {
        let huge = test_position("NSE", "INFY", i64::MIN, dec!(100));
        assert_eq!(
            reversal_quantity(&huge),
            Err(ValidationError::QuantityOverflow(huge.key()))
        );
        assert_eq!(exit_quantity(&huge), 1u64 << 63);
    }

    #[test]
    fn stop_at_or_below_zero_is_rejected() {
        let cheap = test_position("NSE", "PENNY", 100, dec!(2.00));
        assert!(matches!(
            compute_stop_prices(&cheap, dec!(2)),
            Err(ValidationError::NonPositiveStop { trigger, .. }) if trigger.is_zero()
        ));
        assert!(compute_stop_prices(&cheap, dec!(5)).is_err());

        // The short side only moves away from zero.
        let short = test_position("NSE", "PENNY", -100, dec!(2.00));
        assert!(compute_stop_prices(&short, dec!(5)).is_ok());
    }

    fn cents(range: std::ops::Range<i64>) -> impl Strategy<Value = Decimal> {
        range.prop_map(|c| Decimal::new(c, 2))
    }

    proptest! {
        #[test]
        fn trigger_sits_on_the_protective_side(
            avg in cents(10_000..1_000_000),
            points in cents(10..5_000),
            qty in prop_oneof![1i64..1_000, -1_000i64..-1],
        ) {
            let position = test_position("NSE", "X", qty, avg);
            let Ok(prices) = compute_stop_prices(&position, points) else {
                prop_assert!(qty > 0);
                return Ok(());
            };
            if qty > 0 {
                prop_assert!(prices.trigger < avg);
                prop_assert!(prices.limit <= prices.trigger);
            } else {
                prop_assert!(prices.trigger > avg);
                prop_assert!(prices.limit >= prices.trigger);
            }
        }

        #[test]
        fn outputs_are_tick_multiples(
            avg in cents(100..1_000_000),
            points in cents(1..5_000),
            qty in prop_oneof![1i64..1_000, -1_000i64..-1],
        ) {
            let position = test_position("NSE", "X", qty, avg);
            if let Ok(prices) = compute_stop_prices(&position, points) {
                prop_assert!(prices.trigger > Decimal::ZERO);
                prop_assert!((prices.trigger % TICK_SIZE).is_zero());
                prop_assert!((prices.limit % TICK_SIZE).is_zero());
            }
        }
    }
}
