use crate::error::ValuationError;
use crate::method::ValuationMethod;
use crate::movement::{Direction, StockMovement};
use crate::numeric::EPSILON;
use crate::result::{ValuationDetails, ValuationResult};
use crate::state::StockState;

/// Weighted average cost (CMP).
///
/// Entry: the new average is
/// `(current_value + quantity * unit_price) / (current_quantity + quantity)`;
/// the result's `total_value` is the entry at its own price and `unit_cost` the
/// new average.
///
/// Exit: valued at the current average, which the exit does not change. The
/// aggregate quantity on hand bounds the exit.
pub fn calculate_weighted_average(
    state: &StockState,
    movement: &StockMovement,
) -> Result<ValuationResult, ValuationError> {
    state.ensure_key(movement)?;
    let quantity = movement.quantity;

    match movement.validate()? {
        Direction::In => {
            let entry_value = movement.inbound_value();
            let total_quantity = state.current_quantity() + quantity;
            if total_quantity <= EPSILON {
                return Err(ValuationError::malformed(
                    "weighted average over zero quantity",
                ));
            }
            let average = (state.current_value() + entry_value) / total_quantity;

            Ok(ValuationResult {
                quantity,
                total_value: entry_value,
                unit_cost: average,
                method: ValuationMethod::Cmp,
                details: ValuationDetails::WeightedAverage(average),
            })
        }
        Direction::Out => {
            let available = state.current_quantity();
            if quantity > available + EPSILON {
                tracing::debug!(
                    stock = %state.key(),
                    requested = quantity,
                    available,
                    "CMP exit exceeds quantity on hand"
                );
                return Err(ValuationError::InsufficientStock {
                    requested: quantity,
                    available,
                });
            }
            let cost = state.unit_cost();

            Ok(ValuationResult {
                quantity,
                total_value: quantity * cost,
                unit_cost: cost,
                method: ValuationMethod::Cmp,
                details: ValuationDetails::WeightedAverage(cost),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use proptest::prelude::*;
    use stockval_core::{ProductId, TenantId, WarehouseId};

    use crate::numeric::{approx_eq, round_currency};
    use crate::state::StockKey;

    fn key() -> StockKey {
        StockKey::new(ProductId::new(), WarehouseId::new())
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 20, 0, 0, 0).unwrap()
    }

    fn seeded(k: StockKey, quantity: f64, value: f64) -> StockState {
        let mut state = StockState::open(k);
        if quantity > 0.0 {
            state
                .record(
                    ValuationMethod::Cmp,
                    &StockMovement::entry(k, TenantId::new(), at(), quantity, value / quantity),
                )
                .unwrap();
        }
        state
    }

    #[test]
    fn entry_blends_into_average() {
        let k = key();
        let state = seeded(k, 100.0, 1000.0);
        let m = StockMovement::entry(k, TenantId::new(), at(), 50.0, 12.0);

        let r = calculate_weighted_average(&state, &m).unwrap();
        assert_eq!(round_currency(r.unit_cost), 10.67);
        assert_eq!(r.weighted_average(), Some(r.unit_cost));
        assert_eq!(r.total_value, 600.0);
        assert_eq!(r.quantity, 50.0);
        assert_eq!(r.method, ValuationMethod::Cmp);
    }

    #[test]
    fn first_entry_takes_its_own_price() {
        let k = key();
        let state = StockState::open(k);
        let m = StockMovement::entry(k, TenantId::new(), at(), 8.0, 4.25);

        let r = calculate_weighted_average(&state, &m).unwrap();
        assert_eq!(r.unit_cost, 4.25);
        assert_eq!(r.total_value, 34.0);
    }

    #[test]
    fn exit_is_valued_at_current_average() {
        let k = key();
        let state = seeded(k, 150.0, 1600.0);
        let m = StockMovement::exit(k, TenantId::new(), at(), 30.0);

        let r = calculate_weighted_average(&state, &m).unwrap();
        assert_eq!(r.unit_cost, state.unit_cost());
        assert!(approx_eq(r.total_value, 30.0 * 1600.0 / 150.0));
        assert_eq!(r.weighted_average(), Some(state.unit_cost()));
    }

    #[test]
    fn exit_beyond_quantity_is_insufficient_stock() {
        let k = key();
        let state = seeded(k, 10.0, 100.0);
        let m = StockMovement::exit(k, TenantId::new(), at(), 10.5);

        assert_eq!(
            calculate_weighted_average(&state, &m),
            Err(ValuationError::InsufficientStock {
                requested: 10.5,
                available: 10.0
            })
        );
    }

    #[test]
    fn free_entry_dilutes_average() {
        let k = key();
        let mut state = seeded(k, 10.0, 100.0);
        state
            .record(ValuationMethod::Cmp, &StockMovement::entry(k, TenantId::new(), at(), 10.0, 0.0))
            .unwrap();
        assert_eq!(state.unit_cost(), 5.0);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: each entry moves the average to somewhere between the
        /// previous average and the entry price.
        #[test]
        fn entries_blend_monotonically(
            entries in prop::collection::vec((0.01f64..10_000.0, 0.0f64..1_000.0), 1..20)
        ) {
            let k = key();
            let tenant = TenantId::new();
            let mut state = StockState::open(k);

            for (i, (quantity, price)) in entries.into_iter().enumerate() {
                let previous = state.unit_cost();
                let r = state
                    .record(ValuationMethod::Cmp, &StockMovement::entry(k, tenant, at(), quantity, price))
                    .unwrap();

                if i == 0 {
                    prop_assert!(approx_eq(r.unit_cost, price));
                } else {
                    let lo = previous.min(price);
                    let hi = previous.max(price);
                    prop_assert!(r.unit_cost >= lo - 1e-9 * hi.max(1.0));
                    prop_assert!(r.unit_cost <= hi + 1e-9 * hi.max(1.0));
                }
                prop_assert!(state.check_invariants(ValuationMethod::Cmp).is_ok());
            }
        }

        /// Property: exits never change the average.
        #[test]
        fn exit_keeps_average(
            quantity in 1.0f64..10_000.0,
            price in 0.01f64..1_000.0,
            fraction in 0.0f64..=1.0,
        ) {
            let k = key();
            let mut state = seeded(k, quantity, quantity * price);
            let before = state.unit_cost();
            let out = (quantity * fraction).max(0.001).min(quantity);

            state
                .record(ValuationMethod::Cmp, &StockMovement::exit(k, TenantId::new(), at(), out))
                .unwrap();

            prop_assert_eq!(state.unit_cost(), before);
            prop_assert!(state.current_quantity() >= 0.0);
            prop_assert!(state.current_value() >= 0.0);
        }

        /// Property: the calculator is deterministic and does not mutate.
        #[test]
        fn recomputation_is_identical(
            quantity in 1.0f64..1_000.0,
            price in 0.0f64..100.0,
            out in 0.1f64..1.0,
        ) {
            let k = key();
            let state = seeded(k, quantity, quantity * price);
            let snapshot = state.clone();
            let m = StockMovement::exit(k, TenantId::new(), at(), out);

            let first = calculate_weighted_average(&state, &m).unwrap();
            let second = calculate_weighted_average(&state, &m).unwrap();
            prop_assert_eq!(first, second);
            prop_assert_eq!(state, snapshot);
        }
    }
}
