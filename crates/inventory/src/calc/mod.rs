//! The three costing calculators and the dispatcher over them.
//!
//! Every calculator is a pure function of `(&StockState, movement)`: calling
//! it twice on the same inputs yields the same result, and nothing is mutated.

mod layers;
mod weighted_average;

pub use layers::{calculate_fifo, calculate_lifo, receive_batch};
pub use weighted_average::calculate_weighted_average;

use crate::error::ValuationError;
use crate::method::ValuationMethod;
use crate::movement::{Direction, StockMovement};
use crate::result::ValuationResult;
use crate::state::StockState;

/// Value `movement` against `state` using `method`.
///
/// Inbound movements take the entry branch of the method (blend for CMP, new
/// batch for FIFO/LIFO); outbound ones the exit branch.
pub fn valuate(
    method: ValuationMethod,
    state: &StockState,
    movement: &StockMovement,
) -> Result<ValuationResult, ValuationError> {
    state.ensure_key(movement)?;
    let direction = movement.validate()?;

    match (method, direction) {
        (ValuationMethod::Cmp, _) => calculate_weighted_average(state, movement),
        (ValuationMethod::Fifo | ValuationMethod::Lifo, Direction::In) => {
            receive_batch(method, state, movement)
        }
        (ValuationMethod::Fifo, Direction::Out) => calculate_fifo(state, movement.quantity),
        (ValuationMethod::Lifo, Direction::Out) => calculate_lifo(state, movement.quantity),
    }
}

impl ValuationMethod {
    /// Shorthand for [`valuate`] with this method.
    pub fn valuate(
        self,
        state: &StockState,
        movement: &StockMovement,
    ) -> Result<ValuationResult, ValuationError> {
        valuate(self, state, movement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use stockval_core::{ProductId, TenantId, WarehouseId};

    use crate::movement::MovementType;
    use crate::result::ValuationDetails;
    use crate::state::StockKey;

    fn key() -> StockKey {
        StockKey::new(ProductId::new(), WarehouseId::new())
    }

    fn at(d: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn result_echoes_method() {
        let k = key();
        let tenant = TenantId::new();
        for method in ValuationMethod::ALL {
            let mut state = StockState::open(k);
            let r = state.record(method, &StockMovement::entry(k, tenant, at(1), 4.0, 2.5)).unwrap();
            assert_eq!(r.method, method);
            let r = method.valuate(&state, &StockMovement::exit(k, tenant, at(2), 1.0)).unwrap();
            assert_eq!(r.method, method);
        }
    }

    #[test]
    fn inbound_adjustment_follows_entry_branch() {
        let k = key();
        let tenant = TenantId::new();
        let state = StockState::open(k);
        let m = StockMovement::adjustment(k, tenant, at(1), Direction::In, 5.0, 3.0);

        let cmp = valuate(ValuationMethod::Cmp, &state, &m).unwrap();
        assert_eq!(cmp.weighted_average(), Some(3.0));

        let fifo = valuate(ValuationMethod::Fifo, &state, &m).unwrap();
        assert_eq!(fifo.batch_received().unwrap().quantity, 5.0);
    }

    #[test]
    fn outbound_transfer_follows_exit_branch() {
        let k = key();
        let tenant = TenantId::new();
        let mut state = StockState::open(k);
        state
            .record(ValuationMethod::Lifo, &StockMovement::entry(k, tenant, at(1), 10.0, 2.0))
            .unwrap();

        let m = StockMovement::transfer(k, tenant, at(2), Direction::Out, 4.0, 0.0);
        let r = valuate(ValuationMethod::Lifo, &state, &m).unwrap();
        assert!(matches!(r.details, ValuationDetails::BatchesConsumed(_)));
        assert_eq!(r.total_value, 8.0);
    }

    #[test]
    fn directionless_transfer_is_rejected_for_every_method() {
        let k = key();
        let state = StockState::open(k);
        let mut m = StockMovement::transfer(k, TenantId::new(), at(1), Direction::In, 1.0, 1.0);
        m.direction = None;
        for method in ValuationMethod::ALL {
            assert_eq!(
                valuate(method, &state, &m),
                Err(ValuationError::MissingDirection(MovementType::Transfer))
            );
        }
    }
}
