//! Rebuild a stock state from its journal.
//!
//! Every `Valued` record is recomputed against the state rebuilt so far and
//! must agree with what was recorded. A journal that folds cleanly yields a
//! state equal to the one the service stored.

use thiserror::Error;

use stockval_inventory::{
    StockKey, StockState, ValuationDetails, ValuationError, ValuationResult, approx_eq, valuate,
};

use crate::journal::{JournalRecord, StockJournalEvent};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReplayError {
    #[error("journal sequence broken: expected {expected}, found {found}")]
    NonMonotonicSequence { expected: u64, found: u64 },

    #[error("record {sequence} belongs to {found}, not {expected}")]
    ForeignRecord {
        sequence: u64,
        expected: StockKey,
        found: StockKey,
    },

    #[error("record {sequence} could not be replayed: {source}")]
    Valuation {
        sequence: u64,
        #[source]
        source: ValuationError,
    },

    #[error("record {sequence} diverges from its recomputation")]
    Divergence { sequence: u64 },
}

/// Fold `records` for `key` from an empty state.
pub fn replay(key: StockKey, records: &[JournalRecord]) -> Result<StockState, ReplayError> {
    let mut state = StockState::open(key);

    for (idx, record) in records.iter().enumerate() {
        let expected = idx as u64 + 1;
        let sequence = record.sequence_number();
        if sequence != expected {
            return Err(ReplayError::NonMonotonicSequence {
                expected,
                found: sequence,
            });
        }

        let event = record.payload();
        if event.key() != key {
            return Err(ReplayError::ForeignRecord {
                sequence,
                expected: key,
                found: event.key(),
            });
        }

        let failed = |source: ValuationError| ReplayError::Valuation { sequence, source };
        match event {
            StockJournalEvent::Valued {
                method,
                movement,
                result,
                quantity_after,
                value_after,
                unit_cost_after,
                ..
            } => {
                let recomputed = valuate(*method, &state, movement).map_err(failed)?;
                if !results_agree(result, &recomputed) {
                    return Err(ReplayError::Divergence { sequence });
                }
                state.apply(movement, &recomputed).map_err(failed)?;
                if !approx_eq(state.current_quantity(), *quantity_after)
                    || !approx_eq(state.current_value(), *value_after)
                    || !approx_eq(state.unit_cost(), *unit_cost_after)
                {
                    return Err(ReplayError::Divergence { sequence });
                }
            }
            StockJournalEvent::OpeningBalanceRecorded {
                quantity,
                value,
                as_of,
                ..
            } => {
                if sequence != 1 {
                    return Err(ReplayError::Divergence { sequence });
                }
                state = StockState::with_opening_balance(key, *quantity, *value, *as_of).map_err(failed)?;
            }
            StockJournalEvent::Rebaselined {
                quantity,
                unit_cost,
                opening_batch,
                as_of,
                ..
            } => {
                if !approx_eq(state.current_quantity(), *quantity) {
                    return Err(ReplayError::Divergence { sequence });
                }
                let opened = state.rebaseline(*as_of).map_err(failed)?;
                if opened != *opening_batch || (opened.is_some() && !approx_eq(state.unit_cost(), *unit_cost)) {
                    return Err(ReplayError::Divergence { sequence });
                }
            }
        }
        state.mark_persisted(event.recorded_at());
    }

    tracing::debug!(key = %key, records = records.len(), "journal replayed");
    Ok(state)
}

fn results_agree(recorded: &ValuationResult, recomputed: &ValuationResult) -> bool {
    if recorded.method != recomputed.method
        || !approx_eq(recorded.quantity, recomputed.quantity)
        || !approx_eq(recorded.total_value, recomputed.total_value)
        || !approx_eq(recorded.unit_cost, recomputed.unit_cost)
    {
        return false;
    }

    match (&recorded.details, &recomputed.details) {
        (ValuationDetails::WeightedAverage(a), ValuationDetails::WeightedAverage(b)) => approx_eq(*a, *b),
        (ValuationDetails::BatchReceived(a), ValuationDetails::BatchReceived(b)) => {
            a.id == b.id && approx_eq(a.quantity, b.quantity) && approx_eq(a.unit_price, b.unit_price)
        }
        (ValuationDetails::BatchesConsumed(a), ValuationDetails::BatchesConsumed(b)) => {
            a.len() == b.len()
                && a.iter().zip(b).all(|(x, y)| {
                    x.batch_id == y.batch_id
                        && approx_eq(x.quantity, y.quantity)
                        && approx_eq(x.remaining_quantity, y.remaining_quantity)
                })
        }
        _ => false,
    }
}
