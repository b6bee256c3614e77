//! Stock valuation engine.
//!
//! Turns a stream of inventory movements into a running unit cost and total
//! value per product/warehouse, under one of three costing conventions:
//! weighted average (CMP), FIFO or LIFO.
//!
//! Pure domain logic only: no IO, no clocks, no persistence. Callers load a
//! [`StockState`], run [`valuate`] (or [`StockState::record`]) and persist the
//! updated state together with the returned [`ValuationResult`].

pub mod batch;
pub mod calc;
pub mod error;
pub mod method;
pub mod movement;
pub mod numeric;
pub mod result;
pub mod state;

pub use batch::{BatchId, BatchLedger, ConsumptionOrder, StockBatch};
pub use calc::{
    calculate_fifo, calculate_lifo, calculate_weighted_average, receive_batch, valuate,
};
pub use error::ValuationError;
pub use method::{AccountingStandard, ValuationMethod};
pub use movement::{Direction, MovementType, StockMovement};
pub use numeric::{approx_eq, round_currency};
pub use result::{ConsumedBatch, ValuationDetails, ValuationResult};
pub use state::{StockKey, StockState};
