//! Valuation snapshot for one product in one warehouse.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockval_core::{AggregateRoot, ProductId, WarehouseId};

use crate::batch::{BatchId, BatchLedger, ConsumptionOrder, StockBatch};
use crate::calc;
use crate::error::ValuationError;
use crate::method::ValuationMethod;
use crate::movement::{Direction, StockMovement};
use crate::numeric::{EPSILON, approx_eq, clamp_residue};
use crate::result::{ConsumedBatch, ValuationDetails, ValuationResult};

/// Looser bound used when checking accumulated state against its batches.
const DRIFT_TOLERANCE: f64 = 1e-6;

fn within_drift(a: f64, b: f64) -> bool {
    (a - b).abs() <= DRIFT_TOLERANCE * a.abs().max(b.abs()).max(1.0)
}

/// Composite identity of a stock state.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockKey {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
}

impl StockKey {
    pub fn new(product_id: ProductId, warehouse_id: WarehouseId) -> Self {
        Self {
            product_id,
            warehouse_id,
        }
    }
}

impl core::fmt::Display for StockKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}@{}", self.product_id, self.warehouse_id)
    }
}

/// Current valuation snapshot for one product/warehouse.
///
/// Quantities, value and unit cost are read-only from the outside. They only
/// change by folding a [`ValuationResult`] through [`StockState::apply`] (or
/// [`StockState::record`]), in movement order. A depleted state is a valid
/// terminal condition and keeps its batch history.
///
/// Under CMP the state is a running counter and `batches` is left alone. Under
/// FIFO/LIFO the open batches always sum to `current_quantity`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockState {
    #[serde(flatten)]
    key: StockKey,
    current_quantity: f64,
    current_value: f64,
    unit_cost: f64,
    #[serde(default)]
    batches: BatchLedger,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    version: u64,
}

impl StockState {
    /// Fresh state before the first entry: zero quantity, zero value.
    pub fn open(key: StockKey) -> Self {
        Self {
            key,
            current_quantity: 0.0,
            current_value: 0.0,
            unit_cost: 0.0,
            batches: BatchLedger::new(),
            last_updated: None,
            version: 0,
        }
    }

    /// State seeded from a balance carried over from another system.
    ///
    /// The balance becomes a single opening batch so the state is usable under
    /// any method.
    pub fn with_opening_balance(
        key: StockKey,
        quantity: f64,
        value: f64,
        as_of: DateTime<Utc>,
    ) -> Result<Self, ValuationError> {
        if !quantity.is_finite() || quantity < 0.0 {
            return Err(ValuationError::InvalidQuantity(quantity));
        }
        if !value.is_finite() || value < 0.0 {
            return Err(ValuationError::malformed(format!("opening value {value} is invalid")));
        }

        let mut state = Self::open(key);
        if quantity <= EPSILON {
            if value > EPSILON {
                return Err(ValuationError::malformed("opening value without quantity"));
            }
            return Ok(state);
        }

        let unit_cost = value / quantity;
        state.batches.insert(StockBatch {
            id: state.batches.next_id(),
            date: as_of,
            quantity,
            unit_price: unit_cost,
            remaining_quantity: quantity,
        })?;
        state.current_quantity = quantity;
        state.current_value = value;
        state.unit_cost = unit_cost;
        Ok(state)
    }

    pub fn key(&self) -> StockKey {
        self.key
    }

    pub fn product_id(&self) -> ProductId {
        self.key.product_id
    }

    pub fn warehouse_id(&self) -> WarehouseId {
        self.key.warehouse_id
    }

    pub fn current_quantity(&self) -> f64 {
        self.current_quantity
    }

    pub fn current_value(&self) -> f64 {
        self.current_value
    }

    /// Weighted average (CMP) or the price of the next batch to consume (FIFO/LIFO).
    pub fn unit_cost(&self) -> f64 {
        self.unit_cost
    }

    pub fn batches(&self) -> &BatchLedger {
        &self.batches
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    pub fn is_depleted(&self) -> bool {
        self.current_quantity <= EPSILON
    }

    /// Stamp the time the caller persisted this state.
    pub fn mark_persisted(&mut self, at: DateTime<Utc>) {
        self.last_updated = Some(at);
    }

    pub(crate) fn ensure_key(&self, movement: &StockMovement) -> Result<(), ValuationError> {
        if movement.key() != self.key {
            return Err(ValuationError::IdentityMismatch);
        }
        Ok(())
    }

    /// Check the accounting invariants that must hold between movements.
    pub fn check_invariants(&self, method: ValuationMethod) -> Result<(), ValuationError> {
        if !self.current_quantity.is_finite() || self.current_quantity < 0.0 {
            return Err(ValuationError::malformed(format!(
                "current quantity {} is negative or not finite",
                self.current_quantity
            )));
        }
        if !self.current_value.is_finite() || self.current_value < 0.0 {
            return Err(ValuationError::malformed(format!(
                "current value {} is negative or not finite",
                self.current_value
            )));
        }
        if self.is_depleted() && !within_drift(self.current_value, 0.0) {
            return Err(ValuationError::malformed("value held without quantity"));
        }

        if method.tracks_batches() {
            let open = self.batches.open_quantity();
            if !within_drift(open, self.current_quantity) {
                return Err(ValuationError::malformed(format!(
                    "batches hold {open} units but current quantity is {}",
                    self.current_quantity
                )));
            }
            let open_value = self.batches.open_value();
            if !within_drift(open_value, self.current_value) {
                return Err(ValuationError::malformed(format!(
                    "batches are worth {open_value} but current value is {}",
                    self.current_value
                )));
            }
        } else if !self.is_depleted()
            && !within_drift(self.current_value, self.current_quantity * self.unit_cost)
        {
            return Err(ValuationError::malformed(format!(
                "current value {} differs from {} x {}",
                self.current_value, self.current_quantity, self.unit_cost
            )));
        }

        Ok(())
    }

    /// Value `movement` under `method` and fold the result in.
    ///
    /// On error the state is unchanged.
    pub fn record(
        &mut self,
        method: ValuationMethod,
        movement: &StockMovement,
    ) -> Result<ValuationResult, ValuationError> {
        let result = calc::valuate(method, self, movement)?;
        self.apply(movement, &result)?;
        Ok(result)
    }

    /// Fold a result computed for `movement` into this state.
    ///
    /// All checks run before anything is written, so a rejected result leaves
    /// the state unchanged. Applying the same receipt twice is rejected because
    /// its batch id is already taken.
    pub fn apply(&mut self, movement: &StockMovement, result: &ValuationResult) -> Result<(), ValuationError> {
        self.ensure_key(movement)?;
        let direction = movement.validate()?;
        if !approx_eq(result.quantity, movement.quantity) {
            return Err(ValuationError::malformed(format!(
                "result quantity {} differs from movement quantity {}",
                result.quantity, movement.quantity
            )));
        }

        let method = result.method;
        match (&result.details, direction) {
            (ValuationDetails::WeightedAverage(average), Direction::In)
                if method == ValuationMethod::Cmp =>
            {
                self.current_quantity += result.quantity;
                self.current_value += result.total_value;
                self.unit_cost = *average;
            }
            (ValuationDetails::WeightedAverage(_), Direction::Out)
                if method == ValuationMethod::Cmp =>
            {
                self.take_out(result)?;
            }
            (ValuationDetails::BatchReceived(batch), Direction::In) if method.tracks_batches() => {
                self.batches.insert(batch.clone())?;
                self.current_quantity += result.quantity;
                self.current_value += result.total_value;
                self.refresh_layer_cost(method);
            }
            (ValuationDetails::BatchesConsumed(consumed), Direction::Out)
                if method.tracks_batches() =>
            {
                self.check_consumption(consumed)?;
                self.ensure_available(result.quantity)?;
                for c in consumed {
                    self.batches.set_remaining(c.batch_id, c.remaining_quantity)?;
                }
                self.take_out(result)?;
                self.refresh_layer_cost(method);
            }
            _ => {
                return Err(ValuationError::malformed(format!(
                    "{method} result details do not fit a {direction:?} movement"
                )));
            }
        }

        self.version += 1;
        Ok(())
    }

    /// Collapse remaining stock into one synthetic batch at the blended cost.
    ///
    /// Existing batches are depleted but kept. Returns the id of the opening
    /// batch, or `None` if nothing was on hand.
    pub fn rebaseline(&mut self, as_of: DateTime<Utc>) -> Result<Option<BatchId>, ValuationError> {
        let quantity = self.current_quantity;
        let opening = if quantity > EPSILON {
            let unit_cost = self.current_value / quantity;
            Some(StockBatch {
                id: self.batches.next_id(),
                date: as_of,
                quantity,
                unit_price: unit_cost,
                remaining_quantity: quantity,
            })
        } else {
            None
        };

        self.batches.close_all();
        let id = match opening {
            Some(batch) => {
                let id = batch.id;
                self.unit_cost = batch.unit_price;
                self.batches.insert(batch)?;
                Some(id)
            }
            None => None,
        };

        self.version += 1;
        Ok(id)
    }

    fn ensure_available(&self, quantity: f64) -> Result<(), ValuationError> {
        if quantity > self.current_quantity + EPSILON {
            return Err(ValuationError::InsufficientStock {
                requested: quantity,
                available: self.current_quantity,
            });
        }
        Ok(())
    }

    fn take_out(&mut self, result: &ValuationResult) -> Result<(), ValuationError> {
        self.ensure_available(result.quantity)?;
        let quantity = clamp_residue(self.current_quantity - result.quantity).max(0.0);
        self.current_value = if quantity == 0.0 {
            0.0
        } else {
            clamp_residue(self.current_value - result.total_value).max(0.0)
        };
        self.current_quantity = quantity;
        Ok(())
    }

    fn check_consumption(&self, consumed: &[ConsumedBatch]) -> Result<(), ValuationError> {
        let mut seen = BTreeSet::new();
        for c in consumed {
            if !seen.insert(c.batch_id) {
                return Err(ValuationError::malformed(format!(
                    "batch {} consumed twice in one result",
                    c.batch_id
                )));
            }
            let batch = self
                .batches
                .get(c.batch_id)
                .ok_or_else(|| ValuationError::malformed(format!("unknown batch {}", c.batch_id)))?;
            let expected = batch.remaining_quantity - c.quantity;
            if c.quantity <= 0.0 || expected < -EPSILON || !approx_eq(expected, c.remaining_quantity) {
                return Err(ValuationError::malformed(format!(
                    "batch {} cannot go from {} to {} by consuming {}",
                    c.batch_id, batch.remaining_quantity, c.remaining_quantity, c.quantity
                )));
            }
        }
        Ok(())
    }

    fn refresh_layer_cost(&mut self, method: ValuationMethod) {
        let order = match method {
            ValuationMethod::Lifo => ConsumptionOrder::NewestFirst,
            _ => ConsumptionOrder::OldestFirst,
        };
        if let Some(head) = self.batches.head(order) {
            self.unit_cost = head.unit_price;
        }
    }
}

impl AggregateRoot for StockState {
    type Id = StockKey;

    fn id(&self) -> &Self::Id {
        &self.key
    }

    fn version(&self) -> u64 {
        self.version
    }
}
