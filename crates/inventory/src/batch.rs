//! Receipt lots and the ledger that orders them for consumption.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValuationError;
use crate::numeric::{EPSILON, clamp_residue};

/// Monotonic identifier of a batch within one stock state.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(u64);

impl BatchId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for BatchId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A receipt lot still partially or fully on hand.
///
/// `quantity` and `unit_price` never change after receipt;
/// `0 <= remaining_quantity <= quantity` always holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockBatch {
    pub id: BatchId,
    pub date: DateTime<Utc>,
    pub quantity: f64,
    pub unit_price: f64,
    pub remaining_quantity: f64,
}

impl StockBatch {
    pub fn is_open(&self) -> bool {
        self.remaining_quantity > EPSILON
    }

    pub fn remaining_value(&self) -> f64 {
        self.remaining_quantity * self.unit_price
    }

    fn check(&self) -> Result<(), ValuationError> {
        if !self.quantity.is_finite() || self.quantity <= 0.0 {
            return Err(ValuationError::malformed(format!(
                "batch {} has invalid quantity {}",
                self.id, self.quantity
            )));
        }
        if !self.unit_price.is_finite() || self.unit_price < 0.0 {
            return Err(ValuationError::malformed(format!(
                "batch {} has invalid unit price {}",
                self.id, self.unit_price
            )));
        }
        check_remaining(self.id, self.quantity, self.remaining_quantity)
    }
}

fn check_remaining(id: BatchId, quantity: f64, remaining: f64) -> Result<(), ValuationError> {
    if !remaining.is_finite() || remaining < -EPSILON || remaining > quantity + EPSILON {
        return Err(ValuationError::malformed(format!(
            "batch {id} remaining quantity {remaining} outside 0..={quantity}"
        )));
    }
    Ok(())
}

/// Traversal direction over open batches.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConsumptionOrder {
    /// Ascending receipt date (FIFO).
    OldestFirst,
    /// Descending receipt date (LIFO).
    NewestFirst,
}

/// Arena of batches keyed by [`BatchId`], plus two receipt-date indexes:
/// one over every batch and one over the open ones.
///
/// Depleted batches stay in the arena for audit but leave the open index, so
/// consumption never rescans them. Equal receipt dates fall back to id order,
/// which is receipt order.
///
/// Serialized as a plain list in receipt-date order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<StockBatch>", into = "Vec<StockBatch>")]
pub struct BatchLedger {
    arena: BTreeMap<BatchId, StockBatch>,
    dated: BTreeSet<(DateTime<Utc>, BatchId)>,
    open: BTreeSet<(DateTime<Utc>, BatchId)>,
}

impl BatchLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn get(&self, id: BatchId) -> Option<&StockBatch> {
        self.arena.get(&id)
    }

    /// Id the next received batch will get.
    pub fn next_id(&self) -> BatchId {
        self.arena
            .keys()
            .next_back()
            .map(|id| BatchId(id.0 + 1))
            .unwrap_or(BatchId(1))
    }

    /// All batches, depleted included, in receipt-date order.
    pub fn iter(&self) -> impl Iterator<Item = &StockBatch> {
        self.dated.iter().filter_map(|(_, id)| self.arena.get(id))
    }

    /// Open batches in the given consumption order.
    pub fn open_batches(&self, order: ConsumptionOrder) -> Box<dyn Iterator<Item = &StockBatch> + '_> {
        let index = self.open.iter();
        match order {
            ConsumptionOrder::OldestFirst => {
                Box::new(index.filter_map(|(_, id)| self.arena.get(id)))
            }
            ConsumptionOrder::NewestFirst => {
                Box::new(index.rev().filter_map(|(_, id)| self.arena.get(id)))
            }
        }
    }

    /// Next batch that would be consumed, if any.
    pub fn head(&self, order: ConsumptionOrder) -> Option<&StockBatch> {
        self.open_batches(order).next()
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// Sum of `remaining_quantity` over all batches.
    pub fn open_quantity(&self) -> f64 {
        self.open_batches(ConsumptionOrder::OldestFirst)
            .map(|b| b.remaining_quantity)
            .sum()
    }

    /// Sum of `remaining_quantity * unit_price` over all batches.
    pub fn open_value(&self) -> f64 {
        self.open_batches(ConsumptionOrder::OldestFirst)
            .map(StockBatch::remaining_value)
            .sum()
    }

    /// Insert a freshly received batch. Its id must not be in use.
    pub(crate) fn insert(&mut self, batch: StockBatch) -> Result<(), ValuationError> {
        batch.check()?;
        if self.arena.contains_key(&batch.id) {
            return Err(ValuationError::malformed(format!(
                "batch {} already recorded",
                batch.id
            )));
        }
        self.dated.insert((batch.date, batch.id));
        if batch.is_open() {
            self.open.insert((batch.date, batch.id));
        }
        self.arena.insert(batch.id, batch);
        Ok(())
    }

    /// Overwrite the remaining quantity of an existing batch.
    pub(crate) fn set_remaining(&mut self, id: BatchId, remaining: f64) -> Result<(), ValuationError> {
        let batch = self
            .arena
            .get_mut(&id)
            .ok_or_else(|| ValuationError::malformed(format!("unknown batch {id}")))?;
        check_remaining(id, batch.quantity, remaining)?;

        batch.remaining_quantity = clamp_residue(remaining.min(batch.quantity)).max(0.0);
        if batch.is_open() {
            self.open.insert((batch.date, id));
        } else {
            self.open.remove(&(batch.date, id));
        }
        Ok(())
    }

    /// Deplete every open batch (used when re-baselining).
    pub(crate) fn close_all(&mut self) {
        for (_, id) in std::mem::take(&mut self.open) {
            if let Some(batch) = self.arena.get_mut(&id) {
                batch.remaining_quantity = 0.0;
            }
        }
    }
}

impl TryFrom<Vec<StockBatch>> for BatchLedger {
    type Error = ValuationError;

    fn try_from(batches: Vec<StockBatch>) -> Result<Self, Self::Error> {
        let mut ledger = BatchLedger::new();
        for batch in batches {
            ledger.insert(batch)?;
        }
        Ok(ledger)
    }
}

impl From<BatchLedger> for Vec<StockBatch> {
    fn from(ledger: BatchLedger) -> Self {
        let BatchLedger { mut arena, dated, .. } = ledger;
        dated
            .into_iter()
            .filter_map(|(_, id)| arena.remove(&id))
            .collect()
    }
}
