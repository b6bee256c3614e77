use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::batch::{BatchId, StockBatch};
use crate::method::ValuationMethod;

/// One batch touched by an outbound FIFO/LIFO movement.
///
/// `quantity` is what was taken from the batch, `remaining_quantity` what is
/// left in it afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumedBatch {
    pub batch_id: BatchId,
    pub date: DateTime<Utc>,
    pub quantity: f64,
    pub unit_price: f64,
    pub remaining_quantity: f64,
}

impl ConsumedBatch {
    pub fn value(&self) -> f64 {
        self.quantity * self.unit_price
    }
}

/// Method-specific breakdown of a valuation.
///
/// Serializes as a single-key object, e.g. `{"weighted_average": 10.67}` or
/// `{"batches_consumed": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValuationDetails {
    /// CMP: the average after an entry, or the unchanged average on an exit.
    WeightedAverage(f64),
    /// FIFO/LIFO outbound: batches in consumption order.
    BatchesConsumed(Vec<ConsumedBatch>),
    /// FIFO/LIFO inbound: the batch the movement creates.
    BatchReceived(StockBatch),
}

/// Output of valuing one movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationResult {
    pub quantity: f64,
    pub total_value: f64,
    pub unit_cost: f64,
    pub method: ValuationMethod,
    pub details: ValuationDetails,
}

impl ValuationResult {
    pub fn weighted_average(&self) -> Option<f64> {
        match self.details {
            ValuationDetails::WeightedAverage(avg) => Some(avg),
            _ => None,
        }
    }

    /// Consumed batches; empty for CMP results and receipts.
    pub fn batches_consumed(&self) -> &[ConsumedBatch] {
        match &self.details {
            ValuationDetails::BatchesConsumed(consumed) => consumed,
            _ => &[],
        }
    }

    pub fn batch_received(&self) -> Option<&StockBatch> {
        match &self.details {
            ValuationDetails::BatchReceived(batch) => Some(batch),
            _ => None,
        }
    }
}
