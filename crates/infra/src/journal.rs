//! Valuation journal records.
//!
//! Each product/warehouse key has its own append-only stream. Records carry
//! enough to rebuild the state from scratch (see [`crate::replay`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockval_core::TenantId;
use stockval_events::{Event, EventEnvelope};
use stockval_inventory::{BatchId, StockKey, StockMovement, StockState, ValuationMethod, ValuationResult};

/// A journal record as stored: payload plus stream metadata.
pub type JournalRecord = EventEnvelope<StockJournalEvent>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StockJournalEvent {
    /// A movement valued and folded into the state.
    Valued {
        tenant_id: TenantId,
        key: StockKey,
        method: ValuationMethod,
        movement: StockMovement,
        result: ValuationResult,
        quantity_after: f64,
        value_after: f64,
        unit_cost_after: f64,
        recorded_at: DateTime<Utc>,
    },
    /// A state seeded with a carried-over balance.
    OpeningBalanceRecorded {
        tenant_id: TenantId,
        key: StockKey,
        quantity: f64,
        value: f64,
        as_of: DateTime<Utc>,
        recorded_at: DateTime<Utc>,
    },
    /// Remaining stock collapsed into one batch at its blended cost on a
    /// method switch.
    Rebaselined {
        tenant_id: TenantId,
        key: StockKey,
        from: ValuationMethod,
        to: ValuationMethod,
        quantity: f64,
        unit_cost: f64,
        opening_batch: Option<BatchId>,
        as_of: DateTime<Utc>,
        recorded_at: DateTime<Utc>,
    },
}

impl StockJournalEvent {
    pub fn valued(
        tenant_id: TenantId,
        method: ValuationMethod,
        movement: &StockMovement,
        result: &ValuationResult,
        after: &StockState,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        StockJournalEvent::Valued {
            tenant_id,
            key: after.key(),
            method,
            movement: movement.clone(),
            result: result.clone(),
            quantity_after: after.current_quantity(),
            value_after: after.current_value(),
            unit_cost_after: after.unit_cost(),
            recorded_at,
        }
    }

    /// When the record was written, as opposed to the business time it
    /// describes.
    pub fn recorded_at(&self) -> DateTime<Utc> {
        match self {
            StockJournalEvent::Valued { recorded_at, .. }
            | StockJournalEvent::OpeningBalanceRecorded { recorded_at, .. }
            | StockJournalEvent::Rebaselined { recorded_at, .. } => *recorded_at,
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        match self {
            StockJournalEvent::Valued { tenant_id, .. }
            | StockJournalEvent::OpeningBalanceRecorded { tenant_id, .. }
            | StockJournalEvent::Rebaselined { tenant_id, .. } => *tenant_id,
        }
    }

    pub fn key(&self) -> StockKey {
        match self {
            StockJournalEvent::Valued { key, .. }
            | StockJournalEvent::OpeningBalanceRecorded { key, .. }
            | StockJournalEvent::Rebaselined { key, .. } => *key,
        }
    }
}

impl Event for StockJournalEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockJournalEvent::Valued { .. } => "inventory.stock.valued",
            StockJournalEvent::OpeningBalanceRecorded { .. } => "inventory.stock.opening_balance_recorded",
            StockJournalEvent::Rebaselined { .. } => "inventory.stock.rebaselined",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockJournalEvent::Valued { movement, .. } => movement.movement_date,
            StockJournalEvent::OpeningBalanceRecorded { as_of, .. }
            | StockJournalEvent::Rebaselined { as_of, .. } => *as_of,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use stockval_core::{ProductId, WarehouseId};

    #[test]
    fn valued_record_is_tagged_and_timed_by_movement() {
        let tenant = TenantId::new();
        let key = StockKey::new(ProductId::new(), WarehouseId::new());
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let movement = StockMovement::entry(key, tenant, at, 100.0, 10.0);

        let mut state = StockState::open(key);
        let result = state.record(ValuationMethod::Cmp, &movement).unwrap();
        let event = StockJournalEvent::valued(tenant, ValuationMethod::Cmp, &movement, &result, &state, at);

        assert_eq!(event.event_type(), "inventory.stock.valued");
        assert_eq!(event.occurred_at(), at);
        assert_eq!(event.key(), key);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "valued");
        assert_eq!(json["movement"]["type"], "entry");
        assert_eq!(json["value_after"], 1000.0);

        let back: StockJournalEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
