use std::collections::HashMap;
use std::sync::RwLock;

use stockval_core::{AggregateId, AggregateRoot, ExpectedVersion, TenantId};
use stockval_events::EventEnvelope;
use stockval_inventory::{StockKey, StockState};

use super::{StoreError, ValuationStore};
use crate::journal::{JournalRecord, StockJournalEvent};

#[derive(Debug)]
struct Slot {
    stream_id: AggregateId,
    state: StockState,
    journal: Vec<JournalRecord>,
}

/// In-memory valuation store.
///
/// Intended for tests/dev. A single lock covers states and journals, so a
/// commit is atomic.
#[derive(Debug, Default)]
pub struct InMemoryValuationStore {
    slots: RwLock<HashMap<(TenantId, StockKey), Slot>>,
}

impl InMemoryValuationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ValuationStore for InMemoryValuationStore {
    fn load_state(&self, tenant_id: TenantId, key: StockKey) -> Result<Option<StockState>, StoreError> {
        let slots = self.slots.read().map_err(|_| StoreError::Poisoned)?;
        Ok(slots.get(&(tenant_id, key)).map(|slot| slot.state.clone()))
    }

    fn commit(
        &self,
        tenant_id: TenantId,
        state: &StockState,
        expected: ExpectedVersion,
        record: Option<StockJournalEvent>,
    ) -> Result<Option<JournalRecord>, StoreError> {
        let key = state.key();
        if let Some(record) = &record {
            if record.tenant_id() != tenant_id {
                return Err(StoreError::TenantIsolation(format!(
                    "record for tenant {} committed under tenant {tenant_id}",
                    record.tenant_id()
                )));
            }
            if record.key() != key {
                return Err(StoreError::InvalidCommit(format!(
                    "record for {} committed with state {key}",
                    record.key()
                )));
            }
        }

        let mut slots = self.slots.write().map_err(|_| StoreError::Poisoned)?;

        let current = slots.get(&(tenant_id, key)).map(|slot| slot.state.version());
        expected
            .check(current)
            .map_err(|e| StoreError::Concurrency(format!("{key}: {e}")))?;

        let slot = slots.entry((tenant_id, key)).or_insert_with(|| Slot {
            stream_id: AggregateId::new(),
            state: state.clone(),
            journal: Vec::new(),
        });
        slot.state = state.clone();

        let sealed = record.map(|payload| {
            let sequence = slot.journal.len() as u64 + 1;
            let envelope = EventEnvelope::seal(tenant_id, slot.stream_id, sequence, payload);
            slot.journal.push(envelope.clone());
            envelope
        });
        Ok(sealed)
    }

    fn load_journal(&self, tenant_id: TenantId, key: StockKey) -> Result<Vec<JournalRecord>, StoreError> {
        let slots = self.slots.read().map_err(|_| StoreError::Poisoned)?;
        Ok(slots
            .get(&(tenant_id, key))
            .map(|slot| slot.journal.clone())
            .unwrap_or_default())
    }

    fn list_states(&self, tenant_id: TenantId) -> Result<Vec<StockState>, StoreError> {
        let slots = self.slots.read().map_err(|_| StoreError::Poisoned)?;
        let mut states: Vec<StockState> = slots
            .iter()
            .filter(|((t, _), _)| *t == tenant_id)
            .map(|(_, slot)| slot.state.clone())
            .collect();
        states.sort_by_key(|s| s.key());
        Ok(states)
    }

    fn clear_tenant(&self, tenant_id: TenantId) -> Result<(), StoreError> {
        let mut slots = self.slots.write().map_err(|_| StoreError::Poisoned)?;
        slots.retain(|(t, _), _| *t != tenant_id);
        Ok(())
    }
}
