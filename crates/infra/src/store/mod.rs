//! Persistence of stock states and their journals.
//!
//! A state and the journal record describing its latest change are written
//! together by [`ValuationStore::commit`]: either both land or neither does.

mod in_memory;

pub use in_memory::InMemoryValuationStore;

use std::sync::Arc;

use thiserror::Error;

use stockval_core::{ExpectedVersion, TenantId};
use stockval_inventory::{StockKey, StockState};

use crate::journal::{JournalRecord, StockJournalEvent};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("invalid commit: {0}")]
    InvalidCommit(String),

    #[error("store lock poisoned")]
    Poisoned,
}

/// Tenant-isolated store of stock states keyed by product/warehouse.
pub trait ValuationStore: Send + Sync {
    fn load_state(&self, tenant_id: TenantId, key: StockKey) -> Result<Option<StockState>, StoreError>;

    /// Save `state` and append `record` to its journal.
    ///
    /// `expected` is compared against the version of the stored state (`None`
    /// when the key is new). On mismatch nothing is written. Returns the
    /// sealed journal record, if one was given.
    fn commit(
        &self,
        tenant_id: TenantId,
        state: &StockState,
        expected: ExpectedVersion,
        record: Option<StockJournalEvent>,
    ) -> Result<Option<JournalRecord>, StoreError>;

    /// Journal for one key, in sequence order.
    fn load_journal(&self, tenant_id: TenantId, key: StockKey) -> Result<Vec<JournalRecord>, StoreError>;

    fn list_states(&self, tenant_id: TenantId) -> Result<Vec<StockState>, StoreError>;

    /// Drop every state and journal of a tenant.
    fn clear_tenant(&self, tenant_id: TenantId) -> Result<(), StoreError>;
}

impl<S> ValuationStore for Arc<S>
where
    S: ValuationStore + ?Sized,
{
    fn load_state(&self, tenant_id: TenantId, key: StockKey) -> Result<Option<StockState>, StoreError> {
        (**self).load_state(tenant_id, key)
    }

    fn commit(
        &self,
        tenant_id: TenantId,
        state: &StockState,
        expected: ExpectedVersion,
        record: Option<StockJournalEvent>,
    ) -> Result<Option<JournalRecord>, StoreError> {
        (**self).commit(tenant_id, state, expected, record)
    }

    fn load_journal(&self, tenant_id: TenantId, key: StockKey) -> Result<Vec<JournalRecord>, StoreError> {
        (**self).load_journal(tenant_id, key)
    }

    fn list_states(&self, tenant_id: TenantId) -> Result<Vec<StockState>, StoreError> {
        (**self).list_states(tenant_id)
    }

    fn clear_tenant(&self, tenant_id: TenantId) -> Result<(), StoreError> {
        (**self).clear_tenant(tenant_id)
    }
}
