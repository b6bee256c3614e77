//! Valuation service: the calling layer around the engine.
//!
//! ```text
//! movement
//!   ↓
//! 1. Share the tenant lock
//!   ↓
//! 2. Lock the product/warehouse key
//!   ↓
//! 3. Resolve the tenant's costing method
//!   ↓
//! 4. Load the stored state (or open a fresh one)
//!   ↓
//! 5. Calculate and fold
//!   ↓
//! 6. Commit state + journal record (optimistic concurrency check)
//! ```
//!
//! Different keys proceed in parallel; movements on the same key are
//! serialized by the key lock. A method switch holds the tenant lock
//! exclusively, so no movement of that tenant is valued while stock is
//! being rebaselined. Locks are always taken tenant first, then key.
//! A failed step writes nothing and is not retried.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use thiserror::Error;

use stockval_core::{AggregateRoot, DomainError, ExpectedVersion, TenantId};
use stockval_inventory::{StockKey, StockMovement, StockState, ValuationError, ValuationMethod, ValuationResult};

use crate::config::{MethodSwitch, ValuationConfig};
use crate::journal::StockJournalEvent;
use crate::policy::{CostingPolicies, CostingPolicy, PolicyError};
use crate::replay::{ReplayError, replay};
use crate::store::{StoreError, ValuationStore};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("tenant isolation violation: movement belongs to {movement}, request made for {tenant}")]
    TenantIsolation { tenant: TenantId, movement: TenantId },

    #[error("{0} already has a stored state")]
    AlreadyOpened(StockKey),

    #[error("stored state for {0} does not match its journal")]
    JournalMismatch(StockKey),

    #[error(transparent)]
    Valuation(#[from] ValuationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Replay(#[from] ReplayError),

    #[error("service lock poisoned")]
    LockPoisoned,
}

impl From<ServiceError> for DomainError {
    fn from(value: ServiceError) -> Self {
        match value {
            ServiceError::Valuation(e) => e.into(),
            ServiceError::Replay(ReplayError::Valuation { source, .. }) => source.into(),
            ServiceError::AlreadyOpened(_) | ServiceError::Store(StoreError::Concurrency(_)) => {
                DomainError::conflict(value.to_string())
            }
            ServiceError::Policy(PolicyError::MethodNotPermitted { .. } | PolicyError::StockOnHand { .. }) => {
                DomainError::validation(value.to_string())
            }
            _ => DomainError::invariant(value.to_string()),
        }
    }
}

/// What a committed valuation produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ValuationOutcome {
    pub result: ValuationResult,
    pub state: StockState,
    /// Position of the `Valued` record in the key's journal.
    pub sequence_number: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchOutcome {
    pub policy: CostingPolicy,
    /// Keys whose remaining stock was collapsed into an opening batch.
    pub rebaselined: Vec<StockKey>,
}

type KeyLocks = Mutex<HashMap<(TenantId, StockKey), Arc<Mutex<()>>>>;
type TenantLocks = Mutex<HashMap<TenantId, Arc<RwLock<()>>>>;

pub struct ValuationService<S> {
    store: S,
    policies: CostingPolicies,
    config: ValuationConfig,
    tenants: TenantLocks,
    locks: KeyLocks,
}

impl<S> ValuationService<S>
where
    S: ValuationStore,
{
    pub fn new(store: S, config: ValuationConfig) -> Self {
        Self {
            store,
            policies: CostingPolicies::new(&config),
            config,
            tenants: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn policies(&self) -> &CostingPolicies {
        &self.policies
    }

    pub fn config(&self) -> &ValuationConfig {
        &self.config
    }

    /// Value `movement` with the tenant's method and persist the new state.
    pub fn valuate(&self, tenant_id: TenantId, movement: &StockMovement) -> Result<ValuationOutcome, ServiceError> {
        ensure_tenant(tenant_id, movement)?;
        let key = movement.key();

        let tenant_lock = self.tenant_lock(tenant_id)?;
        let _tenant = tenant_lock.read().map_err(|_| ServiceError::LockPoisoned)?;
        let lock = self.key_lock(tenant_id, key)?;
        let _guard = lock.lock().map_err(|_| ServiceError::LockPoisoned)?;

        let method = self.policies.method_for(tenant_id)?;
        let (mut state, expected) = self.load_or_open(tenant_id, key)?;
        let result = state
            .record(method, movement)
            .inspect_err(|e| log_rejection(tenant_id, key, method, movement, e))?;

        let now = Utc::now();
        state.mark_persisted(now);
        let record = StockJournalEvent::valued(tenant_id, method, movement, &result, &state, now);
        let sealed = self.store.commit(tenant_id, &state, expected, Some(record))?;
        let sequence_number = sealed
            .map(|r| r.sequence_number())
            .ok_or_else(|| StoreError::InvalidCommit(format!("{key}: journal record was not sealed")))?;

        tracing::info!(
            tenant_id = %tenant_id,
            key = %key,
            method = %method,
            movement_type = %movement.movement_type,
            quantity = result.quantity,
            total_value = result.total_value,
            unit_cost = result.unit_cost,
            sequence_number,
            "movement valued"
        );

        Ok(ValuationOutcome {
            result,
            state,
            sequence_number,
        })
    }

    /// Value `movement` against the stored state without persisting anything.
    pub fn preview(&self, tenant_id: TenantId, movement: &StockMovement) -> Result<ValuationResult, ServiceError> {
        ensure_tenant(tenant_id, movement)?;
        let tenant_lock = self.tenant_lock(tenant_id)?;
        let _tenant = tenant_lock.read().map_err(|_| ServiceError::LockPoisoned)?;

        let method = self.policies.method_for(tenant_id)?;
        let (state, _) = self.load_or_open(tenant_id, movement.key())?;
        Ok(method.valuate(&state, movement)?)
    }

    /// Seed a key that has no stored state with a carried-over balance.
    pub fn record_opening_balance(
        &self,
        tenant_id: TenantId,
        key: StockKey,
        quantity: f64,
        value: f64,
        as_of: DateTime<Utc>,
    ) -> Result<StockState, ServiceError> {
        let tenant_lock = self.tenant_lock(tenant_id)?;
        let _tenant = tenant_lock.read().map_err(|_| ServiceError::LockPoisoned)?;
        let lock = self.key_lock(tenant_id, key)?;
        let _guard = lock.lock().map_err(|_| ServiceError::LockPoisoned)?;

        if self.store.load_state(tenant_id, key)?.is_some() {
            return Err(ServiceError::AlreadyOpened(key));
        }

        let mut state = StockState::with_opening_balance(key, quantity, value, as_of)?;
        let now = Utc::now();
        state.mark_persisted(now);
        let record = StockJournalEvent::OpeningBalanceRecorded {
            tenant_id,
            key,
            quantity,
            value,
            as_of,
            recorded_at: now,
        };
        self.store
            .commit(tenant_id, &state, ExpectedVersion::NoRecord, Some(record))?;

        tracing::info!(tenant_id = %tenant_id, key = %key, quantity, value, "opening balance recorded");
        Ok(state)
    }

    /// Change the tenant's method using the configured [`MethodSwitch`].
    pub fn switch_method(
        &self,
        tenant_id: TenantId,
        method: ValuationMethod,
        as_of: DateTime<Utc>,
    ) -> Result<SwitchOutcome, ServiceError> {
        self.switch_method_with(tenant_id, method, self.config.method_switch, as_of)
    }

    /// Change the tenant's method.
    ///
    /// With [`MethodSwitch::Refuse`] any key still holding stock blocks the
    /// switch. With [`MethodSwitch::CarryForwardBlended`] each such key is
    /// rebaselined at its blended cost first. Depleted keys whose leftover
    /// layers would not fit the new method are closed out either way.
    ///
    /// Movements of the tenant wait until the switch has finished.
    pub fn switch_method_with(
        &self,
        tenant_id: TenantId,
        target: ValuationMethod,
        switch: MethodSwitch,
        as_of: DateTime<Utc>,
    ) -> Result<SwitchOutcome, ServiceError> {
        let tenant_lock = self.tenant_lock(tenant_id)?;
        let _exclusive = tenant_lock.write().map_err(|_| ServiceError::LockPoisoned)?;

        self.policies.ensure_permitted(tenant_id, target)?;
        let current = self.policies.policy_for(tenant_id)?;
        if current.method == target {
            return Ok(SwitchOutcome {
                policy: current,
                rebaselined: Vec::new(),
            });
        }

        let states = self.store.list_states(tenant_id)?;
        let on_hand = states.iter().filter(|s| !s.is_depleted()).count();
        if switch == MethodSwitch::Refuse && on_hand > 0 {
            return Err(PolicyError::StockOnHand {
                target,
                positions: on_hand,
            }
            .into());
        }

        let mut rebaselined = Vec::new();
        for listed in &states {
            if listed.is_depleted() && listed.check_invariants(target).is_ok() {
                continue;
            }
            if self.rebaseline_key(tenant_id, listed.key(), current.method, target, as_of)? {
                rebaselined.push(listed.key());
            }
        }

        let policy = self.policies.set_method(tenant_id, target)?;
        tracing::info!(
            tenant_id = %tenant_id,
            from = %current.method,
            to = %target,
            switch = ?switch,
            rebaselined = rebaselined.len(),
            "costing method switched"
        );
        Ok(SwitchOutcome { policy, rebaselined })
    }

    /// Rebuild a key from its journal and compare with the stored state.
    pub fn verify_journal(&self, tenant_id: TenantId, key: StockKey) -> Result<StockState, ServiceError> {
        let lock = self.key_lock(tenant_id, key)?;
        let _guard = lock.lock().map_err(|_| ServiceError::LockPoisoned)?;

        let journal = self.store.load_journal(tenant_id, key)?;
        let rebuilt = replay(key, &journal)?;
        let stored = self.store.load_state(tenant_id, key)?;
        match stored {
            Some(stored) if stored == rebuilt => Ok(rebuilt),
            None if journal.is_empty() => Ok(rebuilt),
            _ => Err(ServiceError::JournalMismatch(key)),
        }
    }

    /// Returns whether an opening batch was created.
    fn rebaseline_key(
        &self,
        tenant_id: TenantId,
        key: StockKey,
        from: ValuationMethod,
        to: ValuationMethod,
        as_of: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let lock = self.key_lock(tenant_id, key)?;
        let _guard = lock.lock().map_err(|_| ServiceError::LockPoisoned)?;

        let Some(mut state) = self.store.load_state(tenant_id, key)? else {
            return Ok(false);
        };
        let expected = ExpectedVersion::Exact(state.version());
        let quantity = state.current_quantity();
        let opening_batch = state.rebaseline(as_of)?;

        let now = Utc::now();
        state.mark_persisted(now);
        let record = StockJournalEvent::Rebaselined {
            tenant_id,
            key,
            from,
            to,
            quantity,
            unit_cost: state.unit_cost(),
            opening_batch,
            as_of,
            recorded_at: now,
        };
        self.store.commit(tenant_id, &state, expected, Some(record))?;

        tracing::debug!(tenant_id = %tenant_id, key = %key, quantity, unit_cost = state.unit_cost(), "stock rebaselined");
        Ok(opening_batch.is_some())
    }

    fn load_or_open(&self, tenant_id: TenantId, key: StockKey) -> Result<(StockState, ExpectedVersion), ServiceError> {
        Ok(match self.store.load_state(tenant_id, key)? {
            Some(state) => {
                let expected = ExpectedVersion::Exact(state.version());
                (state, expected)
            }
            None => (StockState::open(key), ExpectedVersion::NoRecord),
        })
    }

    fn tenant_lock(&self, tenant_id: TenantId) -> Result<Arc<RwLock<()>>, ServiceError> {
        let mut tenants = self.tenants.lock().map_err(|_| ServiceError::LockPoisoned)?;
        Ok(tenants.entry(tenant_id).or_default().clone())
    }

    fn key_lock(&self, tenant_id: TenantId, key: StockKey) -> Result<Arc<Mutex<()>>, ServiceError> {
        let mut locks = self.locks.lock().map_err(|_| ServiceError::LockPoisoned)?;
        Ok(locks.entry((tenant_id, key)).or_default().clone())
    }
}

fn ensure_tenant(tenant_id: TenantId, movement: &StockMovement) -> Result<(), ServiceError> {
    if movement.company_id != tenant_id {
        return Err(ServiceError::TenantIsolation {
            tenant: tenant_id,
            movement: movement.company_id,
        });
    }
    Ok(())
}

fn log_rejection(
    tenant_id: TenantId,
    key: StockKey,
    method: ValuationMethod,
    movement: &StockMovement,
    error: &ValuationError,
) {
    if let ValuationError::InsufficientStock { requested, available } = error {
        tracing::warn!(
            tenant_id = %tenant_id,
            key = %key,
            method = %method,
            movement_id = %movement.id,
            requested,
            available,
            "exit exceeds stock on hand"
        );
    } else {
        tracing::debug!(tenant_id = %tenant_id, key = %key, method = %method, error = %error, "movement rejected");
    }
}
