//! Per-tenant costing policy: which method values stock, under which
//! accounting standard.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockval_core::TenantId;
use stockval_inventory::{AccountingStandard, ValuationMethod};

use crate::config::ValuationConfig;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("{method} is not permitted under {standard}")]
    MethodNotPermitted {
        method: ValuationMethod,
        standard: AccountingStandard,
    },

    #[error("cannot switch to {target}: {positions} position(s) still hold stock")]
    StockOnHand {
        target: ValuationMethod,
        positions: usize,
    },

    #[error("policy registry lock poisoned")]
    Poisoned,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostingPolicy {
    pub method: ValuationMethod,
    pub standard: AccountingStandard,
}

impl CostingPolicy {
    pub fn ensure_permitted(&self) -> Result<(), PolicyError> {
        if self.standard.permits(self.method) {
            Ok(())
        } else {
            Err(PolicyError::MethodNotPermitted {
                method: self.method,
                standard: self.standard,
            })
        }
    }
}

/// Tenant overrides on top of the configured defaults.
#[derive(Debug)]
pub struct CostingPolicies {
    defaults: CostingPolicy,
    tenants: RwLock<HashMap<TenantId, CostingPolicy>>,
}

impl CostingPolicies {
    pub fn new(config: &ValuationConfig) -> Self {
        Self {
            defaults: CostingPolicy {
                method: config.default_method,
                standard: config.default_standard,
            },
            tenants: RwLock::new(HashMap::new()),
        }
    }

    pub fn defaults(&self) -> CostingPolicy {
        self.defaults
    }

    pub fn policy_for(&self, tenant_id: TenantId) -> Result<CostingPolicy, PolicyError> {
        let tenants = self.tenants.read().map_err(|_| PolicyError::Poisoned)?;
        Ok(tenants.get(&tenant_id).copied().unwrap_or(self.defaults))
    }

    pub fn method_for(&self, tenant_id: TenantId) -> Result<ValuationMethod, PolicyError> {
        Ok(self.policy_for(tenant_id)?.method)
    }

    /// Check `method` against the tenant's standard without changing anything.
    pub fn ensure_permitted(&self, tenant_id: TenantId, method: ValuationMethod) -> Result<(), PolicyError> {
        CostingPolicy {
            method,
            ..self.policy_for(tenant_id)?
        }
        .ensure_permitted()
    }

    /// Set the tenant's method. Stock already on hand is the caller's concern;
    /// use the valuation service to switch a tenant that holds stock.
    pub fn set_method(&self, tenant_id: TenantId, method: ValuationMethod) -> Result<CostingPolicy, PolicyError> {
        self.update(tenant_id, |policy| policy.method = method)
            .inspect(|policy| {
                if policy.method == ValuationMethod::Lifo {
                    tracing::warn!(
                        tenant_id = %tenant_id,
                        standard = %policy.standard,
                        "LIFO enabled; not accepted under IFRS reporting"
                    );
                }
            })
    }

    pub fn set_standard(
        &self,
        tenant_id: TenantId,
        standard: AccountingStandard,
    ) -> Result<CostingPolicy, PolicyError> {
        self.update(tenant_id, |policy| policy.standard = standard)
    }

    fn update(
        &self,
        tenant_id: TenantId,
        change: impl FnOnce(&mut CostingPolicy),
    ) -> Result<CostingPolicy, PolicyError> {
        let mut tenants = self.tenants.write().map_err(|_| PolicyError::Poisoned)?;
        let mut policy = tenants.get(&tenant_id).copied().unwrap_or(self.defaults);
        change(&mut policy);
        policy.ensure_permitted()?;
        tenants.insert(tenant_id, policy);
        Ok(policy)
    }
}

impl Default for CostingPolicies {
    fn default() -> Self {
        Self::new(&ValuationConfig::default())
    }
}
