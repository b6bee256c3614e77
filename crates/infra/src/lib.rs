//! Calling layer: configuration, costing policies, persistence and the
//! valuation service.

pub mod config;
pub mod journal;
pub mod policy;
pub mod replay;
pub mod service;
pub mod store;


pub use config::{ConfigError, MethodSwitch, ValuationConfig};
pub use journal::{JournalRecord, StockJournalEvent};
pub use policy::{CostingPolicies, CostingPolicy, PolicyError};
pub use replay::{ReplayError, replay};
pub use service::{ServiceError, SwitchOutcome, ValuationOutcome, ValuationService};
pub use store::{InMemoryValuationStore, StoreError, ValuationStore};
