//! Configuration loading and representation.
//!
//! Values come from the process environment, each with a default:
//!
//! | variable | default |
//! |---|---|
//! | `STOCKVAL_DEFAULT_METHOD` | `CMP` |
//! | `STOCKVAL_DEFAULT_STANDARD` | `PCG` |
//! | `STOCKVAL_METHOD_SWITCH` | `refuse` |

use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockval_inventory::{AccountingStandard, ValuationMethod};

pub const ENV_DEFAULT_METHOD: &str = "STOCKVAL_DEFAULT_METHOD";
pub const ENV_DEFAULT_STANDARD: &str = "STOCKVAL_DEFAULT_STANDARD";
pub const ENV_METHOD_SWITCH: &str = "STOCKVAL_METHOD_SWITCH";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("default method {method} is not permitted under {standard}")]
    Conflict {
        method: ValuationMethod,
        standard: AccountingStandard,
    },
}

/// What to do with on-hand stock when a tenant changes costing method.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodSwitch {
    /// Refuse while any product/warehouse still holds stock.
    #[default]
    Refuse,
    /// Collapse each on-hand state into one opening batch at its blended cost.
    CarryForwardBlended,
}

impl FromStr for MethodSwitch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "refuse" => Ok(MethodSwitch::Refuse),
            "carry_forward" | "carry-forward" => Ok(MethodSwitch::CarryForwardBlended),
            other => Err(format!("unknown method switch policy '{other}'")),
        }
    }
}

/// Process-wide valuation settings. Tenant overrides live in
/// [`CostingPolicies`](crate::policy::CostingPolicies).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValuationConfig {
    pub default_method: ValuationMethod,
    pub default_standard: AccountingStandard,
    pub method_switch: MethodSwitch,
}

impl ValuationConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read configuration through `lookup` (missing or blank means default).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &'static str| lookup(var).filter(|v| !v.trim().is_empty());

        let default_method = match get(ENV_DEFAULT_METHOD) {
            Some(raw) => raw.parse::<ValuationMethod>().map_err(|e| ConfigError::Invalid {
                var: ENV_DEFAULT_METHOD,
                reason: e.to_string(),
            })?,
            None => ValuationMethod::default(),
        };

        let default_standard = match get(ENV_DEFAULT_STANDARD) {
            Some(raw) => raw.parse::<AccountingStandard>().map_err(|e| ConfigError::Invalid {
                var: ENV_DEFAULT_STANDARD,
                reason: e.to_string(),
            })?,
            None => AccountingStandard::default(),
        };

        let method_switch = match get(ENV_METHOD_SWITCH) {
            Some(raw) => raw.parse::<MethodSwitch>().map_err(|reason| ConfigError::Invalid {
                var: ENV_METHOD_SWITCH,
                reason,
            })?,
            None => MethodSwitch::default(),
        };

        let config = Self {
            default_method,
            default_standard,
            method_switch,
        };
        config.validate()?;

        tracing::debug!(
            default_method = %config.default_method,
            default_standard = %config.default_standard,
            method_switch = ?config.method_switch,
            "valuation config loaded"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.default_standard.permits(self.default_method) {
            return Err(ConfigError::Conflict {
                method: self.default_method,
                standard: self.default_standard,
            });
        }
        Ok(())
    }
}
