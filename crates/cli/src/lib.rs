//! Run a file of stock movements through the valuation service and report the
//! resulting trail.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use serde::Serialize;
use uuid::Uuid;

use stockval_core::{DomainError, TenantId};
use stockval_infra::{InMemoryValuationStore, ValuationConfig, ValuationService};
use stockval_inventory::{StockKey, StockMovement, ValuationMethod, ValuationResult};

/// One line of the valuation trail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrailEntry {
    pub movement_id: Uuid,
    pub company_id: TenantId,
    #[serde(flatten)]
    pub key: StockKey,
    #[serde(flatten)]
    pub outcome: TrailOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TrailOutcome {
    Valued {
        result: ValuationResult,
        quantity_after: f64,
        value_after: f64,
        unit_cost_after: f64,
        sequence_number: u64,
    },
    Rejected {
        error: String,
    },
}

impl TrailEntry {
    pub fn is_rejected(&self) -> bool {
        matches!(self.outcome, TrailOutcome::Rejected { .. })
    }
}

/// Parse `input` as a JSON array of movements and value them in order.
///
/// `method` overrides the configured default for every company in the file.
/// Rejected movements are reported in the trail and do not stop the run.
pub fn run(input: &str, method: Option<ValuationMethod>, config: ValuationConfig) -> Result<Vec<TrailEntry>> {
    let movements: Vec<StockMovement> = serde_json::from_str(input).context("parsing movements")?;
    let service = ValuationService::new(InMemoryValuationStore::new(), config);

    if let Some(method) = method {
        let companies: BTreeSet<TenantId> = movements.iter().map(|m| m.company_id).collect();
        for company in companies {
            service
                .policies()
                .set_method(company, method)
                .with_context(|| format!("setting {method} for company {company}"))?;
        }
    }

    let mut trail = Vec::with_capacity(movements.len());
    for movement in &movements {
        let outcome = match service.valuate(movement.company_id, movement) {
            Ok(out) => TrailOutcome::Valued {
                quantity_after: out.state.current_quantity(),
                value_after: out.state.current_value(),
                unit_cost_after: out.state.unit_cost(),
                sequence_number: out.sequence_number,
                result: out.result,
            },
            Err(e) => TrailOutcome::Rejected {
                error: DomainError::from(e).to_string(),
            },
        };
        trail.push(TrailEntry {
            movement_id: movement.id,
            company_id: movement.company_id,
            key: movement.key(),
            outcome,
        });
    }

    let rejected = trail.iter().filter(|e| e.is_rejected()).count();
    tracing::info!(movements = trail.len(), rejected, "replay finished");
    Ok(trail)
}
