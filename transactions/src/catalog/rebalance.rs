//! Rebalance flow: pick a target allocation, then confirm.

use rust_decimal::Decimal;

use crate::catalog::{
    require_true, typed_validator, CatalogLimits, CatalogProvider, StepDefinition,
    ValidationError,
};
use crate::payload::{RebalancePayload, StepPayload};
use crate::types::TransactionType;

/// Provider for the rebalance step list.
pub struct RebalanceCatalog;

impl CatalogProvider for RebalanceCatalog {
    fn transaction_type(&self) -> TransactionType {
        TransactionType::Rebalance
    }

    fn steps(&self, _limits: &CatalogLimits) -> Vec<StepDefinition> {
        vec![
            StepDefinition::new("allocation", "transactions.rebalance.steps.allocation")
                .with_validator(typed_validator(StepPayload::as_rebalance, validate_allocation)),
            StepDefinition::new("review", "transactions.rebalance.steps.review").with_validator(
                typed_validator(StepPayload::as_rebalance, |p: &RebalancePayload| {
                    require_true(p.confirmation_accepted, "confirmationAccepted")
                }),
            ),
        ]
    }
}

fn validate_allocation(p: &RebalancePayload) -> Result<(), ValidationError> {
    let allocations = match &p.allocations {
        Some(allocations) if !allocations.is_empty() => allocations,
        _ => return Err(ValidationError::missing("allocations")),
    };

    let hundred = Decimal::from(100);
    if let Some((fund, _)) = allocations
        .iter()
        .find(|(_, pct)| **pct <= Decimal::ZERO || **pct > hundred)
    {
        return Err(ValidationError::invalid(
            "allocations",
            format!("allocation for {} must be between 0 and 100", fund),
        ));
    }

    let total: Decimal = allocations.values().copied().sum();
    if total != hundred {
        return Err(ValidationError::invalid(
            "allocations",
            format!("allocations must total 100%, got {}%", total),
        ));
    }
    Ok(())
}
