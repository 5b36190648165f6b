//! Incoming rollover flow.

use crate::catalog::{
    require_positive, require_true, typed_validator, CatalogLimits, CatalogProvider,
    StepDefinition, ValidationError,
};
use crate::payload::{RolloverPayload, StepPayload};
use crate::types::TransactionType;

/// Provider for the rollover step list.
pub struct RolloverCatalog;

impl CatalogProvider for RolloverCatalog {
    fn transaction_type(&self) -> TransactionType {
        TransactionType::Rollover
    }

    fn steps(&self, limits: &CatalogLimits) -> Vec<StepDefinition> {
        let min_name_len = limits.min_provider_name_len;

        vec![
            StepDefinition::new("balance", "transactions.rollover.steps.balance").with_validator(
                typed_validator(StepPayload::as_rollover, |p: &RolloverPayload| {
                    require_positive(p.estimated_balance, "estimatedBalance").map(|_| ())
                }),
            ),
            StepDefinition::new("provider", "transactions.rollover.steps.provider").with_validator(
                typed_validator(StepPayload::as_rollover, move |p: &RolloverPayload| {
                    validate_provider(p, min_name_len)
                }),
            ),
            StepDefinition::new("review", "transactions.rollover.steps.review").with_validator(
                typed_validator(StepPayload::as_rollover, |p: &RolloverPayload| {
                    require_true(p.confirmation_accepted, "confirmationAccepted")
                }),
            ),
        ]
    }
}

fn validate_provider(p: &RolloverPayload, min_name_len: usize) -> Result<(), ValidationError> {
    let name = p.provider_name.as_deref().map(str::trim).unwrap_or("");
    if name.chars().count() < min_name_len {
        return Err(ValidationError::invalid(
            "providerName",
            format!("providerName must be at least {} characters", min_name_len),
        ));
    }
    Ok(())
}
