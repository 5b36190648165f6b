//! Distribution flow for participants who have left the employer.

use crate::catalog::withdrawal::validate_withholding;
use crate::catalog::{
    require_positive, require_text, require_true, typed_validator, validate_payment,
    CatalogLimits, CatalogProvider, StepDefinition, ValidationError,
};
use crate::payload::{DistributionPayload, StepPayload};
use crate::types::TransactionType;

/// Provider for the distribution step list.
pub struct DistributionCatalog;

impl CatalogProvider for DistributionCatalog {
    fn transaction_type(&self) -> TransactionType {
        TransactionType::Distribution
    }

    fn steps(&self, limits: &CatalogLimits) -> Vec<StepDefinition> {
        let payment_limits = limits.clone();

        vec![
            StepDefinition::new("election", "transactions.distribution.steps.election")
                .with_validator(typed_validator(
                    StepPayload::as_distribution,
                    |p: &DistributionPayload| require_text(&p.distribution_option, "distributionOption"),
                )),
            StepDefinition::new("amount", "transactions.distribution.steps.amount")
                .with_validator(typed_validator(StepPayload::as_distribution, validate_amount)),
            StepDefinition::new("payment", "transactions.distribution.steps.payment")
                .with_validator(typed_validator(
                    StepPayload::as_distribution,
                    move |p: &DistributionPayload| {
                        validate_withholding(p.federal_withholding_pct)?;
                        validate_payment(&p.payment, &payment_limits)
                    },
                )),
            StepDefinition::new("review", "transactions.distribution.steps.review")
                .with_validator(typed_validator(
                    StepPayload::as_distribution,
                    |p: &DistributionPayload| {
                        require_true(p.acknowledged_irreversible, "acknowledgedIrreversible")?;
                        require_true(p.confirmation_accepted, "confirmationAccepted")
                    },
                )),
        ]
    }
}

fn validate_amount(p: &DistributionPayload) -> Result<(), ValidationError> {
    let amount = require_positive(p.amount, "amount")?;
    match p.vested_balance {
        Some(vested) if amount > vested => Err(ValidationError::invalid(
            "amount",
            "amount cannot exceed the vested balance",
        )),
        _ => Ok(()),
    }
}
