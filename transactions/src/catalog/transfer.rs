//! Fund-to-fund transfer flow.

use crate::catalog::{
    require_positive, require_text, require_true, typed_validator, CatalogLimits,
    CatalogProvider, StepDefinition, ValidationError,
};
use crate::payload::{StepPayload, TransferPayload};
use crate::types::TransactionType;

/// Provider for the transfer step list.
pub struct TransferCatalog;

impl CatalogProvider for TransferCatalog {
    fn transaction_type(&self) -> TransactionType {
        TransactionType::Transfer
    }

    fn steps(&self, _limits: &CatalogLimits) -> Vec<StepDefinition> {
        vec![
            StepDefinition::new("source", "transactions.transfer.steps.source").with_validator(
                typed_validator(StepPayload::as_transfer, |p: &TransferPayload| {
                    require_text(&p.source_fund, "sourceFund")
                }),
            ),
            StepDefinition::new("destination", "transactions.transfer.steps.destination")
                .with_validator(typed_validator(StepPayload::as_transfer, validate_destination)),
            StepDefinition::new("review", "transactions.transfer.steps.review").with_validator(
                typed_validator(StepPayload::as_transfer, |p: &TransferPayload| {
                    require_true(p.confirmation_accepted, "confirmationAccepted")
                }),
            ),
        ]
    }
}

fn validate_destination(p: &TransferPayload) -> Result<(), ValidationError> {
    require_text(&p.destination_fund, "destinationFund")?;
    let same_fund = matches!(
        (p.source_fund.as_deref(), p.destination_fund.as_deref()),
        (Some(source), Some(destination)) if source.trim().eq_ignore_ascii_case(destination.trim())
    );
    if same_fund {
        return Err(ValidationError::invalid(
            "destinationFund",
            "destinationFund must differ from sourceFund",
        ));
    }
    require_positive(p.amount, "amount").map(|_| ())
}
