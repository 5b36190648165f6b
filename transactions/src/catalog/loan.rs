//! Loan application flow.
//!
//! Disbursement details first, then the loan agreement, then a final
//! confirmation. The principal usually arrives pre-filled from the loan
//! modeler, so it is checked wherever it shows up rather than on its own step.

use crate::catalog::{
    require_true, typed_validator, validate_payment, CatalogLimits, CatalogProvider,
    StepDefinition, ValidationError,
};
use crate::payload::{LoanPayload, StepPayload};
use crate::types::TransactionType;

/// Provider for the loan step list.
pub struct LoanCatalog;

impl CatalogProvider for LoanCatalog {
    fn transaction_type(&self) -> TransactionType {
        TransactionType::Loan
    }

    fn steps(&self, limits: &CatalogLimits) -> Vec<StepDefinition> {
        let disbursement_limits = limits.clone();

        vec![
            StepDefinition::new("disbursement", "transactions.loan.steps.disbursement")
                .with_validator(typed_validator(StepPayload::as_loan, move |p: &LoanPayload| {
                    validate_disbursement(p, &disbursement_limits)
                })),
            StepDefinition::new("terms", "transactions.loan.steps.terms")
                .with_validator(typed_validator(StepPayload::as_loan, validate_terms)),
            StepDefinition::new("review", "transactions.loan.steps.review")
                .with_validator(typed_validator(StepPayload::as_loan, |p: &LoanPayload| {
                    require_true(p.confirmation_accepted, "confirmationAccepted")
                })),
        ]
    }
}

fn validate_disbursement(p: &LoanPayload, limits: &CatalogLimits) -> Result<(), ValidationError> {
    validate_payment(&p.payment, limits)?;

    if let Some(principal) = p.requested_amount() {
        if principal <= rust_decimal::Decimal::ZERO {
            return Err(ValidationError::invalid(
                "loanAmount",
                "loanAmount must be greater than zero",
            ));
        }
        if principal > limits.max_loan_amount {
            return Err(ValidationError::invalid(
                "loanAmount",
                format!("loanAmount cannot exceed {}", limits.max_loan_amount),
            ));
        }
    }
    Ok(())
}

fn validate_terms(p: &LoanPayload) -> Result<(), ValidationError> {
    require_true(p.agreed_to_terms, "agreedToTerms")?;
    require_true(p.agreed_to_disclosures, "agreedToDisclosures")?;
    require_true(p.spousal_consent, "spousalConsent")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn loan(value: serde_json::Value) -> StepPayload {
        StepPayload::from_json(TransactionType::Loan, value).unwrap()
    }

    #[tokio::test]
    async fn test_disbursement_step() {
        let steps = LoanCatalog.steps(&CatalogLimits::default());

        let ok = loan(json!({"paymentMethod": "EFT", "routingNumber": "123456789", "accountNumber": "12345"}));
        assert!(steps[0].check(&ok).await.is_ok());

        let over_limit = loan(json!({
            "paymentMethod": "EFT",
            "routingNumber": "123456789",
            "accountNumber": "12345",
            "loanAmount": 60000
        }));
        assert!(steps[0].check(&over_limit).await.is_err());
    }

    #[tokio::test]
    async fn test_terms_need_every_acknowledgement() {
        let steps = LoanCatalog.steps(&CatalogLimits::default());

        let partial = loan(json!({"agreedToTerms": true, "agreedToDisclosures": true}));
        let err = steps[1].check(&partial).await.unwrap_err();
        assert_eq!(err.field.as_deref(), Some("spousalConsent"));

        let full = loan(json!({"agreedToTerms": true, "agreedToDisclosures": true, "spousalConsent": true}));
        assert!(steps[1].check(&full).await.is_ok());
    }

    #[tokio::test]
    async fn test_review_needs_confirmation() {
        let steps = LoanCatalog.steps(&CatalogLimits::default());
        assert!(steps[2].check(&loan(json!({}))).await.is_err());
        assert!(steps[2]
            .check(&loan(json!({"confirmationAccepted": true})))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_other_payload_type_fails() {
        let steps = LoanCatalog.steps(&CatalogLimits::default());
        let transfer = StepPayload::empty(TransactionType::Transfer);
        assert!(steps[2].check(&transfer).await.is_err());
    }
}
