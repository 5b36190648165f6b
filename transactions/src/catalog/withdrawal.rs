//! In-service withdrawal flow.
//!
//! The amount step enforces the plan's cap on withdrawals, a percentage of
//! the vested balance supplied by the account data provider.

use rust_decimal::Decimal;

use crate::catalog::{
    require_positive, require_text, require_true, typed_validator, validate_payment,
    CatalogLimits, CatalogProvider, StepDefinition, ValidationError,
};
use crate::payload::{StepPayload, WithdrawalPayload};
use crate::types::TransactionType;

/// Provider for the withdrawal step list.
pub struct WithdrawalCatalog;

impl CatalogProvider for WithdrawalCatalog {
    fn transaction_type(&self) -> TransactionType {
        TransactionType::Withdrawal
    }

    fn steps(&self, limits: &CatalogLimits) -> Vec<StepDefinition> {
        let amount_limits = limits.clone();
        let payment_limits = limits.clone();

        vec![
            StepDefinition::new("reason", "transactions.withdrawal.steps.reason").with_validator(
                typed_validator(StepPayload::as_withdrawal, |p: &WithdrawalPayload| {
                    require_text(&p.withdrawal_reason, "withdrawalReason")
                }),
            ),
            StepDefinition::new("amount", "transactions.withdrawal.steps.amount").with_validator(
                typed_validator(StepPayload::as_withdrawal, move |p: &WithdrawalPayload| {
                    validate_amount(p, &amount_limits)
                }),
            ),
            StepDefinition::new("payment", "transactions.withdrawal.steps.payment").with_validator(
                typed_validator(StepPayload::as_withdrawal, move |p: &WithdrawalPayload| {
                    validate_withholding(p.federal_withholding_pct)?;
                    validate_payment(&p.payment, &payment_limits)
                }),
            ),
            StepDefinition::new("review", "transactions.withdrawal.steps.review").with_validator(
                typed_validator(StepPayload::as_withdrawal, |p: &WithdrawalPayload| {
                    require_true(p.acknowledged_irreversible, "acknowledgedIrreversible")?;
                    require_true(p.confirmation_accepted, "confirmationAccepted")
                }),
            ),
        ]
    }
}

fn validate_amount(p: &WithdrawalPayload, limits: &CatalogLimits) -> Result<(), ValidationError> {
    let amount = require_positive(p.amount, "amount")?;
    let vested = p
        .vested_balance
        .ok_or_else(|| ValidationError::missing("vestedBalance"))?;

    let cap = limits.withdrawal_cap(vested);
    if amount > cap {
        return Err(ValidationError::invalid(
            "amount",
            format!(
                "amount exceeds the {}% withdrawal limit of {}",
                limits.withdrawal_cap_pct, cap
            ),
        ));
    }
    Ok(())
}

/// Elected withholding, when present, is a percentage.
pub(crate) fn validate_withholding(pct: Option<Decimal>) -> Result<(), ValidationError> {
    match pct {
        Some(pct) if pct < Decimal::ZERO || pct > Decimal::from(100) => Err(
            ValidationError::invalid("federalWithholdingPct", "federalWithholdingPct must be between 0 and 100"),
        ),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn withdrawal(value: serde_json::Value) -> StepPayload {
        StepPayload::from_json(TransactionType::Withdrawal, value).unwrap()
    }

    #[tokio::test]
    async fn test_amount_over_cap_rejected() {
        let steps = WithdrawalCatalog.steps(&CatalogLimits::default());
        let payload = withdrawal(json!({"vestedBalance": 100000, "amount": 30000}));
        let err = steps[1].check(&payload).await.unwrap_err();
        assert_eq!(err.field.as_deref(), Some("amount"));
    }

    #[tokio::test]
    async fn test_amount_at_cap_accepted() {
        let steps = WithdrawalCatalog.steps(&CatalogLimits::default());
        let payload = withdrawal(json!({"vestedBalance": 100000, "amount": 25000}));
        assert!(steps[1].check(&payload).await.is_ok());
    }

    #[tokio::test]
    async fn test_amount_needs_vested_balance() {
        let steps = WithdrawalCatalog.steps(&CatalogLimits::default());
        let payload = withdrawal(json!({"amount": 100}));
        let err = steps[1].check(&payload).await.unwrap_err();
        assert_eq!(err.field.as_deref(), Some("vestedBalance"));
    }

    #[tokio::test]
    async fn test_custom_cap() {
        let limits = CatalogLimits {
            withdrawal_cap_pct: Decimal::from(50),
            ..Default::default()
        };
        let steps = WithdrawalCatalog.steps(&limits);
        let payload = withdrawal(json!({"vestedBalance": 100000, "amount": 30000}));
        assert!(steps[1].check(&payload).await.is_ok());
    }

    #[tokio::test]
    async fn test_withholding_range() {
        let steps = WithdrawalCatalog.steps(&CatalogLimits::default());
        let payload = withdrawal(json!({
            "federalWithholdingPct": 120,
            "paymentMethod": "CHECK",
            "mailingAddress": "1 Main St"
        }));
        let err = steps[2].check(&payload).await.unwrap_err();
        assert_eq!(err.field.as_deref(), Some("federalWithholdingPct"));
    }

    #[tokio::test]
    async fn test_review_requires_irreversibility_acknowledgement() {
        let steps = WithdrawalCatalog.steps(&CatalogLimits::default());
        assert!(steps[3]
            .check(&withdrawal(json!({"confirmationAccepted": true})))
            .await
            .is_err());
        assert!(steps[3]
            .check(&withdrawal(json!({"confirmationAccepted": true, "acknowledgedIrreversible": true})))
            .await
            .is_ok());
    }
}
