//! What a submission writes back to the transaction record.
//!
//! The engine hands the accumulated payload and the classified impact to
//! [`SubmissionPolicy::build_patch`]; only the fields it sets reach the
//! store. Everything else in the payload stays out of the record.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use plan_transactions::{
    MonetaryBreakdown, RetirementImpact, StepPayload, Transaction, TransactionPatch,
    TransactionStatus, TransactionType,
};

use crate::config::SubmissionConfig;
use crate::types::{EngineError, Result};

/// Decides status, fees and withholding for submitted transactions.
#[derive(Debug, Clone, Default)]
pub struct SubmissionPolicy {
    config: SubmissionConfig,
}

impl SubmissionPolicy {
    pub fn new(config: SubmissionConfig) -> Self {
        Self { config }
    }

    /// Whether this type settles on submit.
    pub fn completes_instantly(&self, transaction_type: TransactionType) -> bool {
        self.config.instant_types.contains(&transaction_type)
    }

    /// Status a submission moves the transaction to.
    pub fn resulting_status(&self, transaction_type: TransactionType) -> TransactionStatus {
        if self.completes_instantly(transaction_type) {
            TransactionStatus::Completed
        } else {
            TransactionStatus::Active
        }
    }

    /// Gross-to-net figures, for types that carry them.
    ///
    /// Withdrawals and distributions withhold the larger of the elected
    /// percentage and the mandatory minimum. Loans are not taxed.
    pub fn breakdown(
        &self,
        transaction_type: TransactionType,
        payload: &StepPayload,
        gross_amount: Decimal,
    ) -> Result<Option<MonetaryBreakdown>> {
        let (fees, withholding_pct) = match transaction_type {
            TransactionType::Loan => (self.config.loan_processing_fee, Decimal::ZERO),
            TransactionType::Withdrawal | TransactionType::Distribution => {
                let elected = payload
                    .elected_withholding_pct()
                    .unwrap_or(Decimal::ZERO)
                    .clamp(Decimal::ZERO, Decimal::ONE_HUNDRED);
                (
                    self.config.withdrawal_processing_fee,
                    elected.max(self.config.mandatory_withholding_pct),
                )
            }
            _ => return Ok(None),
        };

        let tax_withholding = gross_amount
            .checked_mul(withholding_pct)
            .ok_or(EngineError::AmountOutOfRange(gross_amount))?
            / Decimal::ONE_HUNDRED;
        Ok(Some(MonetaryBreakdown::from_gross(
            gross_amount,
            fees,
            tax_withholding.round_dp(2),
        )))
    }

    /// Patch applied to the record on a successful submission.
    ///
    /// The patch only lands while the record is still a draft at the
    /// version the engine read.
    pub fn build_patch(
        &self,
        transaction: &Transaction,
        payload: &StepPayload,
        amount: Decimal,
        impact: RetirementImpact,
        today: NaiveDate,
    ) -> Result<TransactionPatch> {
        let transaction_type = transaction.transaction_type;
        let status = self.resulting_status(transaction_type);

        let mut patch = TransactionPatch::new()
            .amount(amount)
            .status(status)
            .retirement_impact(impact)
            .irreversible(transaction_type.is_irreversible())
            .legal_confirmations(payload.legal_confirmations())
            .expect_version(transaction.version)
            .require_status(TransactionStatus::Draft);

        if let Some(breakdown) = self.breakdown(transaction_type, payload, amount)? {
            patch = patch.breakdown(breakdown);
        }
        if status == TransactionStatus::Completed {
            patch = patch.date_completed(today);
        }
        Ok(patch)
    }
}
