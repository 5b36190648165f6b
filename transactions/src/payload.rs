//! Typed step data accumulated while a participant fills in a request.
//!
//! Every transaction type has its own payload struct. All fields are
//! optional: the UI sends partial updates as the participant moves through
//! the steps, and [`StepPayload::merge`] folds them in shallowly (a field
//! present in the update replaces the stored one, absent fields are kept).
//!
//! Field names serialize in camelCase to match what the front end posts.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::TransactionType;

/// Error types for payload handling.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    /// An update for one transaction type was applied to another
    #[error("Payload for {found} cannot be applied to a {expected} transaction")]
    TypeMismatch {
        expected: TransactionType,
        found: TransactionType,
    },

    /// Step data could not be decoded
    #[error("Invalid step data for {transaction_type}: {source}")]
    InvalidJson {
        transaction_type: TransactionType,
        #[source]
        source: serde_json::Error,
    },
}

fn merge_field<T>(slot: &mut Option<T>, incoming: Option<T>) {
    if incoming.is_some() {
        *slot = incoming;
    }
}

fn affirmed(flag: Option<bool>) -> bool {
    flag.unwrap_or(false)
}

/// How the proceeds are paid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentMethod {
    /// Electronic funds transfer to a bank account
    #[serde(alias = "eft", alias = "Eft")]
    Eft,
    /// Paper check mailed to the participant
    #[serde(alias = "check", alias = "Check")]
    Check,
}

/// Disbursement instructions shared by loans, withdrawals and distributions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInstructions {
    pub payment_method: Option<PaymentMethod>,
    pub routing_number: Option<String>,
    pub account_number: Option<String>,
    pub mailing_address: Option<String>,
}

impl PaymentInstructions {
    fn merge(&mut self, patch: Self) {
        merge_field(&mut self.payment_method, patch.payment_method);
        merge_field(&mut self.routing_number, patch.routing_number);
        merge_field(&mut self.account_number, patch.account_number);
        merge_field(&mut self.mailing_address, patch.mailing_address);
    }
}

/// Step data for a loan request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanPayload {
    pub loan_amount: Option<Decimal>,
    /// Generic amount field some screens post instead of `loanAmount`
    pub amount: Option<Decimal>,
    pub loan_term_months: Option<u32>,
    pub loan_purpose: Option<String>,
    #[serde(flatten)]
    pub payment: PaymentInstructions,
    pub agreed_to_terms: Option<bool>,
    pub agreed_to_disclosures: Option<bool>,
    pub spousal_consent: Option<bool>,
    pub confirmation_accepted: Option<bool>,
}

impl LoanPayload {
    fn merge(&mut self, patch: Self) {
        merge_field(&mut self.loan_amount, patch.loan_amount);
        merge_field(&mut self.amount, patch.amount);
        merge_field(&mut self.loan_term_months, patch.loan_term_months);
        merge_field(&mut self.loan_purpose, patch.loan_purpose);
        self.payment.merge(patch.payment);
        merge_field(&mut self.agreed_to_terms, patch.agreed_to_terms);
        merge_field(&mut self.agreed_to_disclosures, patch.agreed_to_disclosures);
        merge_field(&mut self.spousal_consent, patch.spousal_consent);
        merge_field(&mut self.confirmation_accepted, patch.confirmation_accepted);
    }

    /// Requested principal: `loanAmount`, falling back to `amount`.
    pub fn requested_amount(&self) -> Option<Decimal> {
        self.loan_amount.or(self.amount)
    }
}

/// Step data for an in-service withdrawal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalPayload {
    pub withdrawal_reason: Option<String>,
    /// Vested balance supplied by the account data provider
    pub vested_balance: Option<Decimal>,
    pub amount: Option<Decimal>,
    /// Elected federal withholding, percent
    pub federal_withholding_pct: Option<Decimal>,
    #[serde(flatten)]
    pub payment: PaymentInstructions,
    pub acknowledged_irreversible: Option<bool>,
    pub confirmation_accepted: Option<bool>,
}

impl WithdrawalPayload {
    fn merge(&mut self, patch: Self) {
        merge_field(&mut self.withdrawal_reason, patch.withdrawal_reason);
        merge_field(&mut self.vested_balance, patch.vested_balance);
        merge_field(&mut self.amount, patch.amount);
        merge_field(&mut self.federal_withholding_pct, patch.federal_withholding_pct);
        self.payment.merge(patch.payment);
        merge_field(&mut self.acknowledged_irreversible, patch.acknowledged_irreversible);
        merge_field(&mut self.confirmation_accepted, patch.confirmation_accepted);
    }
}

/// Step data for a post-separation distribution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionPayload {
    /// Lump sum, installments, annuity...
    pub distribution_option: Option<String>,
    pub vested_balance: Option<Decimal>,
    pub amount: Option<Decimal>,
    pub federal_withholding_pct: Option<Decimal>,
    #[serde(flatten)]
    pub payment: PaymentInstructions,
    pub acknowledged_irreversible: Option<bool>,
    pub confirmation_accepted: Option<bool>,
}

impl DistributionPayload {
    fn merge(&mut self, patch: Self) {
        merge_field(&mut self.distribution_option, patch.distribution_option);
        merge_field(&mut self.vested_balance, patch.vested_balance);
        merge_field(&mut self.amount, patch.amount);
        merge_field(&mut self.federal_withholding_pct, patch.federal_withholding_pct);
        self.payment.merge(patch.payment);
        merge_field(&mut self.acknowledged_irreversible, patch.acknowledged_irreversible);
        merge_field(&mut self.confirmation_accepted, patch.confirmation_accepted);
    }
}

/// Step data for an incoming rollover.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolloverPayload {
    /// Kind of account being rolled in (401(k), IRA, 403(b)...)
    pub source_account_type: Option<String>,
    pub estimated_balance: Option<Decimal>,
    pub amount: Option<Decimal>,
    pub provider_name: Option<String>,
    pub provider_account_number: Option<String>,
    pub confirmation_accepted: Option<bool>,
}

impl RolloverPayload {
    fn merge(&mut self, patch: Self) {
        merge_field(&mut self.source_account_type, patch.source_account_type);
        merge_field(&mut self.estimated_balance, patch.estimated_balance);
        merge_field(&mut self.amount, patch.amount);
        merge_field(&mut self.provider_name, patch.provider_name);
        merge_field(&mut self.provider_account_number, patch.provider_account_number);
        merge_field(&mut self.confirmation_accepted, patch.confirmation_accepted);
    }
}

/// Step data for a fund-to-fund transfer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferPayload {
    pub source_fund: Option<String>,
    pub destination_fund: Option<String>,
    pub amount: Option<Decimal>,
    pub confirmation_accepted: Option<bool>,
}

impl TransferPayload {
    fn merge(&mut self, patch: Self) {
        merge_field(&mut self.source_fund, patch.source_fund);
        merge_field(&mut self.destination_fund, patch.destination_fund);
        merge_field(&mut self.amount, patch.amount);
        merge_field(&mut self.confirmation_accepted, patch.confirmation_accepted);
    }
}

/// Step data for an account rebalance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalancePayload {
    /// Target percentage per fund; replaced as a whole on merge
    pub allocations: Option<BTreeMap<String, Decimal>>,
    /// Current account balance, used as the request amount
    pub total_balance: Option<Decimal>,
    pub confirmation_accepted: Option<bool>,
}

impl RebalancePayload {
    fn merge(&mut self, patch: Self) {
        merge_field(&mut self.allocations, patch.allocations);
        merge_field(&mut self.total_balance, patch.total_balance);
        merge_field(&mut self.confirmation_accepted, patch.confirmation_accepted);
    }
}

/// Accumulated step data, one variant per transaction type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StepPayload {
    Loan(LoanPayload),
    Withdrawal(WithdrawalPayload),
    Distribution(DistributionPayload),
    Rollover(RolloverPayload),
    Transfer(TransferPayload),
    Rebalance(RebalancePayload),
}

impl StepPayload {
    /// Empty payload for a transaction type.
    pub fn empty(transaction_type: TransactionType) -> Self {
        match transaction_type {
            TransactionType::Loan => Self::Loan(LoanPayload::default()),
            TransactionType::Withdrawal => Self::Withdrawal(WithdrawalPayload::default()),
            TransactionType::Distribution => Self::Distribution(DistributionPayload::default()),
            TransactionType::Rollover => Self::Rollover(RolloverPayload::default()),
            TransactionType::Transfer => Self::Transfer(TransferPayload::default()),
            TransactionType::Rebalance => Self::Rebalance(RebalancePayload::default()),
        }
    }

    /// Decode a partial update posted by the UI for the given type.
    ///
    /// Unknown keys are ignored so older screens keep working.
    pub fn from_json(
        transaction_type: TransactionType,
        value: serde_json::Value,
    ) -> Result<Self, PayloadError> {
        let wrap = |source| PayloadError::InvalidJson {
            transaction_type,
            source,
        };
        Ok(match transaction_type {
            TransactionType::Loan => Self::Loan(serde_json::from_value(value).map_err(wrap)?),
            TransactionType::Withdrawal => {
                Self::Withdrawal(serde_json::from_value(value).map_err(wrap)?)
            }
            TransactionType::Distribution => {
                Self::Distribution(serde_json::from_value(value).map_err(wrap)?)
            }
            TransactionType::Rollover => {
                Self::Rollover(serde_json::from_value(value).map_err(wrap)?)
            }
            TransactionType::Transfer => {
                Self::Transfer(serde_json::from_value(value).map_err(wrap)?)
            }
            TransactionType::Rebalance => {
                Self::Rebalance(serde_json::from_value(value).map_err(wrap)?)
            }
        })
    }

    /// Transaction type this payload belongs to.
    pub fn transaction_type(&self) -> TransactionType {
        match self {
            Self::Loan(_) => TransactionType::Loan,
            Self::Withdrawal(_) => TransactionType::Withdrawal,
            Self::Distribution(_) => TransactionType::Distribution,
            Self::Rollover(_) => TransactionType::Rollover,
            Self::Transfer(_) => TransactionType::Transfer,
            Self::Rebalance(_) => TransactionType::Rebalance,
        }
    }

    /// Shallow-merge a partial update of the same type into this payload.
    pub fn merge(&mut self, patch: StepPayload) -> Result<(), PayloadError> {
        match (self, patch) {
            (Self::Loan(current), Self::Loan(patch)) => current.merge(patch),
            (Self::Withdrawal(current), Self::Withdrawal(patch)) => current.merge(patch),
            (Self::Distribution(current), Self::Distribution(patch)) => current.merge(patch),
            (Self::Rollover(current), Self::Rollover(patch)) => current.merge(patch),
            (Self::Transfer(current), Self::Transfer(patch)) => current.merge(patch),
            (Self::Rebalance(current), Self::Rebalance(patch)) => current.merge(patch),
            (current, patch) => {
                return Err(PayloadError::TypeMismatch {
                    expected: current.transaction_type(),
                    found: patch.transaction_type(),
                })
            }
        }
        Ok(())
    }

    /// Amount the participant asked for, read from the type-specific key.
    ///
    /// Rollovers prefer `estimatedBalance`, loans `loanAmount`, rebalances
    /// the account's `totalBalance`; every other type reads `amount`.
    pub fn requested_amount(&self) -> Option<Decimal> {
        match self {
            Self::Loan(p) => p.requested_amount(),
            Self::Withdrawal(p) => p.amount,
            Self::Distribution(p) => p.amount,
            Self::Rollover(p) => p.estimated_balance.or(p.amount),
            Self::Transfer(p) => p.amount,
            Self::Rebalance(p) => p.total_balance,
        }
    }

    /// Withholding percentage the participant elected, if the type has one.
    pub fn elected_withholding_pct(&self) -> Option<Decimal> {
        match self {
            Self::Withdrawal(p) => p.federal_withholding_pct,
            Self::Distribution(p) => p.federal_withholding_pct,
            _ => None,
        }
    }

    /// Labels of the acknowledgements this payload affirms, in display order.
    pub fn legal_confirmations(&self) -> Vec<String> {
        let mut labels: Vec<&str> = Vec::new();
        match self {
            Self::Loan(p) => {
                if affirmed(p.agreed_to_terms) {
                    labels.push("Loan terms and repayment schedule");
                }
                if affirmed(p.agreed_to_disclosures) {
                    labels.push("Truth in Lending disclosures");
                }
                if affirmed(p.spousal_consent) {
                    labels.push("Spousal consent");
                }
            }
            Self::Withdrawal(p) => {
                if affirmed(p.acknowledged_irreversible) {
                    labels.push("Withdrawals cannot be reversed or repaid");
                }
            }
            Self::Distribution(p) => {
                if affirmed(p.acknowledged_irreversible) {
                    labels.push("Distributions cannot be reversed");
                }
            }
            Self::Rollover(_) | Self::Transfer(_) | Self::Rebalance(_) => {}
        }
        if affirmed(self.confirmation_accepted()) {
            labels.push("Information provided is accurate and complete");
        }
        labels.into_iter().map(str::to_string).collect()
    }

    /// The final-step confirmation checkbox.
    pub fn confirmation_accepted(&self) -> Option<bool> {
        match self {
            Self::Loan(p) => p.confirmation_accepted,
            Self::Withdrawal(p) => p.confirmation_accepted,
            Self::Distribution(p) => p.confirmation_accepted,
            Self::Rollover(p) => p.confirmation_accepted,
            Self::Transfer(p) => p.confirmation_accepted,
            Self::Rebalance(p) => p.confirmation_accepted,
        }
    }

    pub fn as_loan(&self) -> Option<&LoanPayload> {
        match self {
            Self::Loan(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_withdrawal(&self) -> Option<&WithdrawalPayload> {
        match self {
            Self::Withdrawal(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_distribution(&self) -> Option<&DistributionPayload> {
        match self {
            Self::Distribution(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_rollover(&self) -> Option<&RolloverPayload> {
        match self {
            Self::Rollover(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_transfer(&self) -> Option<&TransferPayload> {
        match self {
            Self::Transfer(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_rebalance(&self) -> Option<&RebalancePayload> {
        match self {
            Self::Rebalance(p) => Some(p),
            _ => None,
        }
    }
}
