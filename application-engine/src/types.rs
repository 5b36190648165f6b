//! Core types for the application engine.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use plan_transactions::{
    PayloadError, StepPayload, StoreError, SuccessKind, Transaction, TransactionStatus,
    TransactionType, UnknownTransactionType,
};

/// Shown when a non-final step fails validation.
pub const INCOMPLETE_STEP_MESSAGE: &str = "Please complete all required fields before continuing.";

/// Shown when the final review step fails validation.
pub const CONFIRM_TERMS_MESSAGE: &str = "Please review and confirm the terms to submit your request.";

/// Options for attaching an engine to a transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttachOptions {
    /// Type the caller's route implies; a different stored type is rejected
    pub expected_type: Option<TransactionType>,
    /// Open as read-only even when the transaction is still a draft
    pub force_read_only: bool,
}

impl AttachOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require the stored transaction to be of this type.
    pub fn expect_type(mut self, transaction_type: TransactionType) -> Self {
        self.expected_type = Some(transaction_type);
        self
    }

    /// Review mode.
    pub fn read_only(mut self) -> Self {
        self.force_read_only = true;
        self
    }
}

/// Result of starting or resuming an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachOutcome {
    pub transaction_id: String,
    /// A draft was just created; the caller should re-route to its id
    pub redirect: bool,
}

/// One entry of the step indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSummary {
    pub step_id: String,
    pub label: String,
}

/// Everything a UI needs to render the current step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    pub transaction: Transaction,
    pub steps: Vec<StepSummary>,
    pub current_step_index: usize,
    pub total_steps: usize,
    pub current_step: StepSummary,
    pub is_final_step: bool,
    pub read_only: bool,
    /// Set when the last advance attempt was rejected
    pub validation_error: Option<String>,
    pub payload: StepPayload,
}

/// Confirmation returned once a submission is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReceipt {
    pub transaction_id: String,
    pub success_kind: SuccessKind,
    pub amount: Decimal,
    pub status: TransactionStatus,
}

/// What happened when the participant pressed Next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AdvanceOutcome {
    /// Moved to the step at this index
    Advanced { step_index: usize },
    /// Validation failed; the step did not change
    Blocked { message: String },
    /// The final step was submitted
    Submitted(SubmitReceipt),
    /// Read-only and already on the last step
    Unchanged,
}

impl AdvanceOutcome {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. })
    }

    pub fn receipt(&self) -> Option<&SubmitReceipt> {
        match self {
            Self::Submitted(receipt) => Some(receipt),
            _ => None,
        }
    }
}

/// Signal that the participant left the flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionExit {
    pub transaction_id: String,
    pub status: TransactionStatus,
}

/// Filter for listing transactions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    pub status: Option<TransactionStatus>,
    pub transaction_type: Option<TransactionType>,
    pub plan_id: Option<String>,
}

impl TransactionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: TransactionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn transaction_type(mut self, transaction_type: TransactionType) -> Self {
        self.transaction_type = Some(transaction_type);
        self
    }

    pub fn plan(mut self, plan_id: impl Into<String>) -> Self {
        self.plan_id = Some(plan_id.into());
        self
    }

    /// Check a transaction against every set criterion.
    pub fn matches(&self, transaction: &Transaction) -> bool {
        self.status.map_or(true, |s| transaction.status == s)
            && self
                .transaction_type
                .map_or(true, |t| transaction.transaction_type == t)
            && self
                .plan_id
                .as_deref()
                .map_or(true, |p| transaction.plan_id.as_deref() == Some(p))
    }
}

/// Error types for the application engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No transaction with this id
    #[error("Transaction not found: {0}")]
    NotFound(String),

    /// Stored type differs from the one the caller asked for
    #[error("Transaction {id} is a {found}, not a {expected}")]
    TypeMismatch {
        id: String,
        expected: TransactionType,
        found: TransactionType,
    },

    /// Submission attempted before the final step
    #[error("Cannot submit from step {current} of {total}")]
    NotOnFinalStep { current: usize, total: usize },

    /// Mutation attempted on a non-draft or review-mode transaction
    #[error("Transaction {0} is read-only")]
    ReadOnly(String),

    /// Submitted amount too large to compute withholding for
    #[error("Amount out of range: {0}")]
    AmountOutOfRange(Decimal),

    /// Step data could not be decoded
    #[error("Invalid step data: {0}")]
    InvalidPayload(String),

    /// Route carried an unsupported type key
    #[error(transparent)]
    UnknownType(#[from] UnknownTransactionType),

    /// Persistence failure
    #[error("Store error: {0}")]
    Store(StoreError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => EngineError::NotFound(id),
            other => EngineError::Store(other),
        }
    }
}

impl EngineError {
    /// Map a payload error for the transaction it was applied to.
    pub fn from_payload(id: &str, err: PayloadError) -> Self {
        match err {
            PayloadError::TypeMismatch { expected, found } => EngineError::TypeMismatch {
                id: id.to_string(),
                expected,
                found,
            },
            PayloadError::InvalidJson { .. } => EngineError::InvalidPayload(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use plan_transactions::RetirementImpact;

    fn transaction(status: TransactionStatus, plan_id: Option<&str>) -> Transaction {
        Transaction {
            id: "t-1".to_string(),
            transaction_type: TransactionType::Loan,
            status,
            amount: Decimal::ZERO,
            gross_amount: None,
            net_amount: None,
            fees: None,
            tax_withholding: None,
            date_initiated: Utc::now().date_naive(),
            date_completed: None,
            retirement_impact: RetirementImpact::pending(),
            is_irreversible: false,
            legal_confirmations: vec![],
            plan_id: plan_id.map(str::to_string),
            version: 0,
        }
    }

    #[test]
    fn test_filter_matches() {
        let draft = transaction(TransactionStatus::Draft, Some("plan-a"));

        assert!(TransactionFilter::new().matches(&draft));
        assert!(TransactionFilter::new()
            .status(TransactionStatus::Draft)
            .transaction_type(TransactionType::Loan)
            .plan("plan-a")
            .matches(&draft));
        assert!(!TransactionFilter::new()
            .status(TransactionStatus::Active)
            .matches(&draft));
        assert!(!TransactionFilter::new().plan("plan-b").matches(&draft));
        assert!(!TransactionFilter::new()
            .plan("plan-a")
            .matches(&transaction(TransactionStatus::Draft, None)));
    }

    #[test]
    fn test_store_not_found_maps_to_not_found() {
        let err: EngineError = StoreError::NotFound("x".to_string()).into();
        assert!(matches!(err, EngineError::NotFound(id) if id == "x"));

        let err: EngineError = StoreError::StorageError("down".to_string()).into();
        assert!(matches!(err, EngineError::Store(_)));
    }

    #[test]
    fn test_payload_mismatch_maps_to_type_mismatch() {
        let mut payload = StepPayload::empty(TransactionType::Loan);
        let err = payload
            .merge(StepPayload::empty(TransactionType::Rollover))
            .unwrap_err();
        assert!(matches!(
            EngineError::from_payload("t-1", err),
            EngineError::TypeMismatch {
                expected: TransactionType::Loan,
                found: TransactionType::Rollover,
                ..
            }
        ));
    }

    #[test]
    fn test_advance_outcome_serializes_tagged() {
        let json = serde_json::to_value(AdvanceOutcome::Advanced { step_index: 1 }).unwrap();
        assert_eq!(json["outcome"], "advanced");
        assert_eq!(json["step_index"], 1);
    }
}
