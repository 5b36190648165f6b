//! Transaction storage.
//!
//! [`TransactionRepository`] is the persistence boundary the engine calls
//! through. [`InMemoryTransactionStore`] is the in-process implementation:
//! records live in a sharded concurrent map, so readers never block each
//! other and every write to a given id runs under that entry's lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::payload::StepPayload;
use crate::types::{
    RetirementImpact, Transaction, TransactionPatch, TransactionStatus, TransactionType,
};

/// Error types for store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No transaction with this id
    #[error("Transaction not found: {0}")]
    NotFound(String),

    /// Status change would move the lifecycle backwards or out of a terminal state
    #[error("Transaction {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: TransactionStatus,
        to: TransactionStatus,
    },

    /// Working state can only be saved for drafts
    #[error("Transaction {id} is {status}; progress is only kept for drafts")]
    NotDraft { id: String, status: TransactionStatus },

    /// Backend failure
    #[error("Storage error: {0}")]
    StorageError(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Where a participant left off in a draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftProgress {
    /// Step the participant was on
    pub step_index: usize,
    /// Everything entered so far
    pub payload: StepPayload,
    pub saved_at: DateTime<Utc>,
}

impl DraftProgress {
    pub fn new(step_index: usize, payload: StepPayload) -> Self {
        Self {
            step_index,
            payload,
            saved_at: Utc::now(),
        }
    }
}

/// Persistence boundary for transaction records.
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Create a new draft with a fresh id. Never reuses an id.
    async fn create_draft(
        &self,
        transaction_type: TransactionType,
        plan_id: Option<String>,
    ) -> StoreResult<Transaction>;

    async fn get(&self, id: &str) -> StoreResult<Transaction>;

    /// Merge a patch onto the stored record atomically.
    async fn update(&self, id: &str, patch: TransactionPatch) -> StoreResult<Transaction>;

    async fn list(&self) -> Vec<Transaction>;

    async fn list_by_status(&self, status: TransactionStatus) -> Vec<Transaction>;

    async fn list_by_type(&self, transaction_type: TransactionType) -> Vec<Transaction>;

    async fn list_by_plan(&self, plan_id: &str) -> Vec<Transaction>;

    /// Cancel a draft. Any other status is an invalid transition.
    async fn cancel(&self, id: &str) -> StoreResult<Transaction>;

    /// Remember a draft's working state so it can be resumed.
    async fn save_progress(&self, id: &str, progress: DraftProgress) -> StoreResult<()>;

    async fn load_progress(&self, id: &str) -> StoreResult<Option<DraftProgress>>;

    async fn clear_progress(&self, id: &str);
}

/// In-process transaction store.
///
/// Construct once at startup and share it behind an `Arc`.
#[derive(Default)]
pub struct InMemoryTransactionStore {
    records: DashMap<String, Transaction>,
    progress: DashMap<String, DraftProgress>,
}

impl InMemoryTransactionStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn filtered(&self, predicate: impl Fn(&Transaction) -> bool) -> Vec<Transaction> {
        self.records
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect()
    }
}

fn new_draft(transaction_type: TransactionType, plan_id: Option<String>) -> Transaction {
    Transaction {
        id: uuid::Uuid::new_v4().to_string(),
        transaction_type,
        status: TransactionStatus::Draft,
        amount: Decimal::ZERO,
        gross_amount: None,
        net_amount: None,
        fees: None,
        tax_withholding: None,
        date_initiated: Utc::now().date_naive(),
        date_completed: None,
        retirement_impact: RetirementImpact::pending(),
        is_irreversible: false,
        legal_confirmations: Vec::new(),
        plan_id,
        version: 1,
    }
}

fn apply_patch(record: &mut Transaction, patch: TransactionPatch) -> StoreResult<()> {
    if let Some(required) = patch.required_status {
        if record.status != required {
            return Err(StoreError::InvalidTransition {
                id: record.id.clone(),
                from: record.status,
                to: patch.status.unwrap_or(record.status),
            });
        }
    }

    if let Some(next) = patch.status {
        if !record.status.can_transition_to(next) {
            return Err(StoreError::InvalidTransition {
                id: record.id.clone(),
                from: record.status,
                to: next,
            });
        }
    }

    if let Some(expected) = patch.expected_version {
        if expected != record.version {
            tracing::warn!(
                transaction_id = %record.id,
                expected_version = expected,
                actual_version = record.version,
                "Stale write, applying last write"
            );
        }
    }

    if let Some(amount) = patch.amount {
        record.amount = amount;
    }
    if let Some(status) = patch.status {
        record.status = status;
    }
    if let Some(impact) = patch.retirement_impact {
        record.retirement_impact = impact;
    }
    if let Some(date) = patch.date_completed {
        record.date_completed = Some(date);
    }
    if let Some(gross) = patch.gross_amount {
        record.gross_amount = Some(gross);
    }
    if let Some(net) = patch.net_amount {
        record.net_amount = Some(net);
    }
    if let Some(fees) = patch.fees {
        record.fees = Some(fees);
    }
    if let Some(withholding) = patch.tax_withholding {
        record.tax_withholding = Some(withholding);
    }
    if let Some(irreversible) = patch.is_irreversible {
        record.is_irreversible = irreversible;
    }
    if let Some(confirmations) = patch.legal_confirmations {
        record.legal_confirmations = confirmations;
    }

    record.version += 1;
    Ok(())
}

#[async_trait]
impl TransactionRepository for InMemoryTransactionStore {
    async fn create_draft(
        &self,
        transaction_type: TransactionType,
        plan_id: Option<String>,
    ) -> StoreResult<Transaction> {
        let transaction = new_draft(transaction_type, plan_id);
        self.records
            .insert(transaction.id.clone(), transaction.clone());

        tracing::info!(
            transaction_id = %transaction.id,
            transaction_type = %transaction_type,
            "Created draft transaction"
        );
        Ok(transaction)
    }

    async fn get(&self, id: &str) -> StoreResult<Transaction> {
        self.records
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn update(&self, id: &str, patch: TransactionPatch) -> StoreResult<Transaction> {
        let mut entry = self
            .records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        apply_patch(entry.value_mut(), patch)?;

        tracing::debug!(
            transaction_id = %id,
            status = %entry.status,
            version = entry.version,
            "Updated transaction"
        );
        Ok(entry.value().clone())
    }

    async fn list(&self) -> Vec<Transaction> {
        self.filtered(|_| true)
    }

    async fn list_by_status(&self, status: TransactionStatus) -> Vec<Transaction> {
        self.filtered(|t| t.status == status)
    }

    async fn list_by_type(&self, transaction_type: TransactionType) -> Vec<Transaction> {
        self.filtered(|t| t.transaction_type == transaction_type)
    }

    async fn list_by_plan(&self, plan_id: &str) -> Vec<Transaction> {
        self.filtered(|t| t.plan_id.as_deref() == Some(plan_id))
    }

    async fn cancel(&self, id: &str) -> StoreResult<Transaction> {
        let cancelled = {
            let mut entry = self
                .records
                .get_mut(id)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

            if entry.status != TransactionStatus::Draft {
                return Err(StoreError::InvalidTransition {
                    id: id.to_string(),
                    from: entry.status,
                    to: TransactionStatus::Cancelled,
                });
            }

            apply_patch(
                entry.value_mut(),
                TransactionPatch::new().status(TransactionStatus::Cancelled),
            )?;
            entry.value().clone()
        };

        self.progress.remove(id);
        tracing::info!(transaction_id = %id, "Cancelled draft transaction");
        Ok(cancelled)
    }

    async fn save_progress(&self, id: &str, progress: DraftProgress) -> StoreResult<()> {
        let entry = self
            .records
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if entry.status != TransactionStatus::Draft {
            return Err(StoreError::NotDraft {
                id: id.to_string(),
                status: entry.status,
            });
        }

        // Keep the record's read lock so a concurrent submit cannot slip in
        // between the status check and the write.
        self.progress.insert(id.to_string(), progress);
        drop(entry);
        Ok(())
    }

    async fn load_progress(&self, id: &str) -> StoreResult<Option<DraftProgress>> {
        if !self.records.contains_key(id) {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(self.progress.get(id).map(|entry| entry.value().clone()))
    }

    async fn clear_progress(&self, id: &str) {
        self.progress.remove(id);
    }
}
