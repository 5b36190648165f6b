//! Audit trail for lifecycle changes.
//!
//! Every submission and cancellation is recorded with a digest of the
//! payload that produced it, so support can confirm what a participant
//! submitted without the log holding account numbers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

use plan_transactions::{StepPayload, Transaction, TransactionStatus, TransactionType};

/// Maximum entries in the audit log before pruning.
const MAX_AUDIT_ENTRIES: usize = 10_000;

/// SHA-256 of the payload's JSON form, hex encoded.
pub fn payload_digest(payload: &StepPayload) -> serde_json::Result<String> {
    let bytes = serde_json::to_vec(payload)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// An entry in the audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    /// Unique entry ID
    pub entry_id: String,
    pub transaction_id: String,
    pub transaction_type: TransactionType,
    /// Status before the change
    pub from: TransactionStatus,
    /// Status after the change
    pub to: TransactionStatus,
    pub amount: Decimal,
    /// Digest of the submitted payload; none for cancellations
    pub payload_digest: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Entry for a transaction that just moved from `from`.
    pub fn transition(transaction: &Transaction, from: TransactionStatus) -> Self {
        Self {
            entry_id: uuid::Uuid::new_v4().to_string(),
            transaction_id: transaction.id.clone(),
            transaction_type: transaction.transaction_type,
            from,
            to: transaction.status,
            amount: transaction.amount,
            payload_digest: None,
            recorded_at: Utc::now(),
        }
    }

    /// Attach the digest of the payload behind this change.
    pub fn with_payload(mut self, payload: &StepPayload) -> serde_json::Result<Self> {
        self.payload_digest = Some(payload_digest(payload)?);
        Ok(self)
    }
}

/// Audit log for lifecycle changes.
pub struct AuditLog {
    /// Log entries (newest first)
    entries: Arc<RwLock<VecDeque<AuditEntry>>>,
    /// Maximum entries to retain
    max_entries: usize,
}

impl AuditLog {
    /// Create a new audit log.
    pub fn new() -> Self {
        Self::with_max_entries(MAX_AUDIT_ENTRIES)
    }

    /// Create with custom max entries.
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(VecDeque::new())),
            max_entries,
        }
    }

    /// Record an entry, returning its id.
    pub async fn record(&self, entry: AuditEntry) -> String {
        let entry_id = entry.entry_id.clone();

        let mut entries = self.entries.write().await;
        entries.push_front(entry);

        // Prune if over limit
        while entries.len() > self.max_entries {
            entries.pop_back();
        }

        entry_id
    }

    /// Get recent entries.
    pub async fn recent(&self, limit: usize) -> Vec<AuditEntry> {
        let entries = self.entries.read().await;
        entries.iter().take(limit).cloned().collect()
    }

    /// Entries for a transaction, oldest first.
    pub async fn for_transaction(&self, transaction_id: &str) -> Vec<AuditEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .rev()
            .filter(|e| e.transaction_id == transaction_id)
            .cloned()
            .collect()
    }

    /// Number of retained entries.
    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Get statistics.
    pub async fn stats(&self) -> AuditStats {
        let entries = self.entries.read().await;

        let submitted = entries
            .iter()
            .filter(|e| e.from == TransactionStatus::Draft && e.to != TransactionStatus::Cancelled)
            .count();
        let cancelled = entries
            .iter()
            .filter(|e| e.to == TransactionStatus::Cancelled)
            .count();
        let submitted_amount = entries
            .iter()
            .filter(|e| e.from == TransactionStatus::Draft && e.to != TransactionStatus::Cancelled)
            .map(|e| e.amount)
            .sum();

        AuditStats {
            total_entries: entries.len(),
            submitted,
            cancelled,
            submitted_amount,
        }
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Audit statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditStats {
    pub total_entries: usize,
    pub submitted: usize,
    pub cancelled: usize,
    /// Sum of submitted amounts
    pub submitted_amount: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use plan_transactions::RetirementImpact;

    fn transaction(id: &str, status: TransactionStatus, amount: i64) -> Transaction {
        Transaction {
            id: id.to_string(),
            transaction_type: TransactionType::Rollover,
            status,
            amount: Decimal::from(amount),
            gross_amount: None,
            net_amount: None,
            fees: None,
            tax_withholding: None,
            date_initiated: Utc::now().date_naive(),
            date_completed: None,
            retirement_impact: RetirementImpact::pending(),
            is_irreversible: false,
            legal_confirmations: vec![],
            plan_id: None,
            version: 1,
        }
    }

    #[test]
    fn test_digest_is_stable_and_content_sensitive() {
        let a = StepPayload::empty(TransactionType::Rollover);
        let b = StepPayload::from_json(
            TransactionType::Rollover,
            serde_json::json!({ "estimatedBalance": "25000" }),
        )
        .unwrap();

        let digest = payload_digest(&a).unwrap();
        assert_eq!(digest, payload_digest(&a.clone()).unwrap());
        assert_ne!(digest, payload_digest(&b).unwrap());
        assert_eq!(digest.len(), 64);
    }

    #[test]
    fn test_entry_digest_covers_payload_bytes() {
        let payload = StepPayload::from_json(
            TransactionType::Rollover,
            serde_json::json!({ "estimatedBalance": "25000" }),
        )
        .unwrap();
        let entry = AuditEntry::transition(
            &transaction("t-1", TransactionStatus::Active, 25_000),
            TransactionStatus::Draft,
        )
        .with_payload(&payload)
        .unwrap();

        let expected = hex::encode(Sha256::digest(serde_json::to_vec(&payload).unwrap()));
        let empty = hex::encode(Sha256::digest(b""));
        assert_eq!(entry.payload_digest.as_deref(), Some(expected.as_str()));
        assert_ne!(entry.payload_digest.as_deref(), Some(empty.as_str()));
    }

    #[tokio::test]
    async fn test_record_and_query() {
        let log = AuditLog::new();
        let payload = StepPayload::empty(TransactionType::Rollover);

        log.record(
            AuditEntry::transition(
                &transaction("t-1", TransactionStatus::Active, 25_000),
                TransactionStatus::Draft,
            )
            .with_payload(&payload)
            .unwrap(),
        )
        .await;
        log.record(AuditEntry::transition(
            &transaction("t-2", TransactionStatus::Cancelled, 0),
            TransactionStatus::Draft,
        ))
        .await;

        assert_eq!(log.count().await, 2);
        let trail = log.for_transaction("t-1").await;
        assert_eq!(trail.len(), 1);
        assert!(trail[0].payload_digest.is_some());

        let stats = log.stats().await;
        assert_eq!(stats.submitted, 1);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.submitted_amount, Decimal::from(25_000));
    }

    #[tokio::test]
    async fn test_prunes_oldest() {
        let log = AuditLog::with_max_entries(2);
        for i in 0..3 {
            log.record(AuditEntry::transition(
                &transaction(&format!("t-{}", i), TransactionStatus::Active, 100),
                TransactionStatus::Draft,
            ))
            .await;
        }

        assert_eq!(log.count().await, 2);
        assert!(log.for_transaction("t-0").await.is_empty());
        assert_eq!(log.recent(1).await[0].transaction_id, "t-2");
    }
}
