//! TransactionService - in-process facade the portal's routes call.
//!
//! Keeps one [`ApplicationEngine`] per open draft. Each session sits behind
//! an async mutex, so calls for the same transaction run one at a time while
//! different transactions proceed independently. Once a transaction leaves
//! draft its session is closed; later views of it are built on demand.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use plan_transactions::{
    StepDefinition, Transaction, TransactionRepository, TransactionStatus, TransactionType,
};

use crate::audit::{AuditEntry, AuditLog, AuditStats};
use crate::config::EngineConfig;
use crate::engine::{ApplicationEngine, EngineContext};
use crate::types::{
    AdvanceOutcome, AttachOptions, AttachOutcome, EngineError, Result, SessionExit,
    TransactionFilter, ViewState,
};

type Session = Arc<Mutex<ApplicationEngine>>;

/// Entry point for transaction applications.
pub struct TransactionService {
    /// Configuration
    config: EngineConfig,
    /// Shared collaborators handed to every engine
    context: EngineContext,
    /// Open sessions by transaction id
    sessions: DashMap<String, Session>,
    /// Audit log
    audit: Arc<AuditLog>,
}

impl TransactionService {
    /// Create a service with default configuration.
    pub fn new(store: Arc<dyn TransactionRepository>) -> Self {
        Self {
            config: EngineConfig::default(),
            context: EngineContext::new(store),
            sessions: DashMap::new(),
            audit: Arc::new(AuditLog::new()),
        }
    }

    /// Create with validated configuration.
    pub fn with_config(store: Arc<dyn TransactionRepository>, config: EngineConfig) -> Result<Self> {
        let context = EngineContext::from_config(store, &config)?;
        Ok(Self {
            audit: Arc::new(AuditLog::with_max_entries(config.audit.max_entries)),
            config,
            context,
            sessions: DashMap::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of open draft sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Start a new application or resume an existing one.
    ///
    /// Without an id a fresh draft is created and `redirect` is set so the
    /// caller can move to the draft's own route.
    pub async fn create_or_attach(
        &self,
        transaction_type: TransactionType,
        transaction_id: Option<&str>,
    ) -> Result<AttachOutcome> {
        self.create_or_attach_in_plan(transaction_type, transaction_id, None)
            .await
    }

    /// Same as [`create_or_attach`](Self::create_or_attach), tagging new
    /// drafts with the participant's plan.
    pub async fn create_or_attach_in_plan(
        &self,
        transaction_type: TransactionType,
        transaction_id: Option<&str>,
        plan_id: Option<String>,
    ) -> Result<AttachOutcome> {
        match transaction_id {
            Some(id) => {
                self.editing_session(transaction_type, id).await?;
                Ok(AttachOutcome {
                    transaction_id: id.to_string(),
                    redirect: false,
                })
            }
            None => {
                let draft = self
                    .context
                    .store
                    .create_draft(transaction_type, plan_id)
                    .await?;
                info!(
                    transaction_id = %draft.id,
                    transaction_type = %transaction_type,
                    "Created draft transaction"
                );
                Ok(AttachOutcome {
                    transaction_id: draft.id,
                    redirect: true,
                })
            }
        }
    }

    /// Create-or-attach from a route's type key.
    pub async fn create_or_attach_key(
        &self,
        type_key: &str,
        transaction_id: Option<&str>,
    ) -> Result<AttachOutcome> {
        let transaction_type: TransactionType = type_key.parse()?;
        self.create_or_attach(transaction_type, transaction_id).await
    }

    /// Open a transaction in review mode, replacing any editing session.
    pub async fn open_for_review(
        &self,
        transaction_type: TransactionType,
        transaction_id: &str,
    ) -> Result<ViewState> {
        let engine = ApplicationEngine::attach(
            self.context.clone(),
            transaction_id,
            AttachOptions::new().expect_type(transaction_type).read_only(),
        )
        .await?;
        let view = engine.view_state();
        if engine.transaction().status.is_editable() {
            self.sessions
                .insert(transaction_id.to_string(), Arc::new(Mutex::new(engine)));
        }
        Ok(view)
    }

    /// Step list for a route's type key; unknown keys get a placeholder flow.
    pub fn steps_for_key(&self, type_key: &str) -> Arc<[StepDefinition]> {
        self.context.catalog.steps_for_key(type_key)
    }

    pub async fn get_view_state(&self, transaction_id: &str) -> Result<ViewState> {
        let session = self.session(transaction_id).await?;
        let engine = session.lock().await;
        Ok(engine.view_state())
    }

    /// Merge step data posted as JSON.
    pub async fn submit_step_data(
        &self,
        transaction_id: &str,
        partial: serde_json::Value,
    ) -> Result<ViewState> {
        let session = self.session(transaction_id).await?;
        let mut engine = session.lock().await;
        engine.handle_json_change(partial)?;
        Ok(engine.view_state())
    }

    pub async fn advance(&self, transaction_id: &str) -> Result<AdvanceOutcome> {
        let session = self.session(transaction_id).await?;
        let mut engine = session.lock().await;
        let result = engine.advance().await;
        self.after_step(transaction_id, &engine, &result).await;
        result
    }

    /// Move back one step, returning the new index.
    pub async fn back(&self, transaction_id: &str) -> Result<usize> {
        let session = self.session(transaction_id).await?;
        let mut engine = session.lock().await;
        Ok(engine.back())
    }

    pub async fn submit(&self, transaction_id: &str) -> Result<AdvanceOutcome> {
        let session = self.session(transaction_id).await?;
        let mut engine = session.lock().await;
        let result = engine.submit().await;
        self.after_step(transaction_id, &engine, &result).await;
        result
    }

    /// Close the session. The draft and its saved progress stay in the store.
    pub async fn save_and_exit(&self, transaction_id: &str) -> Result<SessionExit> {
        let exit = match self.sessions.remove(transaction_id) {
            Some((_, session)) => session.lock().await.save_and_exit(),
            None => {
                let transaction = self.context.store.get(transaction_id).await?;
                SessionExit {
                    transaction_id: transaction.id,
                    status: transaction.status,
                }
            }
        };
        Ok(exit)
    }

    /// Cancel a draft.
    pub async fn cancel(&self, transaction_id: &str) -> Result<Transaction> {
        let cancelled = self.context.store.cancel(transaction_id).await?;
        self.sessions.remove(transaction_id);

        if self.config.audit.enabled {
            self.audit
                .record(AuditEntry::transition(&cancelled, TransactionStatus::Draft))
                .await;
        }
        Ok(cancelled)
    }

    /// Transactions matching every criterion of the filter.
    pub async fn list_transactions(&self, filter: &TransactionFilter) -> Vec<Transaction> {
        let candidates = match (&filter.plan_id, filter.status, filter.transaction_type) {
            (Some(plan_id), _, _) => self.context.store.list_by_plan(plan_id).await,
            (None, Some(status), _) => self.context.store.list_by_status(status).await,
            (None, None, Some(transaction_type)) => {
                self.context.store.list_by_type(transaction_type).await
            }
            (None, None, None) => self.context.store.list().await,
        };

        let mut transactions: Vec<Transaction> =
            candidates.into_iter().filter(|t| filter.matches(t)).collect();
        transactions.sort_by(|a, b| {
            b.date_initiated
                .cmp(&a.date_initiated)
                .then_with(|| a.id.cmp(&b.id))
        });
        transactions
    }

    /// Recorded lifecycle changes for a transaction, oldest first.
    pub async fn audit_trail(&self, transaction_id: &str) -> Vec<AuditEntry> {
        self.audit.for_transaction(transaction_id).await
    }

    pub async fn audit_stats(&self) -> AuditStats {
        self.audit.stats().await
    }

    /// Existing session, or a fresh one attached without a type check.
    async fn session(&self, transaction_id: &str) -> Result<Session> {
        if let Some(session) = self.sessions.get(transaction_id) {
            return Ok(session.value().clone());
        }

        let engine =
            ApplicationEngine::attach(self.context.clone(), transaction_id, AttachOptions::new())
                .await?;
        Ok(self.insert_session(transaction_id, engine))
    }

    /// Session for editing, checked against the route's type.
    async fn editing_session(
        &self,
        transaction_type: TransactionType,
        transaction_id: &str,
    ) -> Result<Session> {
        let existing = self
            .sessions
            .get(transaction_id)
            .map(|entry| entry.value().clone());

        if let Some(session) = existing {
            let engine = session.lock().await;
            let found = engine.transaction().transaction_type;
            if found != transaction_type {
                return Err(EngineError::TypeMismatch {
                    id: transaction_id.to_string(),
                    expected: transaction_type,
                    found,
                });
            }
            let reviewing = engine.read_only() && engine.transaction().status.is_editable();
            drop(engine);
            if !reviewing {
                return Ok(session);
            }
            debug!(transaction_id = %transaction_id, "Leaving review mode");
            self.sessions.remove(transaction_id);
        }

        let engine = ApplicationEngine::attach(
            self.context.clone(),
            transaction_id,
            AttachOptions::new().expect_type(transaction_type),
        )
        .await?;
        Ok(self.insert_session(transaction_id, engine))
    }

    /// Keep whichever session won a concurrent attach.
    ///
    /// Non-draft transactions get a throwaway session that is never stored.
    fn insert_session(&self, transaction_id: &str, engine: ApplicationEngine) -> Session {
        if !engine.transaction().status.is_editable() {
            return Arc::new(Mutex::new(engine));
        }
        self.sessions
            .entry(transaction_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(engine)))
            .value()
            .clone()
    }

    /// Audit a submission and close the session once the record has left draft.
    async fn after_step(
        &self,
        transaction_id: &str,
        engine: &ApplicationEngine,
        result: &Result<AdvanceOutcome>,
    ) {
        if let Ok(AdvanceOutcome::Submitted(_)) = result {
            self.record_submission(engine).await;
        }
        if !engine.transaction().status.is_editable()
            && self.sessions.remove(transaction_id).is_some()
        {
            debug!(
                transaction_id = %transaction_id,
                status = %engine.transaction().status,
                "Closed session"
            );
        }
    }

    async fn record_submission(&self, engine: &ApplicationEngine) {
        if !self.config.audit.enabled {
            return;
        }
        let transition = AuditEntry::transition(engine.transaction(), TransactionStatus::Draft);
        let entry = match transition.clone().with_payload(engine.payload()) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(
                    transaction_id = %engine.transaction().id,
                    error = %e,
                    "Could not digest submitted payload"
                );
                transition
            }
        };
        self.audit.record(entry).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plan_transactions::InMemoryTransactionStore;
    use serde_json::json;

    fn service() -> TransactionService {
        TransactionService::new(Arc::new(InMemoryTransactionStore::new()))
    }

    #[tokio::test]
    async fn test_create_without_id_redirects() {
        let service = service();
        let outcome = service
            .create_or_attach(TransactionType::Loan, None)
            .await
            .unwrap();
        assert!(outcome.redirect);

        let again = service
            .create_or_attach(TransactionType::Loan, Some(&outcome.transaction_id))
            .await
            .unwrap();
        assert!(!again.redirect);
        assert_eq!(again.transaction_id, outcome.transaction_id);
    }

    #[tokio::test]
    async fn test_create_from_unknown_key() {
        let service = service();
        let result = service.create_or_attach_key("annuity", None).await;
        assert!(matches!(result, Err(EngineError::UnknownType(_))));
        assert_eq!(service.steps_for_key("annuity").len(), 2);
    }

    #[tokio::test]
    async fn test_attach_with_wrong_route_type() {
        let service = service();
        let created = service
            .create_or_attach(TransactionType::Loan, None)
            .await
            .unwrap();

        let result = service
            .create_or_attach(TransactionType::Withdrawal, Some(&created.transaction_id))
            .await;
        assert!(matches!(result, Err(EngineError::TypeMismatch { .. })));
    }

    #[tokio::test]
    async fn test_review_session_then_edit() {
        let service = service();
        let created = service
            .create_or_attach(TransactionType::Rollover, None)
            .await
            .unwrap();
        let id = created.transaction_id;

        let view = service
            .open_for_review(TransactionType::Rollover, &id)
            .await
            .unwrap();
        assert!(view.read_only);

        service
            .submit_step_data(&id, json!({ "estimatedBalance": "500" }))
            .await
            .unwrap();
        assert!(service.get_view_state(&id).await.unwrap().payload.requested_amount().is_none());

        service
            .create_or_attach(TransactionType::Rollover, Some(&id))
            .await
            .unwrap();
        let view = service
            .submit_step_data(&id, json!({ "estimatedBalance": "500" }))
            .await
            .unwrap();
        assert!(!view.read_only);
        assert!(view.payload.requested_amount().is_some());
    }

    #[tokio::test]
    async fn test_save_and_exit_drops_session() {
        let service = service();
        let created = service
            .create_or_attach(TransactionType::Transfer, None)
            .await
            .unwrap();
        service.get_view_state(&created.transaction_id).await.unwrap();
        assert_eq!(service.session_count(), 1);

        let exit = service.save_and_exit(&created.transaction_id).await.unwrap();
        assert_eq!(exit.status, TransactionStatus::Draft);
        assert_eq!(service.session_count(), 0);
    }

    async fn submitted_transfer(service: &TransactionService) -> String {
        let created = service
            .create_or_attach(TransactionType::Transfer, None)
            .await
            .unwrap();
        let id = created.transaction_id;
        service
            .submit_step_data(
                &id,
                json!({
                    "sourceFund": "Bond Index",
                    "destinationFund": "Stable Value",
                    "amount": "1200",
                    "confirmationAccepted": true,
                }),
            )
            .await
            .unwrap();
        service.advance(&id).await.unwrap();
        service.advance(&id).await.unwrap();
        assert!(matches!(
            service.advance(&id).await.unwrap(),
            AdvanceOutcome::Submitted(_)
        ));
        id
    }

    #[tokio::test]
    async fn test_submit_closes_session() {
        let service = service();
        let id = submitted_transfer(&service).await;
        assert_eq!(service.session_count(), 0);
        assert_eq!(service.audit_trail(&id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_submitted_views_open_no_session() {
        let service = service();
        let id = submitted_transfer(&service).await;

        for _ in 0..3 {
            let view = service.get_view_state(&id).await.unwrap();
            assert!(view.read_only);
        }
        service
            .create_or_attach(TransactionType::Transfer, Some(&id))
            .await
            .unwrap();
        service
            .open_for_review(TransactionType::Transfer, &id)
            .await
            .unwrap();
        assert_eq!(service.back(&id).await.unwrap(), 0);
        assert!(matches!(
            service.submit(&id).await,
            Err(EngineError::ReadOnly(_))
        ));
        assert_eq!(service.session_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_transaction() {
        let service = service();
        assert!(matches!(
            service.get_view_state("nope").await,
            Err(EngineError::NotFound(_))
        ));
        assert!(matches!(
            service.save_and_exit("nope").await,
            Err(EngineError::NotFound(_))
        ));
    }
}
