//! ApplicationEngine - one participant's pass through a transaction's steps.
//!
//! An engine is attached to a single transaction. It holds the working
//! state (current step, accumulated payload, last validation message) and
//! talks to the shared store for everything that must outlive the session.
//!
//! # Lifecycle
//!
//! ```text
//! attach ──► step 0 ──► … ──► step N-1 ──► submit ──► read-only
//!              ▲  │ back          │ advance (validated)
//!              └──┘               ▼
//!                           save progress
//! ```

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use plan_transactions::{
    DraftProgress, ImpactClassifier, InMemoryTransactionStore, StepCatalog, StepDefinition,
    StepPayload, StoreError, Transaction, TransactionRepository, TransactionStatus,
};

use crate::config::EngineConfig;
use crate::submission::SubmissionPolicy;
use crate::types::{
    AdvanceOutcome, AttachOptions, EngineError, Result, SessionExit, StepSummary,
    SubmitReceipt, ViewState, CONFIRM_TERMS_MESSAGE, INCOMPLETE_STEP_MESSAGE,
};

/// Shared collaborators every engine needs.
///
/// Cheap to clone; build once per process.
#[derive(Clone)]
pub struct EngineContext {
    pub store: Arc<dyn TransactionRepository>,
    pub catalog: Arc<StepCatalog>,
    pub classifier: Arc<ImpactClassifier>,
    pub submission: Arc<SubmissionPolicy>,
}

impl EngineContext {
    /// Context with default catalog, bands and submission rules.
    pub fn new(store: Arc<dyn TransactionRepository>) -> Self {
        Self {
            store,
            catalog: Arc::new(StepCatalog::new()),
            classifier: Arc::new(ImpactClassifier::new()),
            submission: Arc::new(SubmissionPolicy::default()),
        }
    }

    /// Context built from validated configuration.
    pub fn from_config(store: Arc<dyn TransactionRepository>, config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let classifier = ImpactClassifier::with_bands(config.impact.clone())
            .map_err(|e| EngineError::ConfigError(e.to_string()))?;

        Ok(Self {
            store,
            catalog: Arc::new(StepCatalog::with_limits(config.catalog.clone())),
            classifier: Arc::new(classifier),
            submission: Arc::new(SubmissionPolicy::new(config.submission.clone())),
        })
    }
}

/// Drives one transaction through its application steps.
///
/// Not internally synchronized: callers serialize calls per session.
pub struct ApplicationEngine {
    context: EngineContext,
    transaction: Transaction,
    steps: Arc<[StepDefinition]>,
    current_step_index: usize,
    payload: StepPayload,
    validation_error: Option<String>,
    force_read_only: bool,
}

impl ApplicationEngine {
    /// Attach to an existing transaction.
    ///
    /// Restores saved progress for drafts opened for editing.
    pub async fn attach(
        context: EngineContext,
        transaction_id: &str,
        options: AttachOptions,
    ) -> Result<Self> {
        let transaction = context.store.get(transaction_id).await?;

        if let Some(expected) = options.expected_type {
            if expected != transaction.transaction_type {
                return Err(EngineError::TypeMismatch {
                    id: transaction.id,
                    expected,
                    found: transaction.transaction_type,
                });
            }
        }

        let steps = context.catalog.steps_for(transaction.transaction_type);
        let mut engine = Self {
            payload: StepPayload::empty(transaction.transaction_type),
            context,
            transaction,
            steps,
            current_step_index: 0,
            validation_error: None,
            force_read_only: options.force_read_only,
        };

        if !engine.read_only() {
            engine.restore_progress().await?;
        }

        debug!(
            transaction_id = %engine.transaction.id,
            transaction_type = %engine.transaction.transaction_type,
            step = engine.current_step_index,
            read_only = engine.read_only(),
            "Attached application engine"
        );
        Ok(engine)
    }

    async fn restore_progress(&mut self) -> Result<()> {
        let Some(progress) = self.context.store.load_progress(&self.transaction.id).await? else {
            return Ok(());
        };

        if progress.payload.transaction_type() != self.transaction.transaction_type {
            warn!(
                transaction_id = %self.transaction.id,
                saved_type = %progress.payload.transaction_type(),
                "Discarding saved progress for a different transaction type"
            );
            return Ok(());
        }

        self.current_step_index = progress.step_index.min(self.last_step_index());
        self.payload = progress.payload;
        debug!(
            transaction_id = %self.transaction.id,
            step = self.current_step_index,
            "Restored draft progress"
        );
        Ok(())
    }

    /// Transaction as last read or written by this engine.
    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    /// Data accumulated so far.
    pub fn payload(&self) -> &StepPayload {
        &self.payload
    }

    pub fn current_step_index(&self) -> usize {
        self.current_step_index
    }

    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn validation_error(&self) -> Option<&str> {
        self.validation_error.as_deref()
    }

    /// Submitted transactions and review sessions cannot be edited.
    pub fn read_only(&self) -> bool {
        self.force_read_only || !self.transaction.status.is_editable()
    }

    fn last_step_index(&self) -> usize {
        self.steps.len().saturating_sub(1)
    }

    fn is_final_step(&self) -> bool {
        self.current_step_index >= self.last_step_index()
    }

    /// Merge a partial update into the accumulated data.
    ///
    /// Ignored when read-only. An update for another transaction type is an
    /// error and leaves the data unchanged.
    pub fn handle_data_change(&mut self, partial: StepPayload) -> Result<()> {
        if self.read_only() {
            warn!(
                transaction_id = %self.transaction.id,
                status = %self.transaction.status,
                "Ignoring data change on read-only transaction"
            );
            return Ok(());
        }

        self.payload
            .merge(partial)
            .map_err(|e| EngineError::from_payload(&self.transaction.id, e))?;
        debug!(transaction_id = %self.transaction.id, step = self.current_step_index, "Merged step data");
        Ok(())
    }

    /// Decode a JSON partial posted by the UI and merge it.
    pub fn handle_json_change(&mut self, partial: serde_json::Value) -> Result<()> {
        if self.read_only() {
            warn!(
                transaction_id = %self.transaction.id,
                status = %self.transaction.status,
                "Ignoring data change on read-only transaction"
            );
            return Ok(());
        }

        let decoded = StepPayload::from_json(self.transaction.transaction_type, partial)
            .map_err(|e| EngineError::from_payload(&self.transaction.id, e))?;
        self.handle_data_change(decoded)
    }

    /// Move forward one step, submitting when on the last one.
    pub async fn advance(&mut self) -> Result<AdvanceOutcome> {
        if self.read_only() {
            if self.is_final_step() {
                return Ok(AdvanceOutcome::Unchanged);
            }
            self.current_step_index += 1;
            debug!(transaction_id = %self.transaction.id, step = self.current_step_index, "Review navigation");
            return Ok(AdvanceOutcome::Advanced {
                step_index: self.current_step_index,
            });
        }

        if let Some(message) = self.validate_current_step().await {
            return Ok(AdvanceOutcome::Blocked { message });
        }

        if self.is_final_step() {
            let receipt = self.submit_validated().await?;
            return Ok(AdvanceOutcome::Submitted(receipt));
        }

        let next = self.current_step_index + 1;
        let saved = self
            .context
            .store
            .save_progress(&self.transaction.id, DraftProgress::new(next, self.payload.clone()))
            .await;
        match saved {
            Ok(()) => {}
            Err(StoreError::NotDraft { id, status }) => return Err(self.left_draft(id, status).await),
            Err(err) => return Err(err.into()),
        }
        self.current_step_index = next;

        debug!(transaction_id = %self.transaction.id, step = next, "Advanced to next step");
        Ok(AdvanceOutcome::Advanced { step_index: next })
    }

    /// Move back one step. Never goes below the first step.
    pub fn back(&mut self) -> usize {
        self.current_step_index = self.current_step_index.saturating_sub(1);
        self.validation_error = None;
        debug!(transaction_id = %self.transaction.id, step = self.current_step_index, "Moved back");
        self.current_step_index
    }

    /// Submit from the final step.
    ///
    /// Validation failure is reported as [`AdvanceOutcome::Blocked`], not as
    /// an error.
    pub async fn submit(&mut self) -> Result<AdvanceOutcome> {
        if self.read_only() {
            return Err(EngineError::ReadOnly(self.transaction.id.clone()));
        }
        if !self.is_final_step() {
            return Err(EngineError::NotOnFinalStep {
                current: self.current_step_index,
                total: self.steps.len(),
            });
        }

        if let Some(message) = self.validate_current_step().await {
            return Ok(AdvanceOutcome::Blocked { message });
        }
        let receipt = self.submit_validated().await?;
        Ok(AdvanceOutcome::Submitted(receipt))
    }

    /// Leave the flow. Saved progress is untouched.
    pub fn save_and_exit(&self) -> SessionExit {
        info!(
            transaction_id = %self.transaction.id,
            step = self.current_step_index,
            "Participant left application"
        );
        SessionExit {
            transaction_id: self.transaction.id.clone(),
            status: self.transaction.status,
        }
    }

    /// Snapshot for rendering.
    pub fn view_state(&self) -> ViewState {
        let steps: Vec<StepSummary> = self
            .steps
            .iter()
            .map(|step| StepSummary {
                step_id: step.step_id.clone(),
                label: step.label.clone(),
            })
            .collect();
        let current_step = steps
            .get(self.current_step_index)
            .cloned()
            .unwrap_or_else(|| StepSummary {
                step_id: String::new(),
                label: String::new(),
            });

        ViewState {
            transaction: self.transaction.clone(),
            total_steps: steps.len(),
            current_step,
            steps,
            current_step_index: self.current_step_index,
            is_final_step: self.is_final_step(),
            read_only: self.read_only(),
            validation_error: self.validation_error.clone(),
            payload: self.payload.clone(),
        }
    }

    /// Run the current step's validator, recording the message on failure.
    async fn validate_current_step(&mut self) -> Option<String> {
        let result = match self.steps.get(self.current_step_index) {
            Some(step) => step.check(&self.payload).await,
            None => Ok(()),
        };

        match result {
            Ok(()) => {
                self.validation_error = None;
                None
            }
            Err(err) => {
                debug!(
                    transaction_id = %self.transaction.id,
                    step = self.current_step_index,
                    error = %err,
                    "Step validation failed"
                );
                let message = if self.is_final_step() {
                    CONFIRM_TERMS_MESSAGE
                } else {
                    INCOMPLETE_STEP_MESSAGE
                };
                self.validation_error = Some(message.to_string());
                Some(message.to_string())
            }
        }
    }

    async fn submit_validated(&mut self) -> Result<SubmitReceipt> {
        let transaction_type = self.transaction.transaction_type;
        let amount = self
            .payload
            .requested_amount()
            .unwrap_or(self.transaction.amount)
            .max(Decimal::ZERO);
        let impact = self.context.classifier.classify(transaction_type, amount);
        let patch = self.context.submission.build_patch(
            &self.transaction,
            &self.payload,
            amount,
            impact,
            Utc::now().date_naive(),
        )?;

        let written = self.context.store.update(&self.transaction.id, patch).await;
        let updated = match written {
            Ok(updated) => updated,
            Err(StoreError::InvalidTransition { id, from, .. }) => {
                return Err(self.left_draft(id, from).await)
            }
            Err(err) => return Err(err.into()),
        };
        self.context.store.clear_progress(&updated.id).await;
        self.transaction = updated;

        info!(
            transaction_id = %self.transaction.id,
            transaction_type = %transaction_type,
            status = %self.transaction.status,
            amount = %self.transaction.amount,
            impact = ?self.transaction.retirement_impact.level,
            "Submitted transaction"
        );

        Ok(SubmitReceipt {
            transaction_id: self.transaction.id.clone(),
            success_kind: transaction_type.success_kind(),
            amount: self.transaction.amount,
            status: self.transaction.status,
        })
    }

    /// Another session moved the record out of draft. Reload it so this
    /// engine turns read-only.
    async fn left_draft(&mut self, id: String, status: TransactionStatus) -> EngineError {
        warn!(transaction_id = %id, status = %status, "Transaction left draft in another session");
        match self.context.store.get(&id).await {
            Ok(current) => {
                self.transaction = current;
                EngineError::ReadOnly(id)
            }
            Err(err) => err.into(),
        }
    }
}

/// Builder for [`EngineContext`].
pub struct EngineBuilder {
    config: EngineConfig,
    store: Option<Arc<dyn TransactionRepository>>,
}

impl EngineBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            store: None,
        }
    }

    /// Use a shared store.
    pub fn with_store(mut self, store: Arc<dyn TransactionRepository>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replace the whole configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the withdrawal cap as a percentage of vested balance.
    pub fn withdrawal_cap_pct(mut self, pct: Decimal) -> Self {
        self.config.catalog.withdrawal_cap_pct = pct;
        self
    }

    /// Mark a type as settling on submit.
    pub fn instant(mut self, transaction_type: plan_transactions::TransactionType) -> Self {
        if !self.config.submission.instant_types.contains(&transaction_type) {
            self.config.submission.instant_types.push(transaction_type);
        }
        self
    }

    /// Enable/disable audit.
    pub fn audit_enabled(mut self, enabled: bool) -> Self {
        self.config.audit.enabled = enabled;
        self
    }

    /// Configuration collected so far.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Build the context. Falls back to an in-memory store.
    pub fn build(self) -> Result<EngineContext> {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryTransactionStore::new()));
        EngineContext::from_config(store, &self.config)
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use plan_transactions::{StepValidator, SuccessKind, TransactionType, ValidationError};
    use serde_json::json;

    async fn setup(transaction_type: TransactionType) -> (EngineContext, String) {
        let context = EngineContext::new(Arc::new(InMemoryTransactionStore::new()));
        let draft = context
            .store
            .create_draft(transaction_type, None)
            .await
            .unwrap();
        (context, draft.id)
    }

    async fn attach(context: &EngineContext, id: &str) -> ApplicationEngine {
        ApplicationEngine::attach(context.clone(), id, AttachOptions::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_attach_missing_id() {
        let context = EngineContext::new(Arc::new(InMemoryTransactionStore::new()));
        let result = ApplicationEngine::attach(context, "missing", AttachOptions::new()).await;
        assert!(matches!(result, Err(EngineError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_attach_wrong_type() {
        let (context, id) = setup(TransactionType::Loan).await;
        let result = ApplicationEngine::attach(
            context,
            &id,
            AttachOptions::new().expect_type(TransactionType::Rollover),
        )
        .await;
        assert!(matches!(
            result,
            Err(EngineError::TypeMismatch {
                expected: TransactionType::Rollover,
                found: TransactionType::Loan,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_failed_validation_keeps_step() {
        let (context, id) = setup(TransactionType::Rollover).await;
        let mut engine = attach(&context, &id).await;

        let outcome = engine.advance().await.unwrap();
        assert!(outcome.is_blocked());
        assert_eq!(engine.current_step_index(), 0);
        assert_eq!(engine.validation_error(), Some(INCOMPLETE_STEP_MESSAGE));
    }

    #[tokio::test]
    async fn test_final_step_message() {
        let (context, id) = setup(TransactionType::Rollover).await;
        let mut engine = attach(&context, &id).await;

        engine
            .handle_json_change(json!({ "estimatedBalance": "1000", "providerName": "Acme" }))
            .unwrap();
        engine.advance().await.unwrap();
        engine.advance().await.unwrap();

        let outcome = engine.advance().await.unwrap();
        assert_eq!(
            outcome,
            AdvanceOutcome::Blocked {
                message: CONFIRM_TERMS_MESSAGE.to_string()
            }
        );
        assert_eq!(engine.current_step_index(), 2);
    }

    #[tokio::test]
    async fn test_back_floors_at_zero_and_clears_error() {
        let (context, id) = setup(TransactionType::Rollover).await;
        let mut engine = attach(&context, &id).await;

        engine.advance().await.unwrap();
        assert!(engine.validation_error().is_some());

        assert_eq!(engine.back(), 0);
        assert!(engine.validation_error().is_none());
    }

    #[tokio::test]
    async fn test_data_for_other_type_rejected() {
        let (context, id) = setup(TransactionType::Loan).await;
        let mut engine = attach(&context, &id).await;

        let result = engine.handle_data_change(StepPayload::empty(TransactionType::Transfer));
        assert!(matches!(result, Err(EngineError::TypeMismatch { .. })));
    }

    #[tokio::test]
    async fn test_invalid_json_rejected() {
        let (context, id) = setup(TransactionType::Rollover).await;
        let mut engine = attach(&context, &id).await;

        let result = engine.handle_json_change(json!({ "estimatedBalance": [1, 2] }));
        assert!(matches!(result, Err(EngineError::InvalidPayload(_))));
    }

    #[tokio::test]
    async fn test_explicit_submit_out_of_position() {
        let (context, id) = setup(TransactionType::Rollover).await;
        let mut engine = attach(&context, &id).await;

        assert!(matches!(
            engine.submit().await,
            Err(EngineError::NotOnFinalStep { current: 0, total: 3 })
        ));
    }

    #[tokio::test]
    async fn test_submit_completes_instant_types() {
        let store: Arc<dyn TransactionRepository> = Arc::new(InMemoryTransactionStore::new());
        let context = EngineBuilder::new()
            .with_store(store.clone())
            .instant(TransactionType::Transfer)
            .build()
            .unwrap();
        let draft = store.create_draft(TransactionType::Transfer, None).await.unwrap();
        let mut engine = attach(&context, &draft.id).await;

        engine
            .handle_json_change(json!({
                "sourceFund": "Bond Index",
                "destinationFund": "Stable Value",
                "amount": "1200",
                "confirmationAccepted": true,
            }))
            .unwrap();
        engine.advance().await.unwrap();
        engine.advance().await.unwrap();
        let outcome = engine.advance().await.unwrap();

        let receipt = outcome.receipt().unwrap();
        assert_eq!(receipt.success_kind, SuccessKind::Transfer);
        assert_eq!(receipt.status, TransactionStatus::Completed);
        assert!(engine.transaction().date_completed.is_some());
        assert!(engine.read_only());
    }

    #[tokio::test]
    async fn test_review_mode_navigates_without_saving() {
        let (context, id) = setup(TransactionType::Rollover).await;
        let mut engine =
            ApplicationEngine::attach(context.clone(), &id, AttachOptions::new().read_only())
                .await
                .unwrap();

        assert!(engine.read_only());
        engine.advance().await.unwrap();
        engine.advance().await.unwrap();
        assert_eq!(engine.advance().await.unwrap(), AdvanceOutcome::Unchanged);
        assert_eq!(engine.current_step_index(), 2);
        assert!(context.store.load_progress(&id).await.unwrap().is_none());
        assert!(matches!(engine.submit().await, Err(EngineError::ReadOnly(_))));
    }

    async fn walk_rollover(engine: &mut ApplicationEngine, balance: &str) -> Result<AdvanceOutcome> {
        engine.handle_json_change(json!({
            "estimatedBalance": balance,
            "providerName": "Acme",
            "confirmationAccepted": true,
        }))?;
        engine.advance().await?;
        engine.advance().await?;
        engine.advance().await
    }

    #[tokio::test]
    async fn test_stale_engine_cannot_resubmit() {
        let (context, id) = setup(TransactionType::Rollover).await;
        let mut first = attach(&context, &id).await;
        let mut second = attach(&context, &id).await;

        // Both sessions reach the review step before either submits.
        for (engine, balance) in [(&mut first, "1000"), (&mut second, "90000")] {
            engine
                .handle_json_change(json!({
                    "estimatedBalance": balance,
                    "providerName": "Acme",
                    "confirmationAccepted": true,
                }))
                .unwrap();
            engine.advance().await.unwrap();
            engine.advance().await.unwrap();
        }

        let outcome = first.advance().await.unwrap();
        assert!(outcome.receipt().is_some());

        let result = second.advance().await;
        assert!(matches!(result, Err(EngineError::ReadOnly(ref rejected)) if *rejected == id));
        assert!(second.read_only());
        assert_eq!(second.transaction().status, TransactionStatus::Active);

        let stored = context.store.get(&id).await.unwrap();
        assert_eq!(stored.amount, Decimal::from(1000));
        assert_eq!(stored.status, TransactionStatus::Active);
    }

    #[tokio::test]
    async fn test_stale_engine_cannot_save_progress() {
        let (context, id) = setup(TransactionType::Rollover).await;
        let mut first = attach(&context, &id).await;
        let mut second = attach(&context, &id).await;

        walk_rollover(&mut first, "1000").await.unwrap();

        let result = walk_rollover(&mut second, "90000").await;
        assert!(matches!(result, Err(EngineError::ReadOnly(_))));
        assert!(second.read_only());
        assert_eq!(second.current_step_index(), 0);
        assert_eq!(
            context.store.get(&id).await.unwrap().amount,
            Decimal::from(1000)
        );
    }

    #[tokio::test]
    async fn test_unrepresentable_withholding_leaves_draft() {
        let (context, id) = setup(TransactionType::Distribution).await;
        let mut engine = attach(&context, &id).await;

        engine
            .handle_json_change(json!({
                "distributionOption": "lump_sum",
                "amount": "79228162514264337593543950335",
                "paymentMethod": "CHECK",
                "mailingAddress": "1 Main St",
                "acknowledgedIrreversible": true,
                "confirmationAccepted": true,
            }))
            .unwrap();
        for _ in 0..3 {
            assert!(matches!(engine.advance().await.unwrap(), AdvanceOutcome::Advanced { .. }));
        }

        let result = engine.advance().await;
        assert!(matches!(result, Err(EngineError::AmountOutOfRange(amount)) if amount == Decimal::MAX));
        assert!(!engine.read_only());

        let stored = context.store.get(&id).await.unwrap();
        assert_eq!(stored.status, TransactionStatus::Draft);
        assert_eq!(stored.amount, Decimal::ZERO);
    }

    /// Looks the balance up somewhere slow before deciding.
    struct DeferredBalanceCheck;

    #[async_trait]
    impl StepValidator for DeferredBalanceCheck {
        async fn validate(&self, payload: &StepPayload) -> std::result::Result<(), ValidationError> {
            tokio::task::yield_now().await;
            match payload.requested_amount() {
                Some(amount) if amount > Decimal::ZERO => Ok(()),
                _ => Err(ValidationError::missing("estimatedBalance")),
            }
        }
    }

    #[tokio::test]
    async fn test_suspending_validator_gates_advance() {
        let catalog = StepCatalog::new().with_flow(
            TransactionType::Rollover,
            vec![
                StepDefinition::new("balance", "balance").with_validator(Arc::new(DeferredBalanceCheck)),
                StepDefinition::new("review", "review"),
            ],
        );
        let context = EngineContext {
            catalog: Arc::new(catalog),
            ..EngineContext::new(Arc::new(InMemoryTransactionStore::new()))
        };
        let draft = context
            .store
            .create_draft(TransactionType::Rollover, None)
            .await
            .unwrap();
        let mut engine = attach(&context, &draft.id).await;
        assert_eq!(engine.view_state().steps.len(), 2);

        let outcome = engine.advance().await.unwrap();
        assert!(outcome.is_blocked());
        assert_eq!(engine.current_step_index(), 0);
        assert!(context.store.load_progress(&draft.id).await.unwrap().is_none());

        engine
            .handle_json_change(json!({ "estimatedBalance": "5000" }))
            .unwrap();
        assert_eq!(
            engine.advance().await.unwrap(),
            AdvanceOutcome::Advanced { step_index: 1 }
        );
        assert_eq!(engine.current_step_index(), 1);
    }

    #[test]
    fn test_builder_rejects_bad_config() {
        let result = EngineBuilder::new()
            .withdrawal_cap_pct(Decimal::from(101))
            .build();
        assert!(matches!(result, Err(EngineError::ConfigError(_))));
    }
}
