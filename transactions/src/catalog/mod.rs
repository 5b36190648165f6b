//! Step catalogs.
//!
//! Each transaction type provides an ordered list of steps. A step may carry
//! a validator that decides, from the accumulated payload alone, whether the
//! participant may move past it. Validators are pure: they read the payload,
//! never mutate it, and depend on nothing but the limits captured when the
//! catalog was built.

pub mod distribution;
pub mod loan;
pub mod rebalance;
pub mod rollover;
pub mod transfer;
pub mod withdrawal;

pub use distribution::DistributionCatalog;
pub use loan::LoanCatalog;
pub use rebalance::RebalanceCatalog;
pub use rollover::RolloverCatalog;
pub use transfer::TransferCatalog;
pub use withdrawal::WithdrawalCatalog;

use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::payload::{PaymentInstructions, PaymentMethod, StepPayload};
use crate::types::TransactionType;

/// Why a step's data was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
    /// Offending payload field, if the failure is about a single field
    pub field: Option<String>,
    /// Human-readable reason
    pub message: String,
}

impl ValidationError {
    /// Failure not tied to a single field.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            field: None,
            message: message.into(),
        }
    }

    /// A required field is absent or blank.
    pub fn missing(field: &str) -> Self {
        Self {
            field: Some(field.to_string()),
            message: format!("{} is required", field),
        }
    }

    /// A field is present but unacceptable.
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.to_string()),
            message: message.into(),
        }
    }
}

/// Decides whether the accumulated payload satisfies a step.
///
/// Async so that validators backed by a lookup (e.g. a bank routing
/// directory) fit the same seam; the engine awaits the result before it
/// moves.
#[async_trait]
pub trait StepValidator: Send + Sync {
    async fn validate(&self, payload: &StepPayload) -> Result<(), ValidationError>;
}

/// Adapter turning a plain function into a [`StepValidator`].
pub struct FnValidator<F> {
    check: F,
}

impl<F> FnValidator<F>
where
    F: Fn(&StepPayload) -> Result<(), ValidationError> + Send + Sync,
{
    pub fn new(check: F) -> Self {
        Self { check }
    }
}

#[async_trait]
impl<F> StepValidator for FnValidator<F>
where
    F: Fn(&StepPayload) -> Result<(), ValidationError> + Send + Sync,
{
    async fn validate(&self, payload: &StepPayload) -> Result<(), ValidationError> {
        (self.check)(payload)
    }
}

/// Build a validator for one payload variant.
///
/// A payload of any other variant fails validation.
pub fn typed_validator<P, E, F>(extract: E, check: F) -> Arc<dyn StepValidator>
where
    P: 'static,
    E: Fn(&StepPayload) -> Option<&P> + Send + Sync + 'static,
    F: Fn(&P) -> Result<(), ValidationError> + Send + Sync + 'static,
{
    Arc::new(FnValidator::new(move |payload: &StepPayload| {
        match extract(payload) {
            Some(typed) => check(typed),
            None => Err(ValidationError::new(format!(
                "{} data cannot satisfy this step",
                payload.transaction_type()
            ))),
        }
    }))
}

/// One step of a transaction's application flow.
#[derive(Clone)]
pub struct StepDefinition {
    /// Stable identifier, unique within the catalog
    pub step_id: String,
    /// Display key resolved by the front end
    pub label: String,
    validator: Option<Arc<dyn StepValidator>>,
}

impl StepDefinition {
    /// Step without validation.
    pub fn new(step_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            label: label.into(),
            validator: None,
        }
    }

    /// Attach a validator.
    pub fn with_validator(mut self, validator: Arc<dyn StepValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Check if the step validates its data.
    pub fn has_validator(&self) -> bool {
        self.validator.is_some()
    }

    /// Run the step's validator against the payload.
    ///
    /// A validator that panics counts as a failed validation.
    pub async fn check(&self, payload: &StepPayload) -> Result<(), ValidationError> {
        let Some(validator) = &self.validator else {
            return Ok(());
        };

        match AssertUnwindSafe(validator.validate(payload))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(step_id = %self.step_id, "Step validator panicked");
                Err(ValidationError::new("validator failed unexpectedly"))
            }
        }
    }
}

impl fmt::Debug for StepDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDefinition")
            .field("step_id", &self.step_id)
            .field("label", &self.label)
            .field("has_validator", &self.has_validator())
            .finish()
    }
}

/// Plan rules the validators enforce.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogLimits {
    /// Largest withdrawal as a percentage of the vested balance
    pub withdrawal_cap_pct: Decimal,
    /// Largest loan principal
    pub max_loan_amount: Decimal,
    /// Shortest accepted name for a rollover's previous provider
    pub min_provider_name_len: usize,
    /// Exact length of an ABA routing number
    pub routing_number_len: usize,
    /// Shortest accepted bank account number
    pub min_account_number_len: usize,
}

impl Default for CatalogLimits {
    fn default() -> Self {
        Self {
            withdrawal_cap_pct: Decimal::from(25),
            max_loan_amount: Decimal::from(50_000),
            min_provider_name_len: 2,
            routing_number_len: 9,
            min_account_number_len: 4,
        }
    }
}

impl CatalogLimits {
    /// Largest withdrawal allowed against a vested balance.
    pub fn withdrawal_cap(&self, vested_balance: Decimal) -> Decimal {
        let hundred = Decimal::from(100);
        vested_balance
            .checked_mul(self.withdrawal_cap_pct)
            .map(|scaled| scaled / hundred)
            .unwrap_or_else(|| vested_balance / hundred * self.withdrawal_cap_pct)
    }
}

/// Trait for per-type step list construction.
pub trait CatalogProvider: Send + Sync {
    /// Transaction type this provider builds steps for
    fn transaction_type(&self) -> TransactionType;

    /// Ordered steps; must not be empty
    fn steps(&self, limits: &CatalogLimits) -> Vec<StepDefinition>;
}

/// Labels used when a type key is not recognised.
const PLACEHOLDER_STEPS: [(&str, &str); 2] = [
    ("details", "transactions.steps.details"),
    ("review", "transactions.steps.review"),
];

/// Step lists for every transaction type, built once and shared.
pub struct StepCatalog {
    steps: HashMap<TransactionType, Arc<[StepDefinition]>>,
    placeholder: Arc<[StepDefinition]>,
}

impl StepCatalog {
    /// Build the catalog with default plan limits.
    pub fn new() -> Self {
        Self::with_limits(CatalogLimits::default())
    }

    /// Build the catalog with custom plan limits.
    pub fn with_limits(limits: CatalogLimits) -> Self {
        let providers: Vec<Box<dyn CatalogProvider>> = vec![
            Box::new(LoanCatalog),
            Box::new(WithdrawalCatalog),
            Box::new(DistributionCatalog),
            Box::new(RolloverCatalog),
            Box::new(TransferCatalog),
            Box::new(RebalanceCatalog),
        ];

        let steps = providers
            .iter()
            .map(|provider| {
                let steps: Arc<[StepDefinition]> = provider.steps(&limits).into();
                (provider.transaction_type(), steps)
            })
            .collect();

        let placeholder: Arc<[StepDefinition]> = PLACEHOLDER_STEPS
            .iter()
            .map(|(id, label)| StepDefinition::new(*id, *label))
            .collect::<Vec<_>>()
            .into();

        Self {
            steps,
            placeholder,
        }
    }

    /// Steps for a supported transaction type.
    pub fn steps_for(&self, transaction_type: TransactionType) -> Arc<[StepDefinition]> {
        self.steps
            .get(&transaction_type)
            .cloned()
            .unwrap_or_else(|| self.placeholder.clone())
    }

    /// Steps for an external type key.
    ///
    /// Unknown keys get a generic placeholder flow without validation so the
    /// caller can still render something.
    pub fn steps_for_key(&self, key: &str) -> Arc<[StepDefinition]> {
        match key.parse::<TransactionType>() {
            Ok(transaction_type) => self.steps_for(transaction_type),
            Err(_) => {
                tracing::warn!(key = %key, "No step catalog for transaction type, using placeholder");
                self.placeholder.clone()
            }
        }
    }

    /// Replace the flow for one transaction type.
    ///
    /// Plans with extra steps (or tests needing custom validators) swap in
    /// their own list; other types keep the built-in flows.
    pub fn with_flow(
        mut self,
        transaction_type: TransactionType,
        steps: Vec<StepDefinition>,
    ) -> Self {
        self.steps.insert(transaction_type, steps.into());
        self
    }
}

impl Default for StepCatalog {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn require_text(value: &Option<String>, field: &str) -> Result<(), ValidationError> {
    match value.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => Ok(()),
        _ => Err(ValidationError::missing(field)),
    }
}

pub(crate) fn require_true(value: Option<bool>, field: &str) -> Result<(), ValidationError> {
    if value == Some(true) {
        Ok(())
    } else {
        Err(ValidationError::invalid(field, format!("{} must be accepted", field)))
    }
}

pub(crate) fn require_positive(value: Option<Decimal>, field: &str) -> Result<Decimal, ValidationError> {
    match value {
        Some(amount) if amount > Decimal::ZERO => Ok(amount),
        Some(_) => Err(ValidationError::invalid(field, format!("{} must be greater than zero", field))),
        None => Err(ValidationError::missing(field)),
    }
}

/// Disbursement rules shared by loans, withdrawals and distributions.
pub(crate) fn validate_payment(
    payment: &PaymentInstructions,
    limits: &CatalogLimits,
) -> Result<(), ValidationError> {
    let all_digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());

    match payment.payment_method {
        Some(PaymentMethod::Eft) => {
            let routing = payment.routing_number.as_deref().map(str::trim).unwrap_or("");
            if !(all_digits(routing) && routing.len() == limits.routing_number_len) {
                return Err(ValidationError::invalid(
                    "routingNumber",
                    format!("routingNumber must be {} digits", limits.routing_number_len),
                ));
            }
            let account = payment.account_number.as_deref().map(str::trim).unwrap_or("");
            if !(all_digits(account) && account.len() >= limits.min_account_number_len) {
                return Err(ValidationError::invalid(
                    "accountNumber",
                    format!(
                        "accountNumber must be at least {} digits",
                        limits.min_account_number_len
                    ),
                ));
            }
            Ok(())
        }
        Some(PaymentMethod::Check) => require_text(&payment.mailing_address, "mailingAddress"),
        None => Err(ValidationError::missing("paymentMethod")),
    }
}
