//! Participant transaction records for the retirement plan portal.
//!
//! This crate holds everything about a transaction request that does not
//! depend on an open application session:
//!
//! - **Types**: the transaction record, its lifecycle status and impact level
//! - **Payloads**: typed, mergeable step data per transaction type
//! - **Store**: the persistence boundary and its in-memory implementation
//! - **Catalog**: ordered, validated steps per transaction type
//! - **Impact**: retirement impact classification by type and amount
//!
//! # Example
//!
//! ```ignore
//! use plan_transactions::{InMemoryTransactionStore, StepCatalog, TransactionRepository, TransactionType};
//!
//! let store = InMemoryTransactionStore::new();
//! let draft = store.create_draft(TransactionType::Rollover, None).await?;
//! let steps = StepCatalog::new().steps_for(draft.transaction_type);
//! ```

pub mod catalog;
pub mod impact;
pub mod payload;
pub mod store;
pub mod types;

// Re-export main types
pub use catalog::{CatalogLimits, StepCatalog, StepDefinition, StepValidator, ValidationError};
pub use impact::{ImpactBandTable, ImpactBands, ImpactClassifier, ImpactError};
pub use payload::{PayloadError, PaymentMethod, StepPayload};
pub use store::{
    DraftProgress, InMemoryTransactionStore, StoreError, StoreResult, TransactionRepository,
};
pub use types::*;
