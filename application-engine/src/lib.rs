//! Application engine for participant transaction requests.
//!
//! Walks a participant through the ordered steps of a loan, withdrawal,
//! distribution, rollover, transfer or rebalance request and submits it:
//!
//! - **Engine**: per-transaction working state, validation gating, submission
//! - **Service**: session map and the facade the portal's routes call
//! - **Submission**: status, fees and withholding written on submit
//! - **Audit**: bounded trail of submissions and cancellations
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use application_engine::TransactionService;
//! use plan_transactions::{InMemoryTransactionStore, TransactionType};
//!
//! let service = TransactionService::new(Arc::new(InMemoryTransactionStore::new()));
//! let started = service.create_or_attach(TransactionType::Rollover, None).await?;
//! service
//!     .submit_step_data(&started.transaction_id, serde_json::json!({ "estimatedBalance": "25000" }))
//!     .await?;
//! let outcome = service.advance(&started.transaction_id).await?;
//! ```

pub mod audit;
pub mod config;
pub mod engine;
pub mod service;
pub mod submission;
pub mod types;

// Re-export main types
pub use audit::{AuditEntry, AuditLog, AuditStats};
pub use config::EngineConfig;
pub use engine::{ApplicationEngine, EngineBuilder, EngineContext};
pub use service::TransactionService;
pub use submission::SubmissionPolicy;
pub use types::*;
