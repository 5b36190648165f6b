//! Configuration for the application engine.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use plan_transactions::{CatalogLimits, ImpactBandTable, TransactionType};

use crate::types::{EngineError, Result};

/// Configuration for the application engine and its service facade.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Plan rules enforced by step validators
    pub catalog: CatalogLimits,
    /// Retirement impact bands per transaction type
    pub impact: ImpactBandTable,
    /// What submission writes back to the transaction
    pub submission: SubmissionConfig,
    /// Audit trail settings
    pub audit: AuditConfig,
}

impl EngineConfig {
    /// Load config from YAML. Missing sections fall back to defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| EngineError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| EngineError::ConfigError(e.to_string()))
    }

    /// Reject settings that would break validation or impact monotonicity.
    pub fn validate(&self) -> Result<()> {
        self.impact
            .validate()
            .map_err(|e| EngineError::ConfigError(e.to_string()))?;

        check_percentage("catalog.withdrawal_cap_pct", self.catalog.withdrawal_cap_pct)?;
        check_percentage(
            "submission.mandatory_withholding_pct",
            self.submission.mandatory_withholding_pct,
        )?;

        if self.catalog.max_loan_amount <= Decimal::ZERO {
            return Err(EngineError::ConfigError(
                "catalog.max_loan_amount must be positive".to_string(),
            ));
        }
        if self.catalog.routing_number_len == 0 {
            return Err(EngineError::ConfigError(
                "catalog.routing_number_len must be positive".to_string(),
            ));
        }
        if self.submission.loan_processing_fee < Decimal::ZERO
            || self.submission.withdrawal_processing_fee < Decimal::ZERO
        {
            return Err(EngineError::ConfigError(
                "submission fees must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_percentage(name: &str, value: Decimal) -> Result<()> {
    if value < Decimal::ZERO || value > Decimal::from(100) {
        return Err(EngineError::ConfigError(format!(
            "{} must be between 0 and 100, got {}",
            name, value
        )));
    }
    Ok(())
}

/// Submission configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmissionConfig {
    /// Types that settle on submit and go straight to `completed`
    pub instant_types: Vec<TransactionType>,
    /// Flat loan origination fee
    pub loan_processing_fee: Decimal,
    /// Flat fee on withdrawals and distributions
    pub withdrawal_processing_fee: Decimal,
    /// Minimum federal withholding on withdrawals and distributions (percent)
    pub mandatory_withholding_pct: Decimal,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            instant_types: vec![],
            loan_processing_fee: Decimal::from(50),
            withdrawal_processing_fee: Decimal::from(25),
            mandatory_withholding_pct: Decimal::from(20),
        }
    }
}

/// Audit configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Record submissions and cancellations
    pub enabled: bool,
    /// Maximum entries to retain
    pub max_entries: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
        }
    }
}
