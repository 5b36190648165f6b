//! Retirement impact classification.
//!
//! Maps a transaction type and amount to a coarse low/medium/high level
//! and a templated sentence for the review and confirmation screens. Bands
//! are plain numeric cutoffs per type; nothing here projects real growth.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{format_currency, ImpactLevel, RetirementImpact, TransactionType};

/// Error types for impact configuration.
#[derive(Debug, thiserror::Error)]
pub enum ImpactError {
    /// Band cutoffs are out of order
    #[error("Impact bands for {transaction_type} are inverted: low_max {low_max} > medium_max {medium_max}")]
    InvertedBands {
        transaction_type: TransactionType,
        low_max: Decimal,
        medium_max: Decimal,
    },

    /// Band cutoff below zero
    #[error("Impact bands for {0} must not be negative")]
    NegativeBand(TransactionType),
}

/// Cutoffs for one transaction type.
///
/// `amount <= low_max` is low, `amount <= medium_max` is medium, anything
/// larger is high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactBands {
    pub low_max: Decimal,
    pub medium_max: Decimal,
}

impl ImpactBands {
    pub fn new(low_max: impl Into<Decimal>, medium_max: impl Into<Decimal>) -> Self {
        Self {
            low_max: low_max.into(),
            medium_max: medium_max.into(),
        }
    }

    /// Level for an amount; negative amounts count as zero.
    pub fn level(&self, amount: Decimal) -> ImpactLevel {
        let amount = amount.max(Decimal::ZERO);
        if amount <= self.low_max {
            ImpactLevel::Low
        } else if amount <= self.medium_max {
            ImpactLevel::Medium
        } else {
            ImpactLevel::High
        }
    }
}

/// Bands for every transaction type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpactBandTable {
    pub loan: ImpactBands,
    pub withdrawal: ImpactBands,
    pub distribution: ImpactBands,
    pub rollover: ImpactBands,
    pub transfer: ImpactBands,
    pub rebalance: ImpactBands,
}

impl Default for ImpactBandTable {
    fn default() -> Self {
        Self {
            loan: ImpactBands::new(5_000, 25_000),
            withdrawal: ImpactBands::new(5_000, 15_000),
            distribution: ImpactBands::new(5_000, 15_000),
            rollover: ImpactBands::new(5_000, 50_000),
            transfer: ImpactBands::new(5_000, 50_000),
            rebalance: ImpactBands::new(5_000, 50_000),
        }
    }
}

impl ImpactBandTable {
    /// Bands for a transaction type.
    pub fn for_type(&self, transaction_type: TransactionType) -> &ImpactBands {
        match transaction_type {
            TransactionType::Loan => &self.loan,
            TransactionType::Withdrawal => &self.withdrawal,
            TransactionType::Distribution => &self.distribution,
            TransactionType::Rollover => &self.rollover,
            TransactionType::Transfer => &self.transfer,
            TransactionType::Rebalance => &self.rebalance,
        }
    }

    /// Check every type's bands are non-negative and ordered.
    pub fn validate(&self) -> Result<(), ImpactError> {
        for transaction_type in TransactionType::all() {
            let bands = self.for_type(transaction_type);
            if bands.low_max < Decimal::ZERO || bands.medium_max < Decimal::ZERO {
                return Err(ImpactError::NegativeBand(transaction_type));
            }
            if bands.low_max > bands.medium_max {
                return Err(ImpactError::InvertedBands {
                    transaction_type,
                    low_max: bands.low_max,
                    medium_max: bands.medium_max,
                });
            }
        }
        Ok(())
    }
}

/// Classifies the retirement impact of a transaction.
#[derive(Debug, Clone, Default)]
pub struct ImpactClassifier {
    bands: ImpactBandTable,
}

impl ImpactClassifier {
    /// Create a classifier with default bands.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a classifier with validated custom bands.
    pub fn with_bands(bands: ImpactBandTable) -> Result<Self, ImpactError> {
        bands.validate()?;
        Ok(Self { bands })
    }

    /// Level only.
    pub fn level(&self, transaction_type: TransactionType, amount: Decimal) -> ImpactLevel {
        self.bands.for_type(transaction_type).level(amount)
    }

    /// Level plus rationale.
    pub fn classify(&self, transaction_type: TransactionType, amount: Decimal) -> RetirementImpact {
        let level = self.level(transaction_type, amount);
        RetirementImpact {
            level,
            rationale: rationale(transaction_type, level, amount.max(Decimal::ZERO)),
        }
    }
}

fn rationale(transaction_type: TransactionType, level: ImpactLevel, amount: Decimal) -> String {
    let amount = format_currency(amount);
    match (transaction_type, level) {
        (TransactionType::Loan, ImpactLevel::Low) => format!(
            "Borrowing {} is repaid through payroll and leaves most of your balance invested.",
            amount
        ),
        (TransactionType::Loan, ImpactLevel::Medium) => format!(
            "Borrowing {} takes a meaningful share of your balance out of the market until it is repaid.",
            amount
        ),
        (TransactionType::Loan, ImpactLevel::High) => format!(
            "Borrowing {} removes a large part of your balance from the market and may slow your savings growth for years.",
            amount
        ),
        (TransactionType::Withdrawal | TransactionType::Distribution, ImpactLevel::Low) => format!(
            "Taking {} permanently reduces your savings by a small amount.",
            amount
        ),
        (TransactionType::Withdrawal | TransactionType::Distribution, ImpactLevel::Medium) => format!(
            "Taking {} permanently reduces your savings and the growth it would have earned.",
            amount
        ),
        (TransactionType::Withdrawal | TransactionType::Distribution, ImpactLevel::High) => format!(
            "Taking {} permanently removes a large part of your savings and could delay your retirement.",
            amount
        ),
        (TransactionType::Rollover, ImpactLevel::Low) => format!(
            "Rolling in {} consolidates a small balance into your plan.",
            amount
        ),
        (TransactionType::Rollover, _) => format!(
            "Rolling in {} consolidates a significant balance; review the investment elections it will follow.",
            amount
        ),
        (TransactionType::Transfer | TransactionType::Rebalance, ImpactLevel::Low) => format!(
            "Moving {} between funds changes a small part of your investment mix.",
            amount
        ),
        (TransactionType::Transfer | TransactionType::Rebalance, _) => format!(
            "Moving {} between funds changes your investment risk; make sure the new mix matches your time horizon.",
            amount
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bands() {
        let classifier = ImpactClassifier::new();
        assert_eq!(
            classifier.level(TransactionType::Withdrawal, Decimal::from(5_000)),
            ImpactLevel::Low
        );
        assert_eq!(
            classifier.level(TransactionType::Withdrawal, Decimal::from(15_000)),
            ImpactLevel::Medium
        );
        assert_eq!(
            classifier.level(TransactionType::Withdrawal, Decimal::from(15_001)),
            ImpactLevel::High
        );
        assert_eq!(
            classifier.level(TransactionType::Rollover, Decimal::from(25_000)),
            ImpactLevel::Medium
        );
    }

    #[test]
    fn test_levels_are_monotonic() {
        let classifier = ImpactClassifier::new();
        let amounts: Vec<Decimal> = (0..=120).map(|i| Decimal::from(i * 500)).collect();

        for transaction_type in TransactionType::all() {
            for pair in amounts.windows(2) {
                assert!(
                    classifier.level(transaction_type, pair[0])
                        <= classifier.level(transaction_type, pair[1]),
                    "{} not monotonic between {} and {}",
                    transaction_type,
                    pair[0],
                    pair[1]
                );
            }
        }
    }

    #[test]
    fn test_negative_amount_is_low() {
        let classifier = ImpactClassifier::new();
        let impact = classifier.classify(TransactionType::Loan, Decimal::from(-10));
        assert_eq!(impact.level, ImpactLevel::Low);
        assert!(impact.rationale.contains("$0.00"));
    }

    #[test]
    fn test_rationale_mentions_amount() {
        let classifier = ImpactClassifier::new();
        let impact = classifier.classify(TransactionType::Rollover, Decimal::from(25_000));
        assert!(impact.rationale.contains("$25,000.00"));
    }

    #[test]
    fn test_inverted_bands_rejected() {
        let bands = ImpactBandTable {
            loan: ImpactBands::new(10_000, 5_000),
            ..Default::default()
        };
        assert!(matches!(
            ImpactClassifier::with_bands(bands),
            Err(ImpactError::InvertedBands {
                transaction_type: TransactionType::Loan,
                ..
            })
        ));
    }
}
