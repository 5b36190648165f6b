//! Core types for participant transactions.
//!
//! These types model a transaction request as the portal sees it: what kind
//! of money movement it is, where it sits in its lifecycle, and the
//! summary figures shown back to the participant after submission.
//!
//! With the `typescript` feature enabled, these types can be exported to
//! TypeScript using ts-rs for consistency with the portal front end.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Kind of financial transaction a participant can request.
///
/// The set is closed; step catalogs and impact bands are keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Loan against the vested balance, repaid through payroll
    Loan,
    /// In-service withdrawal (hardship or age-based)
    Withdrawal,
    /// Distribution after separation from service
    Distribution,
    /// Incoming rollover from another provider
    Rollover,
    /// Fund-to-fund transfer of an existing balance
    Transfer,
    /// Rebalance of the whole account to a target allocation
    Rebalance,
}

impl TransactionType {
    /// Route/storage key for this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loan => "loan",
            Self::Withdrawal => "withdrawal",
            Self::Distribution => "distribution",
            Self::Rollover => "rollover",
            Self::Transfer => "transfer",
            Self::Rebalance => "rebalance",
        }
    }

    /// All supported types in catalog order.
    pub fn all() -> [Self; 6] {
        [
            Self::Loan,
            Self::Withdrawal,
            Self::Distribution,
            Self::Rollover,
            Self::Transfer,
            Self::Rebalance,
        ]
    }

    /// Money leaves the plan for good; the UI must show a warning.
    pub fn is_irreversible(&self) -> bool {
        matches!(self, Self::Withdrawal | Self::Distribution)
    }

    /// Whether gross/net/fees/withholding figures apply to this type.
    pub fn has_breakdown(&self) -> bool {
        matches!(self, Self::Loan | Self::Withdrawal | Self::Distribution)
    }

    /// Success screen shown once a submission goes through.
    pub fn success_kind(&self) -> SuccessKind {
        match self {
            Self::Loan => SuccessKind::Loan,
            Self::Withdrawal | Self::Distribution => SuccessKind::Withdrawal,
            Self::Rollover => SuccessKind::Rollover,
            Self::Transfer | Self::Rebalance => SuccessKind::Transfer,
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A route or query carried a type key outside the supported set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown transaction type: {0}")]
pub struct UnknownTransactionType(pub String);

impl FromStr for TransactionType {
    type Err = UnknownTransactionType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        Self::all()
            .into_iter()
            .find(|t| t.as_str() == key)
            .ok_or_else(|| UnknownTransactionType(s.to_string()))
    }
}

/// Lifecycle status of a transaction.
///
/// Transitions only move forward: `Draft -> Active -> Completed`,
/// `Draft -> Completed` for instantly settled types, or `Draft -> Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Not yet submitted, fully editable
    Draft,
    /// Submitted and in flight
    Active,
    /// Settled
    Completed,
    /// Withdrawn by the participant or an administrator before submission
    Cancelled,
}

impl TransactionStatus {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Only drafts accept step data.
    pub fn is_editable(&self) -> bool {
        matches!(self, Self::Draft)
    }

    /// Check whether moving to `next` respects the forward-only lifecycle.
    ///
    /// Writing the current status again is accepted as a no-op.
    pub fn can_transition_to(&self, next: Self) -> bool {
        if *self == next {
            return true;
        }
        match self {
            Self::Draft => matches!(next, Self::Active | Self::Completed | Self::Cancelled),
            Self::Active => matches!(next, Self::Completed),
            Self::Completed | Self::Cancelled => false,
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse effect of a transaction on retirement savings.
///
/// Ordered `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum ImpactLevel {
    Low,
    Medium,
    High,
}

impl ImpactLevel {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Impact level plus the sentence shown next to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct RetirementImpact {
    pub level: ImpactLevel,
    pub rationale: String,
}

impl RetirementImpact {
    /// Placeholder attached to a fresh draft until submission recomputes it.
    pub fn pending() -> Self {
        Self {
            level: ImpactLevel::Low,
            rationale: "No amount has been entered yet, so this request does not affect your retirement savings.".to_string(),
        }
    }
}

/// Which success screen the portal shows after submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub enum SuccessKind {
    Loan,
    Withdrawal,
    Transfer,
    Rollover,
}

/// A participant transaction request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Unique identifier, immutable
    pub id: String,
    /// Kind of transaction, immutable
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    /// Lifecycle status
    pub status: TransactionStatus,
    /// Authoritative amount once submitted, zero for a draft
    #[cfg_attr(feature = "typescript", ts(type = "string"))]
    pub amount: Decimal,
    /// Amount before fees and withholding
    #[cfg_attr(feature = "typescript", ts(type = "string | null"))]
    pub gross_amount: Option<Decimal>,
    /// Amount paid out after fees and withholding
    #[cfg_attr(feature = "typescript", ts(type = "string | null"))]
    pub net_amount: Option<Decimal>,
    /// Processing fees
    #[cfg_attr(feature = "typescript", ts(type = "string | null"))]
    pub fees: Option<Decimal>,
    /// Estimated federal tax withholding
    #[cfg_attr(feature = "typescript", ts(type = "string | null"))]
    pub tax_withholding: Option<Decimal>,
    /// Creation date, immutable
    #[cfg_attr(feature = "typescript", ts(type = "string"))]
    pub date_initiated: NaiveDate,
    /// Set only when the transaction completes
    #[cfg_attr(feature = "typescript", ts(type = "string | null"))]
    pub date_completed: Option<NaiveDate>,
    /// Always present, recomputed at submission
    pub retirement_impact: RetirementImpact,
    /// Drives a mandatory warning in the UI, never blocks
    pub is_irreversible: bool,
    /// Acknowledgements collected at submission, in order
    pub legal_confirmations: Vec<String>,
    /// Owning plan, for multi-plan participants
    pub plan_id: Option<String>,
    /// Write counter, incremented by every update
    pub version: u64,
}

/// Fields a caller may change after creation.
///
/// A patch cannot express a change of `id` or `type`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionPatch {
    pub amount: Option<Decimal>,
    pub status: Option<TransactionStatus>,
    pub retirement_impact: Option<RetirementImpact>,
    pub date_completed: Option<NaiveDate>,
    pub gross_amount: Option<Decimal>,
    pub net_amount: Option<Decimal>,
    pub fees: Option<Decimal>,
    pub tax_withholding: Option<Decimal>,
    pub is_irreversible: Option<bool>,
    pub legal_confirmations: Option<Vec<String>>,
    /// Version the writer last read; a mismatch is logged as a stale write
    pub expected_version: Option<u64>,
    /// Status the record must still have for the patch to apply
    pub required_status: Option<TransactionStatus>,
}

impl TransactionPatch {
    /// Create an empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn amount(mut self, amount: Decimal) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn status(mut self, status: TransactionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn retirement_impact(mut self, impact: RetirementImpact) -> Self {
        self.retirement_impact = Some(impact);
        self
    }

    pub fn date_completed(mut self, date: NaiveDate) -> Self {
        self.date_completed = Some(date);
        self
    }

    /// Set the full monetary breakdown at once.
    pub fn breakdown(mut self, breakdown: MonetaryBreakdown) -> Self {
        self.gross_amount = Some(breakdown.gross_amount);
        self.net_amount = Some(breakdown.net_amount);
        self.fees = Some(breakdown.fees);
        self.tax_withholding = Some(breakdown.tax_withholding);
        self
    }

    pub fn irreversible(mut self, irreversible: bool) -> Self {
        self.is_irreversible = Some(irreversible);
        self
    }

    pub fn legal_confirmations(mut self, confirmations: Vec<String>) -> Self {
        self.legal_confirmations = Some(confirmations);
        self
    }

    pub fn expect_version(mut self, version: u64) -> Self {
        self.expected_version = Some(version);
        self
    }

    /// Reject the patch unless the stored status is still `status`.
    pub fn require_status(mut self, status: TransactionStatus) -> Self {
        self.required_status = Some(status);
        self
    }

    /// Check if the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        let mut changes = self.clone();
        changes.expected_version = None;
        changes.required_status = None;
        changes == Self::default()
    }
}

/// Gross-to-net figures for loan, withdrawal and distribution requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonetaryBreakdown {
    pub gross_amount: Decimal,
    pub fees: Decimal,
    pub tax_withholding: Decimal,
    pub net_amount: Decimal,
}

impl MonetaryBreakdown {
    /// Derive net from gross; net never goes below zero.
    pub fn from_gross(gross_amount: Decimal, fees: Decimal, tax_withholding: Decimal) -> Self {
        let net_amount = (gross_amount - fees - tax_withholding).max(Decimal::ZERO);
        Self {
            gross_amount,
            fees,
            tax_withholding,
            net_amount,
        }
    }
}

/// Format an amount as US dollars with thousands separators, e.g. `$25,000.00`.
pub fn format_currency(amount: Decimal) -> String {
    let rounded = amount.round_dp(2);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let text = format!("{:.2}", rounded.abs());
    let (whole, cents) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{}${}.{}", if negative { "-" } else { "" }, grouped, cents)
}
