//! Ledger arithmetic: award drafts and the balance invariant.
//!
//! The transaction log is the sole source of truth; `Student::balance` is a
//! cached aggregate that must equal the sum of the student's log amounts once
//! all in-flight writes settle.

use serde::{Deserialize, Deserializer};

use schoolbank_core::{DomainError, DomainResult, SubjectId, TransactionId, UserId};

use crate::{Reward, Student, Transaction, TransactionKind};

/// Explicit set of document fields an operation is allowed to write.
pub type FieldMap = serde_json::Map<String, serde_json::Value>;

pub const DEFAULT_AWARD_ICON: &str = "⭐";
pub const DEFAULT_CLASS_AWARD_ICON: &str = "🎉";
pub const DEFAULT_REDEMPTION_ICON: &str = "🎁";

/// Largest magnitude a single award, edit or reward cost may carry.
pub const MAX_AMOUNT: i64 = 1_000_000_000;

/// Non-zero and within `±MAX_AMOUNT`.
pub(crate) fn validate_amount(amount: i64) -> DomainResult<i64> {
    if amount == 0 {
        return Err(DomainError::invalid_argument("amount must not be zero"));
    }
    if amount.unsigned_abs() > MAX_AMOUNT.unsigned_abs() {
        return Err(DomainError::invalid_argument(format!(
            "amount must be within ±{MAX_AMOUNT}"
        )));
    }
    Ok(amount)
}

/// A validated balance change, before it is bound to a student.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Award {
    pub amount: i64,
    pub reason: String,
    pub icon: String,
    pub subject_id: Option<SubjectId>,
}

impl Award {
    /// `amount` is signed: positive rewards, negative penalties.
    pub fn new(
        amount: i64,
        reason: impl Into<String>,
        icon: Option<String>,
        subject_id: Option<SubjectId>,
    ) -> DomainResult<Self> {
        let amount = validate_amount(amount)?;
        let reason = reason.into().trim().to_string();
        if reason.is_empty() {
            return Err(DomainError::invalid_argument("reason is required"));
        }
        let icon = icon
            .map(|i| i.trim().to_string())
            .filter(|i| !i.is_empty())
            .unwrap_or_else(|| DEFAULT_AWARD_ICON.to_string());
        Ok(Self {
            amount,
            reason,
            icon,
            subject_id,
        })
    }

    /// The negative award that pays for `reward`.
    pub fn redemption(reward: &Reward) -> Self {
        let icon = if reward.icon.is_empty() {
            DEFAULT_REDEMPTION_ICON.to_string()
        } else {
            reward.icon.clone()
        };
        Self {
            amount: -reward.cost,
            reason: crate::redemption_reason(&reward.name),
            icon,
            subject_id: None,
        }
    }

    pub fn kind(&self) -> TransactionKind {
        TransactionKind::of(self.amount)
    }

    /// The log row recording this award against `student`.
    ///
    /// The timestamp is left for the store to stamp at commit time.
    pub fn to_transaction(
        &self,
        id: TransactionId,
        student: &Student,
        teacher_id: &UserId,
        teacher_name: &str,
    ) -> Transaction {
        Transaction {
            id,
            student_id: student.id.clone(),
            student_name: Some(student.name.clone()),
            class_id: student.class_id.clone(),
            amount: self.amount,
            reason: self.reason.clone(),
            icon: self.icon.clone(),
            subject_id: self.subject_id.clone(),
            kind: self.kind(),
            teacher_id: Some(teacher_id.clone()),
            teacher_name: teacher_name.to_string(),
            timestamp: None,
            updated_at: None,
        }
    }
}

/// Sum of the amounts in a student's log.
pub fn balance_from_log(transactions: &[Transaction]) -> i64 {
    transactions
        .iter()
        .fold(0i64, |total, t| total.saturating_add(t.amount))
}

/// How far a cached balance has drifted from its log (0 when consistent).
///
/// Out-of-band adjustments show up here by design.
pub fn drift(cached_balance: i64, transactions: &[Transaction]) -> i64 {
    cached_balance.saturating_sub(balance_from_log(transactions))
}

/// Trimmed, non-empty value of a required text field.
pub(crate) fn required_text(value: &str, field: &str) -> DomainResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(DomainError::invalid_argument(format!("{field} is required")));
    }
    Ok(value.to_string())
}

/// Distinguishes "field absent" (`None`) from "field explicitly null"
/// (`Some(None)`) in patch bodies.
pub(crate) fn double_option<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}
