use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use schoolbank_core::{
    ClassId, DomainError, DomainResult, Entity, EntityKind, StudentId, SubjectId, TransactionId,
    UserId,
};

use crate::ledger::{FieldMap, double_option};

/// Label derived from the sign of the amount, never supplied separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Reward,
    Penalty,
}

impl TransactionKind {
    pub fn of(amount: i64) -> Self {
        if amount >= 0 {
            TransactionKind::Reward
        } else {
            TransactionKind::Penalty
        }
    }
}

/// One row of the append-only ledger (`schools/{s}/transactions/{id}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: TransactionId,
    pub student_id: StudentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_name: Option<String>,
    #[serde(default)]
    pub class_id: Option<ClassId>,
    pub amount: i64,
    pub reason: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub subject_id: Option<SubjectId>,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    #[serde(default)]
    pub teacher_id: Option<UserId>,
    #[serde(default)]
    pub teacher_name: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entity for Transaction {
    type Id = TransactionId;

    const COLLECTION: &'static str = "transactions";
    const KIND: EntityKind = EntityKind::Transaction;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Which slice of the log to list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TransactionFilter {
    #[default]
    All,
    Student(StudentId),
    Class(ClassId),
    Teacher(UserId),
}

impl TransactionFilter {
    pub const DEFAULT_LIMIT: usize = 50;
}

/// Edit of a log row. Metadata only, unless `amount` is set, in which case
/// the engine reconciles the balance delta in the same batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionUpdate {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub subject_id: Option<Option<SubjectId>>,
    #[serde(default)]
    pub amount: Option<i64>,
}

impl TransactionUpdate {
    pub fn is_empty(&self) -> bool {
        self.reason.is_none() && self.icon.is_none() && self.subject_id.is_none() && self.amount.is_none()
    }

    /// Fields to write for the metadata part of the edit.
    pub fn metadata_fields(&self) -> DomainResult<FieldMap> {
        let mut fields = FieldMap::new();
        if let Some(reason) = &self.reason {
            let reason = reason.trim();
            if reason.is_empty() {
                return Err(DomainError::invalid_argument("reason must not be empty"));
            }
            fields.insert("reason".into(), reason.into());
        }
        if let Some(icon) = &self.icon {
            fields.insert("icon".into(), icon.trim().into());
        }
        if let Some(subject) = &self.subject_id {
            let value = match subject {
                Some(id) => id.as_str().into(),
                None => serde_json::Value::Null,
            };
            fields.insert("subjectId".into(), value);
        }
        Ok(fields)
    }

    /// Fields to write when the amount changes to `amount`.
    pub fn amount_fields(amount: i64) -> DomainResult<FieldMap> {
        let amount = crate::ledger::validate_amount(amount)?;
        let mut fields = FieldMap::new();
        fields.insert("amount".into(), amount.into());
        fields.insert(
            "type".into(),
            serde_json::to_value(TransactionKind::of(amount))
                .map_err(|e| DomainError::internal(e.to_string()))?,
        );
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_follows_sign() {
        assert_eq!(TransactionKind::of(1), TransactionKind::Reward);
        assert_eq!(TransactionKind::of(-1), TransactionKind::Penalty);
    }

    #[test]
    fn kind_is_stored_as_type() {
        let v = serde_json::to_value(TransactionKind::Penalty).unwrap();
        assert_eq!(v, "penalty");
    }

    #[test]
    fn update_distinguishes_absent_and_null_subject() {
        let absent: TransactionUpdate = serde_json::from_str(r#"{"reason":"x"}"#).unwrap();
        assert_eq!(absent.subject_id, None);
        let cleared: TransactionUpdate = serde_json::from_str(r#"{"subjectId":null}"#).unwrap();
        assert_eq!(cleared.subject_id, Some(None));
        let fields = cleared.metadata_fields().unwrap();
        assert_eq!(fields["subjectId"], serde_json::Value::Null);
    }

    #[test]
    fn metadata_fields_never_touch_amount() {
        let update = TransactionUpdate {
            reason: Some("fixed typo".into()),
            amount: Some(10),
            ..Default::default()
        };
        let fields = update.metadata_fields().unwrap();
        assert!(fields.contains_key("reason"));
        assert!(!fields.contains_key("amount"));
        assert!(!fields.contains_key("type"));
    }

    #[test]
    fn amount_fields_rederive_type() {
        let fields = TransactionUpdate::amount_fields(-4).unwrap();
        assert_eq!(fields["amount"], -4);
        assert_eq!(fields["type"], "penalty");
        assert!(TransactionUpdate::amount_fields(0).is_err());
        assert!(TransactionUpdate::amount_fields(i64::MAX).is_err());
        assert!(TransactionUpdate::amount_fields(i64::MIN).is_err());
    }
}
