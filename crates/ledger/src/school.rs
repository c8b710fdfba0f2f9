use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use schoolbank_core::{DomainError, DomainResult, Entity, EntityKind, SchoolId};

use crate::{Class, QuickReward, Reward, RewardRequest, Student, Subject, Transaction};

/// Sub-collections owned by a school document, cascade-deleted with it.
pub const TENANT_COLLECTIONS: [&str; 7] = [
    Student::COLLECTION,
    Class::COLLECTION,
    Reward::COLLECTION,
    QuickReward::COLLECTION,
    Subject::COLLECTION,
    RewardRequest::COLLECTION,
    Transaction::COLLECTION,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolConfig {
    pub name: String,
    #[serde(default = "default_currency_symbol")]
    pub currency_symbol: String,
    #[serde(default = "default_currency_name")]
    pub currency_name: String,
    /// How far below zero an approved redemption may take a balance.
    /// Unset means redemptions are never refused for lack of funds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_debt: Option<i64>,
    #[serde(default = "default_show_leaderboard")]
    pub show_leaderboard: bool,
}

fn default_currency_symbol() -> String {
    "$".to_string()
}

fn default_currency_name() -> String {
    "Dollari".to_string()
}

fn default_show_leaderboard() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SchoolStatus {
    #[default]
    Active,
    /// Being torn down; nobody may be scoped into it any more.
    Quarantined,
}

/// Tenant root document (`schools/{id}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct School {
    pub id: SchoolId,
    pub config: SchoolConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: SchoolStatus,
}

impl School {
    pub fn is_quarantined(&self) -> bool {
        self.status == SchoolStatus::Quarantined
    }
}

impl Entity for School {
    type Id = SchoolId;

    const COLLECTION: &'static str = "schools";
    const KIND: EntityKind = EntityKind::School;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Input for creating a school; unset settings take the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSchool {
    pub name: String,
    pub currency_symbol: Option<String>,
    pub currency_name: Option<String>,
    pub max_debt: Option<i64>,
    pub show_leaderboard: Option<bool>,
}

impl NewSchool {
    pub fn into_school(self, id: SchoolId) -> DomainResult<School> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(DomainError::invalid_argument("school name is required"));
        }
        if self.max_debt.is_some_and(|debt| debt < 0) {
            return Err(DomainError::invalid_argument("maxDebt must not be negative"));
        }
        Ok(School {
            id,
            config: SchoolConfig {
                name,
                currency_symbol: self.currency_symbol.unwrap_or_else(default_currency_symbol),
                currency_name: self.currency_name.unwrap_or_else(default_currency_name),
                max_debt: self.max_debt,
                show_leaderboard: self.show_leaderboard.unwrap_or(true),
            },
            created_at: None,
            status: SchoolStatus::Active,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_school_takes_defaults() {
        let school = NewSchool {
            name: "  Scuola Verdi ".to_string(),
            ..Default::default()
        }
        .into_school(SchoolId::new("s1"))
        .unwrap();
        assert_eq!(school.config.name, "Scuola Verdi");
        assert_eq!(school.config.currency_symbol, "$");
        assert_eq!(school.config.currency_name, "Dollari");
        assert_eq!(school.config.max_debt, None);
        assert!(school.config.show_leaderboard);
        assert_eq!(school.status, SchoolStatus::Active);
    }

    #[test]
    fn blank_name_is_rejected() {
        let err = NewSchool::default().into_school(SchoolId::new("s")).unwrap_err();
        assert!(matches!(err, DomainError::InvalidArgument(_)));
    }

    #[test]
    fn config_missing_fields_decode_with_defaults() {
        let cfg: SchoolConfig = serde_json::from_value(serde_json::json!({"name": "X"})).unwrap();
        assert_eq!(cfg.currency_symbol, "$");
        assert!(cfg.show_leaderboard);
    }
}
