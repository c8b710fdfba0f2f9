use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use schoolbank_core::{ClassId, DomainResult, Entity, EntityKind, StudentId};

use crate::ledger::{FieldMap, double_option, required_text};

/// A student account (`schools/{s}/students/{id}`).
///
/// `balance` is a cached aggregate of the student's transactions. Only the
/// ledger engine writes it, and only through atomic increments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: StudentId,
    pub name: String,
    #[serde(default)]
    pub class_id: Option<ClassId>,
    #[serde(default)]
    pub balance: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nfc_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entity for Student {
    type Id = StudentId;

    const COLLECTION: &'static str = "students";
    const KIND: EntityKind = EntityKind::Student;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Card tags are compared case-insensitively; blank means "no tag".
pub fn normalize_nfc_tag(tag: &str) -> Option<String> {
    let tag = tag.trim();
    (!tag.is_empty()).then(|| tag.to_uppercase())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudent {
    pub name: String,
    #[serde(default)]
    pub class_id: Option<ClassId>,
    #[serde(default)]
    pub nfc_tag: Option<String>,
}

impl NewStudent {
    /// New students always start at a zero balance.
    pub fn into_student(self, id: StudentId) -> DomainResult<Student> {
        Ok(Student {
            id,
            name: required_text(&self.name, "student name")?,
            class_id: self.class_id,
            balance: 0,
            nfc_tag: self.nfc_tag.as_deref().and_then(normalize_nfc_tag),
            created_at: None,
            updated_at: None,
        })
    }
}

/// Profile edit for a student. There is deliberately no balance field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub class_id: Option<Option<ClassId>>,
    #[serde(default, deserialize_with = "double_option")]
    pub nfc_tag: Option<Option<String>>,
}

impl StudentUpdate {
    pub fn fields(&self) -> DomainResult<FieldMap> {
        let mut fields = FieldMap::new();
        if let Some(name) = &self.name {
            fields.insert("name".into(), required_text(name, "student name")?.into());
        }
        if let Some(class_id) = &self.class_id {
            let value = class_id
                .as_ref()
                .map_or(serde_json::Value::Null, |c| c.as_str().into());
            fields.insert("classId".into(), value);
        }
        if let Some(tag) = &self.nfc_tag {
            let value = tag
                .as_deref()
                .and_then(normalize_nfc_tag)
                .map_or(serde_json::Value::Null, Into::into);
            fields.insert("nfcTag".into(), value);
        }
        Ok(fields)
    }

    /// The normalized tag this update assigns, if it assigns one.
    pub fn assigned_nfc_tag(&self) -> Option<String> {
        self.nfc_tag.as_ref()?.as_deref().and_then(normalize_nfc_tag)
    }
}
