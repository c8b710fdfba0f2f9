//! Per-school reference data: classes and subjects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use schoolbank_core::{ClassId, DomainResult, Entity, EntityKind, SubjectId};

use crate::ledger::required_text;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    pub id: ClassId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Entity for Class {
    type Id = ClassId;

    const COLLECTION: &'static str = "classes";
    const KIND: EntityKind = EntityKind::Class;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewClass {
    pub name: String,
}

impl NewClass {
    pub fn into_class(self, id: ClassId) -> DomainResult<Class> {
        Ok(Class {
            id,
            name: required_text(&self.name, "class name")?,
            created_at: None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: SubjectId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Entity for Subject {
    type Id = SubjectId;

    const COLLECTION: &'static str = "subjects";
    const KIND: EntityKind = EntityKind::Subject;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubject {
    pub name: String,
}

impl NewSubject {
    pub fn into_subject(self, id: SubjectId) -> DomainResult<Subject> {
        Ok(Subject {
            id,
            name: required_text(&self.name, "subject name")?,
            created_at: None,
        })
    }
}
