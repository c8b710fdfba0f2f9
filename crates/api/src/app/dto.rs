use serde::Deserialize;

use schoolbank_core::{ClassId, DomainResult, RewardId, SchoolId, StudentId, SubjectId, UserId};
use schoolbank_ledger::{Award, RequestStatus, TransactionFilter};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardFields {
    pub amount: i64,
    pub reason: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub subject_id: Option<SubjectId>,
}

impl AwardFields {
    pub fn into_award(self) -> DomainResult<Award> {
        Award::new(self.amount, self.reason, self.icon, self.subject_id)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiveRequest {
    pub student_id: StudentId,
    #[serde(flatten)]
    pub award: AwardFields,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiveClassRequest {
    pub class_id: ClassId,
    #[serde(flatten)]
    pub award: AwardFields,
}

#[derive(Debug, Deserialize)]
pub struct AdjustBalanceRequest {
    pub delta: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRewardRequest {
    pub student_id: StudentId,
    pub reward_id: RewardId,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpersonationRequest {
    pub school_id: SchoolId,
}

#[derive(Debug, Deserialize)]
pub struct TeacherClassesRequest {
    pub classes: Vec<ClassId>,
}

// -------------------------
// Query parameters
// -------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentsQuery {
    pub class_id: Option<ClassId>,
    pub nfc_tag: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsQuery {
    pub student_id: Option<StudentId>,
    pub class_id: Option<ClassId>,
    pub teacher_id: Option<UserId>,
    pub limit: Option<usize>,
}

impl TransactionsQuery {
    /// At most one filter applies: student, then class, then teacher.
    pub fn filter(&self) -> TransactionFilter {
        if let Some(id) = &self.student_id {
            TransactionFilter::Student(id.clone())
        } else if let Some(id) = &self.class_id {
            TransactionFilter::Class(id.clone())
        } else if let Some(id) = &self.teacher_id {
            TransactionFilter::Teacher(id.clone())
        } else {
            TransactionFilter::All
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RequestsQuery {
    pub status: Option<RequestStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeachersQuery {
    pub school_id: Option<SchoolId>,
}
