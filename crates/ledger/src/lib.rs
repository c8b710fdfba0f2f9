//! Classroom-economy ledger domain.
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns. The
//! engine that drives these types against a document store lives in
//! `schoolbank-infra`.

pub mod catalog;
pub mod ledger;
pub mod reward;
pub mod school;
pub mod student;
pub mod transaction;

pub use catalog::{Class, NewClass, NewSubject, Subject};
pub use ledger::{
    Award, DEFAULT_AWARD_ICON, DEFAULT_CLASS_AWARD_ICON, DEFAULT_REDEMPTION_ICON, FieldMap, MAX_AMOUNT,
    balance_from_log, drift,
};
pub use reward::{
    NewQuickReward, NewReward, QuickReward, RequestStatus, RequestTransition, Reward,
    RewardRequest, RewardUpdate, redemption_reason,
};
pub use school::{NewSchool, School, SchoolConfig, SchoolStatus, TENANT_COLLECTIONS};
pub use student::{NewStudent, Student, StudentUpdate, normalize_nfc_tag};
pub use transaction::{Transaction, TransactionFilter, TransactionKind, TransactionUpdate};
