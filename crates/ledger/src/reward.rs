//! Reward catalog, quick-award presets and the redemption request lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use schoolbank_core::{
    DomainError, DomainResult, Entity, EntityKind, QuickRewardId, RewardId, RewardRequestId,
    StudentId, UserId,
};

use crate::ledger::{FieldMap, required_text};

/// Reason recorded on the ledger row that pays for a redeemed reward.
pub fn redemption_reason(reward_name: &str) -> String {
    format!("Redeem: {reward_name}")
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    pub id: RewardId,
    pub name: String,
    /// Always positive.
    pub cost: i64,
    #[serde(default)]
    pub icon: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Entity for Reward {
    type Id = RewardId;

    const COLLECTION: &'static str = "rewards";
    const KIND: EntityKind = EntityKind::Reward;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

fn validate_cost(cost: i64) -> DomainResult<i64> {
    if cost <= 0 {
        return Err(DomainError::invalid_argument("cost must be positive"));
    }
    crate::ledger::validate_amount(cost)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReward {
    pub name: String,
    pub cost: i64,
    #[serde(default)]
    pub icon: Option<String>,
}

impl NewReward {
    pub fn into_reward(self, id: RewardId) -> DomainResult<Reward> {
        Ok(Reward {
            id,
            name: required_text(&self.name, "reward name")?,
            cost: validate_cost(self.cost)?,
            icon: self.icon.unwrap_or_default().trim().to_string(),
            active: true,
            created_at: None,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub cost: Option<i64>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
}

impl RewardUpdate {
    pub fn fields(&self) -> DomainResult<FieldMap> {
        let mut fields = FieldMap::new();
        if let Some(name) = &self.name {
            fields.insert("name".into(), required_text(name, "reward name")?.into());
        }
        if let Some(cost) = self.cost {
            fields.insert("cost".into(), validate_cost(cost)?.into());
        }
        if let Some(icon) = &self.icon {
            fields.insert("icon".into(), icon.trim().into());
        }
        if let Some(active) = self.active {
            fields.insert("active".into(), active.into());
        }
        Ok(fields)
    }
}

/// A preset one-tap award shown to teachers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickReward {
    pub id: QuickRewardId,
    pub name: String,
    pub amount: i64,
    #[serde(default)]
    pub icon: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Entity for QuickReward {
    type Id = QuickRewardId;

    const COLLECTION: &'static str = "quickRewards";
    const KIND: EntityKind = EntityKind::QuickReward;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewQuickReward {
    pub name: String,
    pub amount: i64,
    #[serde(default)]
    pub icon: Option<String>,
}

impl NewQuickReward {
    pub fn into_quick_reward(self, id: QuickRewardId) -> DomainResult<QuickReward> {
        if self.amount == 0 {
            return Err(DomainError::invalid_argument("amount must not be zero"));
        }
        Ok(QuickReward {
            id,
            name: required_text(&self.name, "quick reward name")?,
            amount: self.amount,
            icon: self.icon.unwrap_or_default().trim().to_string(),
            created_at: None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

impl core::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for RequestStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            other => Err(DomainError::invalid_argument(format!(
                "unknown request status '{other}'"
            ))),
        }
    }
}

/// A student's ask to redeem a reward. `pending` moves to exactly one of
/// `approved` or `rejected` and never leaves it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardRequest {
    pub id: RewardRequestId,
    pub student_id: StudentId,
    pub reward_id: RewardId,
    #[serde(default)]
    pub status: RequestStatus,
    #[serde(default)]
    pub requested_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_by: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

impl Entity for RewardRequest {
    type Id = RewardRequestId;

    const COLLECTION: &'static str = "rewardRequests";
    const KIND: EntityKind = EntityKind::RewardRequest;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl RewardRequest {
    pub fn pending(id: RewardRequestId, student_id: StudentId, reward_id: RewardId) -> Self {
        Self {
            id,
            student_id,
            reward_id,
            status: RequestStatus::Pending,
            requested_at: None,
            approved_at: None,
            approved_by: None,
            rejected_at: None,
            rejected_by: None,
            rejection_reason: None,
        }
    }

    pub fn approve(&self, by: UserId) -> DomainResult<RequestTransition> {
        self.ensure_pending()?;
        Ok(RequestTransition::Approve { by })
    }

    pub fn reject(&self, by: UserId, reason: Option<String>) -> DomainResult<RequestTransition> {
        self.ensure_pending()?;
        let reason = reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
        Ok(RequestTransition::Reject { by, reason })
    }

    fn ensure_pending(&self) -> DomainResult<()> {
        if self.status != RequestStatus::Pending {
            return Err(DomainError::invalid_request_state(format!(
                "request {} is already {}",
                self.id, self.status
            )));
        }
        Ok(())
    }
}

/// A legal move out of `pending`, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestTransition {
    Approve { by: UserId },
    Reject { by: UserId, reason: Option<String> },
}

impl RequestTransition {
    pub fn target(&self) -> RequestStatus {
        match self {
            RequestTransition::Approve { .. } => RequestStatus::Approved,
            RequestTransition::Reject { .. } => RequestStatus::Rejected,
        }
    }

    /// Fields written on the request document, excluding the timestamp.
    pub fn fields(&self) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("status".into(), self.target().as_str().into());
        match self {
            RequestTransition::Approve { by } => {
                fields.insert("approvedBy".into(), by.as_str().into());
            }
            RequestTransition::Reject { by, reason } => {
                fields.insert("rejectedBy".into(), by.as_str().into());
                if let Some(reason) = reason {
                    fields.insert("rejectionReason".into(), reason.as_str().into());
                }
            }
        }
        fields
    }

    /// Server-stamped field recording when the transition happened.
    pub fn timestamp_field(&self) -> &'static str {
        match self {
            RequestTransition::Approve { .. } => "approvedAt",
            RequestTransition::Reject { .. } => "rejectedAt",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RewardRequest {
        RewardRequest::pending(
            RewardRequestId::new("q1"),
            StudentId::new("s1"),
            RewardId::new("r1"),
        )
    }

    #[test]
    fn pending_request_can_be_approved_once() {
        let mut req = request();
        let t = req.approve(UserId::new("t1")).unwrap();
        assert_eq!(t.target(), RequestStatus::Approved);
        assert_eq!(t.fields()["status"], "approved");
        assert_eq!(t.timestamp_field(), "approvedAt");

        req.status = t.target();
        let err = req.approve(UserId::new("t1")).unwrap_err();
        assert!(matches!(err, DomainError::InvalidRequestState(_)));
        assert!(req.reject(UserId::new("t1"), None).is_err());
    }

    #[test]
    fn rejection_records_optional_reason() {
        let t = request().reject(UserId::new("t1"), Some("  ".into())).unwrap();
        assert!(!t.fields().contains_key("rejectionReason"));
        let t = request().reject(UserId::new("t1"), Some("not now".into())).unwrap();
        assert_eq!(t.fields()["rejectionReason"], "not now");
        assert_eq!(t.fields()["rejectedBy"], "t1");
    }

    #[test]
    fn reward_cost_must_be_positive() {
        let bad = NewReward { name: "Pen".into(), cost: 0, icon: None };
        assert!(bad.into_reward(RewardId::new("r")).is_err());
        assert!(RewardUpdate { cost: Some(-1), ..Default::default() }.fields().is_err());
        assert!(RewardUpdate { cost: Some(i64::MAX), ..Default::default() }.fields().is_err());
    }

    #[test]
    fn status_round_trips_through_str() {
        for s in [RequestStatus::Pending, RequestStatus::Approved, RequestStatus::Rejected] {
            assert_eq!(s.as_str().parse::<RequestStatus>().unwrap(), s);
        }
    }
}
