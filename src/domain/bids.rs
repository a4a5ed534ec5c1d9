use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::milestones::{Milestone, MilestoneInput, MilestoneMode};
use super::projects::ProjectStatus;

/// Rejection reason applied to siblings when one bid is accepted
pub const REASON_ANOTHER_BID_ACCEPTED: &str = "another bid accepted";

/// Rejection reason applied when the project is cancelled
pub const REASON_PROJECT_CANCELLED: &str = "project cancelled";

/// Rejection reason used when the client gives none
pub const REASON_REJECTED_BY_CLIENT: &str = "rejected by client";

/// Bid status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
    #[default]
    Pending,
    UnderReview,
    Accepted,
    Rejected,
    Withdrawn,
    Expired,
}

impl BidStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::UnderReview => "under_review",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Withdrawn => "withdrawn",
            Self::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "under_review" => Some(Self::UnderReview),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            "withdrawn" => Some(Self::Withdrawn),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    /// Pending and under review are the only non-terminal states
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::UnderReview)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_open()
    }

    pub fn can_transition_to(&self, next: BidStatus) -> bool {
        match self {
            Self::Pending => next != Self::Pending,
            Self::UnderReview => next.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for BidStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bid entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bid {
    pub id: Uuid,
    pub project_id: Uuid,
    pub company_id: Uuid,
    pub amount: Decimal,
    pub milestones: Vec<Milestone>,
    pub proposal: Option<String>,
    pub timeline_days: Option<i32>,
    pub status: BidStatus,
    pub rejection_reason: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bid {
    /// Marks the entity as the next version of itself
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = now;
    }

    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |deadline| now > deadline)
    }

    /// Move to `rejected` with the given reason as the next version
    pub fn rejected(mut self, reason: &str, now: DateTime<Utc>) -> Self {
        self.status = BidStatus::Rejected;
        self.rejection_reason = Some(reason.to_string());
        self.touch(now);
        self
    }
}

/// Request DTO for submitting or revising a bid
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitBidRequest {
    pub amount: Decimal,
    pub milestones: Vec<MilestoneInput>,
    #[serde(default)]
    pub milestone_mode: MilestoneMode,
    #[serde(default)]
    pub proposal: Option<String>,
    #[serde(default)]
    pub timeline_days: Option<i32>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Request DTO for rejecting a bid
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RejectBidRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Milestone as returned to callers, with its currency amount resolved
#[derive(Debug, Clone, Serialize)]
pub struct MilestoneView {
    pub title: String,
    pub percentage: Decimal,
    pub amount: Decimal,
    pub description: Option<String>,
}

/// Response DTO for bid
#[derive(Debug, Clone, Serialize)]
pub struct BidResponse {
    pub id: Uuid,
    pub project_id: Uuid,
    pub company_id: Uuid,
    pub amount: Decimal,
    pub milestones: Vec<MilestoneView>,
    pub proposal: Option<String>,
    pub timeline_days: Option<i32>,
    pub status: BidStatus,
    pub rejection_reason: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Bid> for BidResponse {
    fn from(b: Bid) -> Self {
        let milestones = b
            .milestones
            .iter()
            .map(|m| MilestoneView {
                title: m.title.clone(),
                percentage: m.percentage,
                amount: m.amount_of(b.amount),
                description: m.description.clone(),
            })
            .collect();

        Self {
            id: b.id,
            project_id: b.project_id,
            company_id: b.company_id,
            amount: b.amount,
            milestones,
            proposal: b.proposal,
            timeline_days: b.timeline_days,
            status: b.status,
            rejection_reason: b.rejection_reason,
            expires_at: b.expires_at,
            version: b.version,
            submitted_at: b.submitted_at,
            updated_at: b.updated_at,
        }
    }
}

/// Response DTO for bid submission
#[derive(Debug, Clone, Serialize)]
pub struct SubmitBidResponse {
    pub bid_id: Uuid,
    pub status: BidStatus,
}

/// Response DTO for single-bid transitions
#[derive(Debug, Clone, Serialize)]
pub struct BidStatusResponse {
    pub bid_id: Uuid,
    pub status: BidStatus,
}

/// Result of accepting a bid
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AcceptOutcome {
    pub accepted_bid_id: Uuid,
    pub rejected_bid_ids: Vec<Uuid>,
    pub project_status: ProjectStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_have_no_exits() {
        for status in [
            BidStatus::Accepted,
            BidStatus::Rejected,
            BidStatus::Withdrawn,
            BidStatus::Expired,
        ] {
            assert!(status.is_terminal());
            assert!(!status.can_transition_to(BidStatus::Pending));
            assert!(!status.can_transition_to(BidStatus::Rejected));
        }
    }

    #[test]
    fn open_states_reach_every_terminal_state() {
        assert!(BidStatus::Pending.can_transition_to(BidStatus::UnderReview));
        assert!(!BidStatus::UnderReview.can_transition_to(BidStatus::Pending));
        for next in [
            BidStatus::Accepted,
            BidStatus::Rejected,
            BidStatus::Withdrawn,
            BidStatus::Expired,
        ] {
            assert!(BidStatus::Pending.can_transition_to(next));
            assert!(BidStatus::UnderReview.can_transition_to(next));
        }
    }

    #[test]
    fn status_strings_round_trip_through_parse() {
        assert_eq!(BidStatus::parse("under_review"), Some(BidStatus::UnderReview));
        assert_eq!(BidStatus::parse("shortlisted"), None);
    }
}
