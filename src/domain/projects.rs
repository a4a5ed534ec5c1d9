use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Project status enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Draft,
    #[default]
    Posted,
    Bidding,
    Active,
    Completed,
    Cancelled,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Posted => "posted",
            Self::Bidding => "bidding",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "posted" => Some(Self::Posted),
            "bidding" => Some(Self::Bidding),
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Whether the project takes new bids (and bid decisions)
    pub fn is_open_for_bids(&self) -> bool {
        matches!(self, Self::Posted | Self::Bidding)
    }

    /// Forward-only transition graph; cancellation from posted or bidding
    pub fn can_transition_to(&self, next: ProjectStatus) -> bool {
        use ProjectStatus::*;
        matches!(
            (self, next),
            (Draft, Posted)
                | (Posted, Bidding)
                | (Posted, Active)
                | (Bidding, Active)
                | (Active, Completed)
                | (Posted, Cancelled)
                | (Bidding, Cancelled)
        )
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decimal places a stored currency amount keeps
pub const MONEY_SCALE: u32 = 2;

/// Largest currency amount the `NUMERIC(14, 2)` columns hold
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0x107a_3fff, 0x5af3, 0, false, MONEY_SCALE);

/// Whether `amount` is stored without rounding or overflow
pub fn is_storable_amount(amount: Decimal) -> bool {
    amount.normalize().scale() <= MONEY_SCALE && amount.abs() <= MAX_AMOUNT
}

/// Budget bounds; `max = None` means unbounded
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Budget {
    pub min: Decimal,
    #[serde(default)]
    pub max: Option<Decimal>,
}

impl Budget {
    pub fn new(min: Decimal, max: Option<Decimal>) -> Self {
        Self { min, max }
    }

    pub fn is_valid(&self) -> bool {
        self.min >= Decimal::ZERO && self.max.map_or(true, |max| max >= self.min && max > Decimal::ZERO)
    }

    /// An unbounded budget accepts any positive amount
    pub fn contains(&self, amount: Decimal) -> bool {
        if amount <= Decimal::ZERO {
            return false;
        }
        match self.max {
            Some(max) => amount >= self.min && amount <= max,
            None => true,
        }
    }
}

/// Project entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub budget: Budget,
    pub bid_ids: Vec<Uuid>,
    pub accepted_bid_id: Option<Uuid>,
    pub is_invite_only: bool,
    pub invited_company_ids: Vec<Uuid>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn is_invited(&self, company_id: Uuid) -> bool {
        !self.is_invite_only || self.invited_company_ids.contains(&company_id)
    }

    /// Marks the entity as the next version of itself
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = now;
    }

    /// acceptedBidId is set exactly when the project is active or completed
    pub fn acceptance_consistent(&self) -> bool {
        self.accepted_bid_id.is_some()
            == matches!(self.status, ProjectStatus::Active | ProjectStatus::Completed)
    }
}

/// Request DTO for creating a project
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProjectRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub budget_min: Decimal,
    #[serde(default)]
    pub budget_max: Option<Decimal>,
    #[serde(default)]
    pub is_invite_only: bool,
    #[serde(default)]
    pub invited_company_ids: Vec<Uuid>,
    /// Keep the project as a draft instead of posting it
    #[serde(default)]
    pub draft: bool,
}

/// Request DTO for updating a posted project
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProjectRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub budget_min: Option<Decimal>,
    #[serde(default)]
    pub budget_max: Option<Decimal>,
    /// Explicitly clear the upper bound
    #[serde(default)]
    pub unbounded: bool,
    #[serde(default)]
    pub is_invite_only: Option<bool>,
    #[serde(default)]
    pub invited_company_ids: Option<Vec<Uuid>>,
}

/// Response DTO for project
#[derive(Debug, Clone, Serialize)]
pub struct ProjectResponse {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub budget_min: Decimal,
    pub budget_max: Option<Decimal>,
    pub bid_count: usize,
    pub accepted_bid_id: Option<Uuid>,
    pub is_invite_only: bool,
    pub invited_company_ids: Vec<Uuid>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Project> for ProjectResponse {
    fn from(p: Project) -> Self {
        Self {
            id: p.id,
            owner_id: p.owner_id,
            title: p.title,
            description: p.description,
            status: p.status,
            budget_min: p.budget.min,
            budget_max: p.budget.max,
            bid_count: p.bid_ids.len(),
            accepted_bid_id: p.accepted_bid_id,
            is_invite_only: p.is_invite_only,
            invited_company_ids: p.invited_company_ids,
            version: p.version,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

/// Result of cancelling a project
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CancelOutcome {
    pub status: ProjectStatus,
    pub cascaded_rejections: usize,
}
