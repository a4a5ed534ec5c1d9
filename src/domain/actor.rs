use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Platform role carried in the token's app metadata
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlatformRole {
    Client,
    Company,
    Admin,
}

impl PlatformRole {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "client" => Some(Self::Client),
            "company" => Some(Self::Company),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

impl std::fmt::Display for PlatformRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Client => write!(f, "client"),
            Self::Company => write!(f, "company"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

/// The caller of a lifecycle operation.
///
/// Every mutating call takes one of these explicitly; nothing in the lifecycle
/// layer reads the current user from ambient state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: PlatformRole,
    /// Company the user acts for, set for company accounts
    pub company_id: Option<Uuid>,
}

impl Actor {
    pub fn client(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: PlatformRole::Client,
            company_id: None,
        }
    }

    pub fn company(user_id: Uuid, company_id: Uuid) -> Self {
        Self {
            user_id,
            role: PlatformRole::Company,
            company_id: Some(company_id),
        }
    }

    pub fn admin(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: PlatformRole::Admin,
            company_id: None,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == PlatformRole::Admin
    }

    /// True when the actor is a company account acting for `company_id`
    pub fn acts_for(&self, company_id: Uuid) -> bool {
        self.role == PlatformRole::Company && self.company_id == Some(company_id)
    }
}
