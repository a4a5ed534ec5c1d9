use uuid::Uuid;

use super::Claims;
use crate::domain::{Actor, PlatformRole};

/// Authenticated user context extracted from JWT
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// User ID (from JWT sub claim)
    pub user_id: Uuid,

    /// User email if available
    pub email: Option<String>,

    /// Platform role from app metadata
    pub platform_role: PlatformRole,

    /// Company the user acts for
    pub company_id: Option<Uuid>,

    /// Token issuer
    pub issuer: String,
}

impl AuthContext {
    /// Tokens without a platform role belong to plain client accounts
    pub fn from_claims(claims: &Claims) -> Result<Self, &'static str> {
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| "Invalid user ID in token")?;

        let metadata = claims.app_metadata.clone().unwrap_or_default();
        let platform_role = match metadata.platform_role.as_deref() {
            None => PlatformRole::Client,
            Some(role) => PlatformRole::parse(role).ok_or("Unknown platform role in token")?,
        };
        if platform_role == PlatformRole::Company && metadata.company_id.is_none() {
            return Err("Company token is missing its company id");
        }

        Ok(Self {
            user_id,
            email: claims.email.clone(),
            platform_role,
            company_id: metadata.company_id,
            issuer: claims.iss.clone(),
        })
    }

    /// The caller as seen by the lifecycle layer
    pub fn actor(&self) -> Actor {
        Actor {
            user_id: self.user_id,
            role: self.platform_role,
            company_id: match self.platform_role {
                PlatformRole::Company => self.company_id,
                _ => None,
            },
        }
    }
}
