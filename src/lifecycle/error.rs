use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::milestones::MilestoneError;
use crate::domain::ProjectStatus;
use crate::store::StoreError;

/// Failure taxonomy shared by every lifecycle operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    StateConflict,
    Authorization,
    Concurrency,
    NotFound,
    Internal,
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("{message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("bid amount {amount} is outside the project budget")]
    AmountOutOfRange {
        amount: Decimal,
        min: Decimal,
        max: Option<Decimal>,
    },

    #[error("milestones do not match the bid total: {0}")]
    MilestoneMismatch(#[from] MilestoneError),

    #[error("{0}")]
    StateConflict(String),

    #[error("project {project_id} is not accepting bids (status {status})")]
    ProjectNotBiddable {
        project_id: Uuid,
        status: ProjectStatus,
    },

    #[error("company {company_id} already has an open bid on project {project_id}")]
    DuplicateBid { project_id: Uuid, company_id: Uuid },

    #[error("{0}")]
    Authorization(String),

    #[error("company {0} is not verified to bid")]
    CompanyNotVerified(Uuid),

    #[error("company {company_id} is not invited to project {project_id}")]
    NotInvited { project_id: Uuid, company_id: Uuid },

    #[error("{entity} {id} kept changing underneath the request ({attempts} attempts)")]
    Concurrency {
        entity: &'static str,
        id: Uuid,
        attempts: u32,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("storage failure: {0}")]
    Store(StoreError),
}

impl LifecycleError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::StateConflict(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Authorization(message.into())
    }

    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } | Self::AmountOutOfRange { .. } | Self::MilestoneMismatch(_) => {
                ErrorKind::Validation
            }
            Self::StateConflict(_) | Self::ProjectNotBiddable { .. } | Self::DuplicateBid { .. } => {
                ErrorKind::StateConflict
            }
            Self::Authorization(_) | Self::CompanyNotVerified(_) | Self::NotInvited { .. } => {
                ErrorKind::Authorization
            }
            Self::Concurrency { .. } => ErrorKind::Concurrency,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Store(StoreError::VersionConflict { .. }) => ErrorKind::Concurrency,
            Self::Store(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::AmountOutOfRange { .. } => "AMOUNT_OUT_OF_RANGE",
            Self::MilestoneMismatch(_) => "MILESTONE_MISMATCH",
            Self::StateConflict(_) => "STATE_CONFLICT",
            Self::ProjectNotBiddable { .. } => "PROJECT_NOT_BIDDABLE",
            Self::DuplicateBid { .. } => "DUPLICATE_BID",
            Self::Authorization(_) => "FORBIDDEN",
            Self::CompanyNotVerified(_) => "COMPANY_NOT_VERIFIED",
            Self::NotInvited { .. } => "NOT_INVITED",
            Self::Concurrency { .. } | Self::Store(StoreError::VersionConflict { .. }) => {
                "CONCURRENCY_CONFLICT"
            }
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Store(_) => "INTERNAL_ERROR",
        }
    }

    /// Offending request field for user-correctable errors
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::Validation { field, .. } => Some(*field),
            Self::AmountOutOfRange { .. } => Some("amount"),
            Self::MilestoneMismatch(_) => Some("milestones"),
            _ => None,
        }
    }

    /// Only optimistic version mismatches are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(StoreError::VersionConflict { .. }))
    }
}

impl From<StoreError> for LifecycleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::OpenBidExists {
                project_id,
                company_id,
            } => Self::DuplicateBid {
                project_id,
                company_id,
            },
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            StoreError::AlreadyExists { entity, id } => {
                Self::StateConflict(format!("{entity} {id} already exists"))
            }
            other => Self::Store(other),
        }
    }
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;
