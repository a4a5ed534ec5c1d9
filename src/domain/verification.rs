//! Company verification domain types
//!
//! A company is created with a pending verification record and may bid only
//! once an administrator approves it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Documents every company must supply before review
pub const REQUIRED_DOCUMENT_KEYS: [&str; 5] = [
    "business_registration",
    "tax_certificate",
    "insurance_certificate",
    "bank_details",
    "owner_identification",
];

/// Verification status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    #[default]
    Pending,
    UnderReview,
    Approved,
    Rejected,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::UnderReview => "under_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "under_review" => Some(Self::UnderReview),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Approved and rejected only leave through an explicit re-open
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }

    pub fn accepts_documents(&self) -> bool {
        matches!(self, Self::Pending | Self::Rejected)
    }

    pub fn is_reviewable(&self) -> bool {
        matches!(self, Self::Pending | Self::UnderReview)
    }
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable reference returned by the attachment registry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct AttachmentRef(pub String);

impl AttachmentRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

/// Admin decision on a verification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

/// CompanyVerification entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompanyVerification {
    pub company_id: Uuid,
    pub status: VerificationStatus,
    pub documents: BTreeMap<String, AttachmentRef>,
    pub required_doc_keys: Vec<String>,
    pub rejection_reason: Option<String>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CompanyVerification {
    pub fn new(company_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            company_id,
            status: VerificationStatus::Pending,
            documents: BTreeMap::new(),
            required_doc_keys: REQUIRED_DOCUMENT_KEYS.iter().map(|k| k.to_string()).collect(),
            rejection_reason: None,
            reviewed_by: None,
            reviewed_at: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_required(&self, key: &str) -> bool {
        self.required_doc_keys.iter().any(|k| k == key)
    }

    /// Required keys with no document on file, in declaration order
    pub fn missing_required(&self) -> Vec<String> {
        self.required_doc_keys
            .iter()
            .filter(|key| !self.documents.contains_key(key.as_str()))
            .cloned()
            .collect()
    }

    /// Marks the entity as the next version of itself
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = now;
    }
}

/// Request DTO for document submission
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitDocumentsRequest {
    pub documents: BTreeMap<String, AttachmentRef>,
}

/// Result of a document submission
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DocumentSubmission {
    pub status: VerificationStatus,
    pub missing_required: Vec<String>,
}

/// Request DTO for an admin review
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewVerificationRequest {
    pub decision: ReviewDecision,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Response DTO for verification
#[derive(Debug, Clone, Serialize)]
pub struct VerificationResponse {
    pub company_id: Uuid,
    pub status: VerificationStatus,
    pub documents: BTreeMap<String, AttachmentRef>,
    pub missing_required: Vec<String>,
    pub rejection_reason: Option<String>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl From<CompanyVerification> for VerificationResponse {
    fn from(v: CompanyVerification) -> Self {
        let missing_required = v.missing_required();
        Self {
            company_id: v.company_id,
            status: v.status,
            documents: v.documents,
            missing_required,
            rejection_reason: v.rejection_reason,
            reviewed_by: v.reviewed_by,
            reviewed_at: v.reviewed_at,
            version: v.version,
            updated_at: v.updated_at,
        }
    }
}

/// Response DTO carrying only the resulting status
#[derive(Debug, Clone, Serialize)]
pub struct VerificationStatusResponse {
    pub company_id: Uuid,
    pub status: VerificationStatus,
}
