//! Domain types and DTOs
//!
//! Entities for the three lifecycles (projects, bids, company verification)
//! plus the milestone breakdown carried by every bid.

pub mod actor;
pub mod bids;
pub mod milestones;
pub mod projects;
pub mod verification;

// Re-export commonly used types
pub use actor::*;
pub use bids::*;
pub use milestones::{Milestone, MilestoneInput, MilestoneMode};
pub use projects::*;
pub use verification::*;
