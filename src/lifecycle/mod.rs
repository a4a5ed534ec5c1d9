//! Lifecycle managers for projects, bids and company verification
//!
//! All three share one [`LifecycleStore`] and one [`RetryPolicy`].

pub mod access;
pub mod bids;
pub mod error;
pub mod projects;
pub mod retry;
pub mod verification;

use std::sync::Arc;

use crate::store::LifecycleStore;

pub use bids::BidLifecycle;
pub use error::{ErrorKind, LifecycleError, LifecycleResult};
pub use projects::ProjectLifecycle;
pub use retry::RetryPolicy;
pub use verification::VerificationWorkflow;

#[derive(Clone)]
pub struct LifecycleServices {
    pub projects: ProjectLifecycle,
    pub bids: BidLifecycle,
    pub verification: VerificationWorkflow,
}

impl LifecycleServices {
    pub fn new(store: Arc<dyn LifecycleStore>, retry: RetryPolicy) -> Self {
        let verification = VerificationWorkflow::new(store.clone(), retry.clone());
        Self {
            projects: ProjectLifecycle::new(store.clone(), retry.clone()),
            bids: BidLifecycle::new(store, verification.clone(), retry),
            verification,
        }
    }
}
