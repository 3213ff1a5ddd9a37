//! Extension-point bus errors.

use thiserror::Error;

use crate::types::SubscriptionId;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("Extension point {point} carries {expected}, not {found}")]
    SignatureMismatch {
        point: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Subscription not found: {0}")]
    NotSubscribed(SubscriptionId),

    #[error("Bus is frozen; {0} rejected")]
    Frozen(&'static str),
}
