//! Endpoint health gate deciding whether a delivery may be dispatched.

use crate::models::{Endpoint, EndpointStatus};

pub const PAUSED_REASON: &str = "endpoint is currently paused";
pub const PENDING_REASON: &str = "endpoint is being re-activated";

/// Outcome of [`authorize_dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchDecision {
    Allow,
    /// Allowed once the endpoint has been moved to the given status.
    AllowWithTransition(EndpointStatus),
    Deny(&'static str),
}

impl DispatchDecision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, DispatchDecision::Deny(_))
    }

    pub fn transition(&self) -> Option<EndpointStatus> {
        match self {
            DispatchDecision::AllowWithTransition(status) => Some(*status),
            _ => None,
        }
    }

    pub fn reason(&self) -> Option<&'static str> {
        match self {
            DispatchDecision::Deny(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Decides dispatch for the endpoint's current status.
///
/// `Inactive` endpoints are re-armed to `Pending` and the current dispatch still proceeds.
pub fn authorize_dispatch(endpoint: &Endpoint) -> DispatchDecision {
    match endpoint.status {
        EndpointStatus::Active => DispatchDecision::Allow,
        EndpointStatus::Paused => DispatchDecision::Deny(PAUSED_REASON),
        EndpointStatus::Pending => DispatchDecision::Deny(PENDING_REASON),
        EndpointStatus::Inactive => DispatchDecision::AllowWithTransition(EndpointStatus::Pending),
    }
}
