//! Convergence waits for eventually-consistent remote resources.
//!
//! A mutating call against a control plane often returns before the remote
//! resource has settled. The crate exposes a stabilization poller that
//! re-reads a resource until its reported state enters a target set, and a
//! cancel-then-delete controller that stops a running remediation task
//! before it is deleted.

pub mod config;
pub mod error;
pub mod http;
pub mod poll;
pub mod remediation;
pub mod test_support;
pub mod types;

pub use config::{ConfigError, PollConfig};
pub use error::ConvergeError;
pub use http::{HttpProbe, HttpProbeError, HttpSnapshot};
pub use poll::{
    Deadline, Observation, PollOutcome, PollSpec, PollSpecBuilder, PollTiming, Presence, run,
};
pub use remediation::{
    CancelThenDelete, ControllerState, DiscoveryMode, ProvisioningState, RemediationState,
    ensure_safe_to_delete,
};
pub use types::{LastObserved, ResourceId};
