//! Closed state types for remediation tasks and the cancel-then-delete
//! workflow.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::types::ResourceId;

/// How a remediation task discovers the resources it remediates.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DiscoveryMode {
    /// Remediates resources already known to be non-compliant. Runs
    /// immediately and never needs cancelling before delete.
    ExistingNonCompliant,
    /// Re-evaluates compliance first, leaving a long-running evaluation on
    /// the remote side.
    ReEvaluateCompliance,
}

/// Raised when the remote reports a discovery mode this crate does not know.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("unknown resource discovery mode: {0}")]
pub struct UnknownDiscoveryMode(pub String);

impl FromStr for DiscoveryMode {
    type Err = UnknownDiscoveryMode;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.eq_ignore_ascii_case("ExistingNonCompliant") {
            Ok(Self::ExistingNonCompliant)
        } else if value.eq_ignore_ascii_case("ReEvaluateCompliance") {
            Ok(Self::ReEvaluateCompliance)
        } else {
            Err(UnknownDiscoveryMode(value.to_owned()))
        }
    }
}

impl fmt::Display for DiscoveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ExistingNonCompliant => "ExistingNonCompliant",
            Self::ReEvaluateCompliance => "ReEvaluateCompliance",
        })
    }
}

/// Provisioning state reported for a remediation task.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum ProvisioningState {
    /// Task accepted, not yet started.
    Accepted,
    /// Compliance evaluation in progress.
    Evaluating,
    /// Cancellation requested, not yet complete.
    Cancelling,
    /// Task finished.
    Succeeded,
    /// Task cancelled.
    Canceled,
    /// Task finished with a failure.
    Failed,
    /// Any state not modelled above, kept verbatim.
    Other(String),
}

impl ProvisioningState {
    /// States in which the remote task has stopped running.
    pub const TERMINAL: [Self; 3] = [Self::Succeeded, Self::Canceled, Self::Failed];

    /// Parses a remote label, keeping unknown values as [`Self::Other`].
    #[must_use]
    pub fn parse(value: &str) -> Self {
        [
            Self::Accepted,
            Self::Evaluating,
            Self::Cancelling,
            Self::Succeeded,
            Self::Canceled,
            Self::Failed,
        ]
        .into_iter()
        .find(|state| state.as_str().eq_ignore_ascii_case(value))
        .unwrap_or_else(|| Self::Other(value.to_owned()))
    }

    /// True while the task is still queued or evaluating, the only window in
    /// which a cancel request is valid.
    #[must_use]
    pub const fn is_cancellable(&self) -> bool {
        matches!(self, Self::Accepted | Self::Evaluating)
    }

    /// Returns the remote spelling of the state.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Accepted => "Accepted",
            Self::Evaluating => "Evaluating",
            Self::Cancelling => "Cancelling",
            Self::Succeeded => "Succeeded",
            Self::Canceled => "Canceled",
            Self::Failed => "Failed",
            Self::Other(value) => value,
        }
    }
}

impl From<&str> for ProvisioningState {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a remediation task read just before deletion.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemediationState {
    /// Resource identity of the remediation.
    pub id: ResourceId,
    /// Discovery mode configured on the remediation.
    pub discovery_mode: DiscoveryMode,
    /// Provisioning state reported by the remote.
    pub provisioning_state: ProvisioningState,
}

impl RemediationState {
    /// Builds a snapshot from its parts.
    #[must_use]
    pub fn new(
        id: impl Into<ResourceId>,
        discovery_mode: DiscoveryMode,
        provisioning_state: ProvisioningState,
    ) -> Self {
        Self {
            id: id.into(),
            discovery_mode,
            provisioning_state,
        }
    }

    /// True iff the task re-evaluates compliance and is still queued or
    /// evaluating.
    #[must_use]
    pub const fn requires_cancellation(&self) -> bool {
        matches!(self.discovery_mode, DiscoveryMode::ReEvaluateCompliance)
            && self.provisioning_state.is_cancellable()
    }

    /// State the cancel-then-delete workflow starts in for this snapshot.
    #[must_use]
    pub const fn initial_state(&self) -> ControllerState {
        if self.requires_cancellation() {
            ControllerState::Cancelling
        } else {
            ControllerState::Stable
        }
    }
}

/// States of the cancel-then-delete workflow.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ControllerState {
    /// Nothing is running remotely; delete may proceed directly.
    Stable,
    /// A cancellation was requested and is awaiting convergence.
    Cancelling,
    /// The cancellation was observed complete.
    Converged,
    /// The cancel request or its convergence failed; delete must not
    /// proceed.
    Failed,
}

impl ControllerState {
    /// True when the caller may issue the delete call.
    #[must_use]
    pub const fn permits_delete(self) -> bool {
        matches!(self, Self::Stable | Self::Converged)
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stable => "stable",
            Self::Cancelling => "cancelling",
            Self::Converged => "converged",
            Self::Failed => "failed",
        })
    }
}
