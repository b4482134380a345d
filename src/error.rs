//! Errors raised while waiting for remote state to converge.

use thiserror::Error;

use crate::types::{LastObserved, ResourceId};

/// Reasons a polling run or a cancel-then-delete workflow stopped without
/// converging.
///
/// `E` is the error type returned by the injected refresh and cancel
/// capabilities; it is carried verbatim so callers can surface provider
/// failures unchanged.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ConvergeError<E> {
    /// Raised at entry when the run cannot start: missing or expired
    /// deadline, empty target set, or a zero occurrence requirement.
    #[error("invalid polling configuration for {resource}: {reason}")]
    Configuration {
        /// Resource the run was built for.
        resource: ResourceId,
        /// Human readable description of the problem.
        reason: String,
    },
    /// Raised when the refresh capability returns an error.
    #[error("refreshing {resource} failed (last observed: {last_label}): {source}")]
    RefreshFailed {
        /// Resource being observed.
        resource: ResourceId,
        /// Label seen before the failing refresh.
        last_label: LastObserved,
        /// Error returned by the refresh capability.
        #[source]
        source: E,
    },
    /// Raised when the deadline passes before the target is reached.
    #[error("timeout waiting for {resource} to reach {target} (last observed: {last_label})")]
    Timeout {
        /// Resource being observed.
        resource: ResourceId,
        /// Rendered target set.
        target: String,
        /// Label seen by the final completed refresh.
        last_label: LastObserved,
    },
    /// Raised when the enclosing operation is aborted externally.
    #[error("waiting for {resource} was cancelled (last observed: {last_label})")]
    Canceled {
        /// Resource being observed.
        resource: ResourceId,
        /// Label seen by the final completed refresh.
        last_label: LastObserved,
    },
    /// Raised when the remote rejects a cancellation request. The remote
    /// operation is left running.
    #[error("cancelling the running operation on {resource} was rejected: {source}")]
    CancelRejected {
        /// Resource whose operation could not be cancelled.
        resource: ResourceId,
        /// Error returned by the cancel capability.
        #[source]
        source: E,
    },
    /// Raised when an observed label is neither pending nor a target.
    #[error("{resource} reported unexpected state {label} (pending: {pending}; target: {target})")]
    UnexpectedState {
        /// Resource being observed.
        resource: ResourceId,
        /// Label that matched neither set.
        label: String,
        /// Rendered pending set.
        pending: String,
        /// Rendered target set.
        target: String,
    },
    /// Raised when the resource stays absent for more consecutive checks
    /// than the run allows.
    #[error("{resource} was not found after {checks} consecutive checks")]
    NotFound {
        /// Resource being observed.
        resource: ResourceId,
        /// Number of consecutive absent observations.
        checks: u32,
    },
}

impl<E> ConvergeError<E> {
    /// Returns the resource the error refers to.
    #[must_use]
    pub const fn resource(&self) -> &ResourceId {
        match self {
            Self::Configuration { resource, .. }
            | Self::RefreshFailed { resource, .. }
            | Self::Timeout { resource, .. }
            | Self::Canceled { resource, .. }
            | Self::CancelRejected { resource, .. }
            | Self::UnexpectedState { resource, .. }
            | Self::NotFound { resource, .. } => resource,
        }
    }
}
