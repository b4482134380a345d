//! Cancel-then-delete controller for remediation tasks.
//!
//! Deleting a remediation while its compliance re-evaluation is still
//! running leaves an orphaned remote task behind. Before the caller issues
//! the delete, the controller cancels the evaluation when (and only when) it
//! is still queued or evaluating, then polls until the task reaches one of
//! its own terminal states.

mod state;

use tracing::{debug, info, warn};

use crate::error::ConvergeError;
use crate::poll::{self, Deadline, Observation, PollSpec, PollTiming};
use crate::types::ResourceId;

pub use state::{
    ControllerState, DiscoveryMode, ProvisioningState, RemediationState, UnknownDiscoveryMode,
};

/// Gates deletion of remediation tasks behind cancellation convergence.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CancelThenDelete {
    timing: PollTiming,
}

impl CancelThenDelete {
    /// Creates a controller that polls the cancellation with `timing`.
    #[must_use]
    pub const fn new(timing: PollTiming) -> Self {
        Self { timing }
    }

    /// Ensures the remediation described by `current` can be deleted.
    ///
    /// Returns [`ControllerState::Stable`] without touching the remote when
    /// no cancellation is needed. Otherwise calls `cancel` exactly once and
    /// polls `refresh` until the task leaves `Cancelling` for a terminal
    /// state, returning [`ControllerState::Converged`].
    ///
    /// # Errors
    ///
    /// - [`ConvergeError::Configuration`] when the deadline is already
    ///   expired; no cancel request is sent.
    /// - [`ConvergeError::CancelRejected`] when `cancel` fails.
    /// - Any poller error while waiting for the cancellation to converge.
    ///
    /// In every error case the caller must not delete the remediation.
    pub async fn ensure_safe_to_delete<T, E, C, CFut, F, Fut>(
        &self,
        current: &RemediationState,
        cancel: C,
        refresh: F,
        deadline: Deadline,
    ) -> Result<ControllerState, ConvergeError<E>>
    where
        C: FnOnce() -> CFut,
        CFut: Future<Output = Result<(), E>>,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Observation<T, ProvisioningState>, E>>,
    {
        let mut lifecycle = Lifecycle::start(current);
        if lifecycle.state == ControllerState::Stable {
            debug!(
                resource = %current.id,
                mode = %current.discovery_mode,
                state = %current.provisioning_state,
                "no running evaluation; delete may proceed"
            );
            return Ok(lifecycle.state);
        }

        if let Err(err) = poll::check_deadline(&current.id, &deadline) {
            lifecycle.advance(ControllerState::Failed);
            return Err(err);
        }

        info!(
            resource = %current.id,
            state = %current.provisioning_state,
            "cancelling running evaluation before delete"
        );
        if let Err(source) = cancel().await {
            lifecycle.advance(ControllerState::Failed);
            warn!(resource = %current.id, "cancel request rejected");
            return Err(ConvergeError::CancelRejected {
                resource: current.id.clone(),
                source,
            });
        }

        let spec = PollSpec::builder(current.id.clone())
            .pending([ProvisioningState::Cancelling])
            .target(ProvisioningState::TERMINAL)
            .timing(self.timing)
            .deadline(deadline)
            .build(refresh);
        match poll::run(spec).await {
            Ok(outcome) => {
                lifecycle.advance(ControllerState::Converged);
                info!(resource = %current.id, state = %outcome.label, "evaluation stopped");
                Ok(lifecycle.state)
            }
            Err(err) => {
                lifecycle.advance(ControllerState::Failed);
                Err(err)
            }
        }
    }
}

/// Runs [`CancelThenDelete::ensure_safe_to_delete`] with default timing.
///
/// # Errors
///
/// See [`CancelThenDelete::ensure_safe_to_delete`].
pub async fn ensure_safe_to_delete<T, E, C, CFut, F, Fut>(
    current: &RemediationState,
    cancel: C,
    refresh: F,
    deadline: Deadline,
) -> Result<ControllerState, ConvergeError<E>>
where
    C: FnOnce() -> CFut,
    CFut: Future<Output = Result<(), E>>,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Observation<T, ProvisioningState>, E>>,
{
    CancelThenDelete::default()
        .ensure_safe_to_delete(current, cancel, refresh, deadline)
        .await
}

/// Tracks workflow transitions for one invocation.
struct Lifecycle<'a> {
    resource: &'a ResourceId,
    state: ControllerState,
}

impl<'a> Lifecycle<'a> {
    const fn start(current: &'a RemediationState) -> Self {
        Self {
            resource: &current.id,
            state: current.initial_state(),
        }
    }

    fn advance(&mut self, next: ControllerState) {
        debug!(resource = %self.resource, from = %self.state, to = %next, "controller transition");
        self.state = next;
    }
}
