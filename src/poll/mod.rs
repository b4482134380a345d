//! Stabilization poller.
//!
//! Drives a call-and-compare loop against a remote resource until the label
//! it reports enters a caller-defined target set, leaving a pending set,
//! before a deadline. The loop is generic over the label type so each caller
//! supplies its own closed set of states.

mod deadline;
mod presence;

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::ConvergeError;
use crate::types::{LastObserved, ResourceId};

pub use deadline::Deadline;
use deadline::Interruption;
pub use presence::Presence;

const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(10);

/// Timing knobs for a polling run, independent of its deadline.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollTiming {
    /// Minimum delay between the start of two consecutive refreshes.
    pub min_interval: Duration,
    /// Number of consecutive target observations required before success.
    pub continuous_target_occurrences: u32,
    /// Wait applied once before the first refresh.
    pub delay: Duration,
    /// Maximum number of consecutive pending observations without a payload.
    /// `None` disables the check.
    pub not_found_checks: Option<u32>,
}

impl Default for PollTiming {
    fn default() -> Self {
        Self {
            min_interval: DEFAULT_MIN_INTERVAL,
            continuous_target_occurrences: 1,
            delay: Duration::ZERO,
            not_found_checks: None,
        }
    }
}

/// Result of a single remote read.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Observation<T, L> {
    /// Resource representation returned by the read; `None` when the remote
    /// reported the resource as not found.
    pub payload: Option<T>,
    /// Classification of the read.
    pub label: L,
}

impl<T, L> Observation<T, L> {
    /// Observation of an existing resource.
    pub const fn found(payload: T, label: L) -> Self {
        Self {
            payload: Some(payload),
            label,
        }
    }

    /// Observation of a resource the remote reported as not found.
    pub const fn absent(label: L) -> Self {
        Self {
            payload: None,
            label,
        }
    }
}

/// Successful end of a polling run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PollOutcome<T, L> {
    /// Payload of the final observation.
    pub payload: Option<T>,
    /// Target label of the final observation.
    pub label: L,
    /// Number of refreshes issued.
    pub attempts: u32,
}

/// Configuration for one polling run. Built with [`PollSpec::builder`] and
/// consumed by [`run`].
pub struct PollSpec<L, F> {
    resource: ResourceId,
    pending: HashSet<L>,
    target: HashSet<L>,
    refresh: F,
    timing: PollTiming,
    deadline: Option<Deadline>,
}

impl<L: Eq + Hash> PollSpec<L, ()> {
    /// Starts a builder for a run against `resource`.
    #[must_use]
    pub fn builder(resource: impl Into<ResourceId>) -> PollSpecBuilder<L> {
        PollSpecBuilder {
            resource: resource.into(),
            pending: HashSet::new(),
            target: HashSet::new(),
            timing: PollTiming::default(),
            deadline: None,
        }
    }
}

impl PollSpec<Presence, ()> {
    /// Builder that succeeds once the resource reads as absent, for delete
    /// confirmation.
    #[must_use]
    pub fn until_absent(resource: impl Into<ResourceId>) -> PollSpecBuilder<Presence> {
        Self::builder(resource)
            .pending([Presence::Present])
            .target([Presence::Absent])
    }

    /// Builder that succeeds once the resource reads as present, for create
    /// confirmation against eventually consistent reads.
    #[must_use]
    pub fn until_present(resource: impl Into<ResourceId>) -> PollSpecBuilder<Presence> {
        Self::builder(resource)
            .pending([Presence::Absent])
            .target([Presence::Present])
    }
}

/// Builder for [`PollSpec`].
#[derive(Clone, Debug)]
pub struct PollSpecBuilder<L> {
    resource: ResourceId,
    pending: HashSet<L>,
    target: HashSet<L>,
    timing: PollTiming,
    deadline: Option<Deadline>,
}

impl<L: Eq + Hash> PollSpecBuilder<L> {
    /// Adds labels that mean "not converged yet".
    #[must_use]
    pub fn pending(mut self, labels: impl IntoIterator<Item = L>) -> Self {
        self.pending.extend(labels);
        self
    }

    /// Adds labels that mean "converged".
    #[must_use]
    pub fn target(mut self, labels: impl IntoIterator<Item = L>) -> Self {
        self.target.extend(labels);
        self
    }

    /// Replaces all timing knobs at once.
    #[must_use]
    pub const fn timing(mut self, timing: PollTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Sets the minimum delay between refreshes.
    #[must_use]
    pub const fn min_interval(mut self, value: Duration) -> Self {
        self.timing.min_interval = value;
        self
    }

    /// Sets how many consecutive target observations are required.
    #[must_use]
    pub const fn continuous_target_occurrences(mut self, value: u32) -> Self {
        self.timing.continuous_target_occurrences = value;
        self
    }

    /// Sets the wait applied before the first refresh.
    #[must_use]
    pub const fn delay(mut self, value: Duration) -> Self {
        self.timing.delay = value;
        self
    }

    /// Limits consecutive pending observations that carry no payload.
    #[must_use]
    pub const fn not_found_checks(mut self, value: Option<u32>) -> Self {
        self.timing.not_found_checks = value;
        self
    }

    /// Sets the deadline. A run without one fails with
    /// [`ConvergeError::Configuration`].
    #[must_use]
    pub fn deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Attaches the refresh capability and finishes the spec.
    pub fn build<F>(self, refresh: F) -> PollSpec<L, F> {
        PollSpec {
            resource: self.resource,
            pending: self.pending,
            target: self.target,
            refresh,
            timing: self.timing,
            deadline: self.deadline,
        }
    }
}

/// Polls `spec.refresh` until it reports a target label the required number
/// of consecutive times.
///
/// Refreshes run strictly one after another. Between refreshes the loop
/// waits until `min_interval` has elapsed since the previous refresh started,
/// waking early when the deadline expires or its cancellation token fires.
/// No refresh is issued once the deadline has passed.
///
/// # Errors
///
/// - [`ConvergeError::Configuration`] when the deadline is missing or already
///   expired, the target set is empty, or zero occurrences are requested.
/// - [`ConvergeError::RefreshFailed`] when the refresh capability errors.
/// - [`ConvergeError::UnexpectedState`] when a label is in neither set.
/// - [`ConvergeError::NotFound`] when the not-found budget is exhausted.
/// - [`ConvergeError::Timeout`] / [`ConvergeError::Canceled`] when the
///   deadline expires or is cancelled first.
pub async fn run<T, L, E, F, Fut>(
    spec: PollSpec<L, F>,
) -> Result<PollOutcome<T, L>, ConvergeError<E>>
where
    L: Eq + Hash + fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Observation<T, L>, E>>,
{
    let PollSpec {
        resource,
        pending,
        target,
        mut refresh,
        timing,
        deadline,
    } = spec;
    let watch = Watch::new(resource, pending, target, timing, deadline)?;
    debug!(
        resource = %watch.resource,
        remaining_secs = watch.deadline.remaining().as_secs(),
        "waiting for remote state"
    );

    if !watch.timing.delay.is_zero() {
        if let Err(why) = watch
            .deadline
            .sleep_after(Instant::now(), watch.timing.delay)
            .await
        {
            return Err(watch.interrupted(why, LastObserved::nothing()));
        }
    }

    let mut attempts = 0_u32;
    let mut consecutive = 0_u32;
    let mut absent = 0_u32;
    let mut last = LastObserved::nothing();

    loop {
        if watch.deadline.is_canceled() {
            return Err(watch.interrupted(Interruption::Canceled, last));
        }
        if watch.deadline.is_expired() {
            return Err(watch.interrupted(Interruption::Expired, last));
        }

        let started = Instant::now();
        attempts = attempts.saturating_add(1);
        let observation = match watch.deadline.race(refresh()).await {
            Ok(Ok(observation)) => observation,
            Ok(Err(source)) => {
                warn!(resource = %watch.resource, attempt = attempts, "refresh failed");
                return Err(ConvergeError::RefreshFailed {
                    resource: watch.resource,
                    last_label: last,
                    source,
                });
            }
            Err(why) => return Err(watch.interrupted(why, last)),
        };

        debug!(
            resource = %watch.resource,
            label = %observation.label,
            found = observation.payload.is_some(),
            attempt = attempts,
            "observed remote state"
        );

        match watch.classify(&observation.label) {
            Class::Target => {
                consecutive = consecutive.saturating_add(1);
                absent = 0;
                if consecutive >= watch.timing.continuous_target_occurrences {
                    info!(
                        resource = %watch.resource,
                        label = %observation.label,
                        attempts,
                        "remote state converged"
                    );
                    return Ok(PollOutcome {
                        payload: observation.payload,
                        label: observation.label,
                        attempts,
                    });
                }
            }
            Class::Pending => {
                consecutive = 0;
                if observation.payload.is_some() {
                    absent = 0;
                } else {
                    absent = absent.saturating_add(1);
                    if let Some(limit) = watch.timing.not_found_checks {
                        if absent > limit {
                            warn!(resource = %watch.resource, checks = absent, "resource not found");
                            return Err(ConvergeError::NotFound {
                                resource: watch.resource,
                                checks: absent,
                            });
                        }
                    }
                }
            }
            Class::Unexpected => return Err(watch.unexpected(&observation.label)),
        }

        last = LastObserved::label(&observation.label);
        if let Err(why) = watch
            .deadline
            .sleep_after(started, watch.timing.min_interval)
            .await
        {
            return Err(watch.interrupted(why, last));
        }
    }
}

enum Class {
    Pending,
    Target,
    Unexpected,
}

/// Validated state of a run that outlives the destructured spec.
struct Watch<L> {
    resource: ResourceId,
    pending: HashSet<L>,
    target: HashSet<L>,
    timing: PollTiming,
    deadline: Deadline,
}

impl<L: Eq + Hash + fmt::Display> Watch<L> {
    fn new<E>(
        resource: ResourceId,
        pending: HashSet<L>,
        target: HashSet<L>,
        timing: PollTiming,
        deadline: Option<Deadline>,
    ) -> Result<Self, ConvergeError<E>> {
        let configuration = |reason: &str| ConvergeError::Configuration {
            resource: resource.clone(),
            reason: reason.to_owned(),
        };

        let Some(deadline) = deadline else {
            return Err(configuration("no deadline was set"));
        };
        check_deadline(&resource, &deadline)?;
        if target.is_empty() {
            return Err(configuration("target state set is empty"));
        }
        if timing.continuous_target_occurrences == 0 {
            return Err(configuration(
                "continuous target occurrences must be at least 1",
            ));
        }

        Ok(Self {
            resource,
            pending,
            target,
            timing,
            deadline,
        })
    }

    fn classify(&self, label: &L) -> Class {
        if self.target.contains(label) {
            Class::Target
        } else if self.pending.contains(label) {
            Class::Pending
        } else {
            Class::Unexpected
        }
    }

    fn interrupted<E>(self, why: Interruption, last_label: LastObserved) -> ConvergeError<E> {
        match why {
            Interruption::Expired => {
                warn!(resource = %self.resource, last = %last_label, "timed out waiting for remote state");
                ConvergeError::Timeout {
                    target: render_labels(&self.target),
                    resource: self.resource,
                    last_label,
                }
            }
            Interruption::Canceled => {
                info!(resource = %self.resource, last = %last_label, "wait cancelled");
                ConvergeError::Canceled {
                    resource: self.resource,
                    last_label,
                }
            }
        }
    }

    fn unexpected<E>(self, label: &L) -> ConvergeError<E> {
        warn!(resource = %self.resource, label = %label, "unexpected remote state");
        ConvergeError::UnexpectedState {
            label: label.to_string(),
            pending: render_labels(&self.pending),
            target: render_labels(&self.target),
            resource: self.resource,
        }
    }
}

/// Rejects deadlines that leave no time to observe anything.
pub(crate) fn check_deadline<E>(
    resource: &ResourceId,
    deadline: &Deadline,
) -> Result<(), ConvergeError<E>> {
    if deadline.is_canceled() {
        return Err(ConvergeError::Canceled {
            resource: resource.clone(),
            last_label: LastObserved::nothing(),
        });
    }
    if deadline.is_expired() {
        return Err(ConvergeError::Configuration {
            resource: resource.clone(),
            reason: String::from("deadline has already passed"),
        });
    }
    Ok(())
}

/// Renders a label set in a stable order for error messages.
fn render_labels<L: fmt::Display>(labels: &HashSet<L>) -> String {
    let mut rendered = labels.iter().map(ToString::to_string).collect::<Vec<_>>();
    rendered.sort_unstable();
    rendered.join(", ")
}

#[cfg(test)]
mod tests;
