//! Absolute deadlines that can also be aborted by the enclosing operation.

use std::time::Duration;

use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

/// Stand-in expiry for timeouts too large to represent as an instant.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Point in time after which a polling run must stop issuing remote calls.
///
/// A deadline may carry a [`CancellationToken`] owned by the enclosing
/// request; cancelling it wakes any pending wait immediately.
#[derive(Clone, Debug)]
pub struct Deadline {
    at: Instant,
    token: Option<CancellationToken>,
}

/// Why a wait ended before its wake-up instant.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Interruption {
    Expired,
    Canceled,
}

impl Deadline {
    /// Deadline at an absolute instant.
    #[must_use]
    pub const fn at(at: Instant) -> Self {
        Self { at, token: None }
    }

    /// Deadline `timeout` from now. Timeouts past the clock's range expire
    /// in the far future instead.
    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        let now = Instant::now();
        let at = now
            .checked_add(timeout)
            .or_else(|| now.checked_add(FAR_FUTURE))
            .unwrap_or(now);
        Self::at(at)
    }

    /// Ties the deadline to an external cancellation signal.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Instant at which the deadline expires.
    #[must_use]
    pub const fn instant(&self) -> Instant {
        self.at
    }

    /// Time left before expiry, zero once expired.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// True once the deadline instant has been reached.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// True when the attached cancellation token has fired.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.token
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    /// Waits until `wake`, returning early when the deadline expires or the
    /// token fires. Expiry wins a tie with `wake`.
    async fn sleep_until(&self, wake: Instant) -> Result<(), Interruption> {
        tokio::select! {
            biased;
            () = self.canceled() => Err(Interruption::Canceled),
            () = sleep_until(self.at) => Err(Interruption::Expired),
            () = sleep_until(wake) => Ok(()),
        }
    }

    /// Waits until `period` has elapsed since `start`. A period past the
    /// clock's range waits for the deadline.
    pub(crate) async fn sleep_after(
        &self,
        start: Instant,
        period: Duration,
    ) -> Result<(), Interruption> {
        let wake = start.checked_add(period).unwrap_or(self.at);
        self.sleep_until(wake).await
    }

    /// Drives `work` to completion unless the deadline expires or the token
    /// fires first, in which case `work` is dropped.
    pub(crate) async fn race<F: Future>(&self, work: F) -> Result<F::Output, Interruption> {
        tokio::select! {
            biased;
            () = self.canceled() => Err(Interruption::Canceled),
            () = sleep_until(self.at) => Err(Interruption::Expired),
            output = work => Ok(output),
        }
    }

    async fn canceled(&self) {
        match &self.token {
            Some(token) => token.cancelled().await,
            None => std::future::pending().await,
        }
    }
}
