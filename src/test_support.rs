//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::future::{Ready, ready};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tokio::time::Instant;

use crate::poll::Observation;

/// Error produced by the scripted doubles.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ScriptedError {
    /// A failure queued by the test.
    #[error("scripted failure: {0}")]
    Failure(String),
    /// The refresh script ran out of steps and has no repeating step.
    #[error("refresh script exhausted")]
    Exhausted,
}

type Step<T, L> = Result<Observation<T, L>, ScriptedError>;

#[derive(Debug)]
struct Script<T, L> {
    steps: VecDeque<Step<T, L>>,
    repeat: Option<Step<T, L>>,
    calls: Vec<Instant>,
}

/// Refresh double that returns pre-seeded observations in FIFO order and
/// records when each call happened.
///
/// Once the queue drains, the repeating step (if any) is returned forever.
#[derive(Debug)]
pub struct ScriptedRefresh<T, L> {
    script: Arc<Mutex<Script<T, L>>>,
}

impl<T, L> Clone for ScriptedRefresh<T, L> {
    fn clone(&self) -> Self {
        Self {
            script: Arc::clone(&self.script),
        }
    }
}

impl<T, L> Default for ScriptedRefresh<T, L> {
    fn default() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                steps: VecDeque::new(),
                repeat: None,
                calls: Vec::new(),
            })),
        }
    }
}

impl<T: Clone, L: Clone> ScriptedRefresh<T, L> {
    /// Creates a refresh double with no queued observations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an observation of an existing resource.
    pub fn push_found(&self, payload: T, label: L) {
        self.push(Ok(Observation::found(payload, label)));
    }

    /// Queues a not-found observation.
    pub fn push_absent(&self, label: L) {
        self.push(Ok(Observation::absent(label)));
    }

    /// Queues a refresh failure.
    pub fn push_failure(&self, message: &str) {
        self.push(Err(ScriptedError::Failure(message.to_owned())));
    }

    /// Returns this observation for every call after the queue drains.
    pub fn repeat_found(&self, payload: T, label: L) {
        self.lock().repeat = Some(Ok(Observation::found(payload, label)));
    }

    /// Performs one scripted read.
    ///
    /// # Errors
    ///
    /// Returns the queued failure, or [`ScriptedError::Exhausted`] when
    /// nothing is left to return.
    pub fn observe(&self) -> Result<Observation<T, L>, ScriptedError> {
        let mut script = self.lock();
        script.calls.push(Instant::now());
        match script.steps.pop_front() {
            Some(step) => step,
            None => script.repeat.clone().unwrap_or(Err(ScriptedError::Exhausted)),
        }
    }

    /// Returns a refresh capability backed by this script.
    pub fn refresh_fn(
        &self,
    ) -> impl FnMut() -> Ready<Result<Observation<T, L>, ScriptedError>> + use<T, L> {
        let script = self.clone();
        move || ready(script.observe())
    }

    /// Instants at which refreshes were issued.
    #[must_use]
    pub fn calls(&self) -> Vec<Instant> {
        self.lock().calls.clone()
    }

    /// Number of refreshes issued so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    fn push(&self, step: Step<T, L>) {
        self.lock().steps.push_back(step);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script<T, L>> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cancel double that returns a fixed outcome and counts invocations.
#[derive(Clone, Debug)]
pub struct ScriptedCancel {
    outcome: Result<(), ScriptedError>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedCancel {
    /// Cancel double whose request is accepted.
    #[must_use]
    pub fn accepting() -> Self {
        Self {
            outcome: Ok(()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Cancel double whose request is rejected with `message`.
    #[must_use]
    pub fn rejecting(message: &str) -> Self {
        Self {
            outcome: Err(ScriptedError::Failure(message.to_owned())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns a cancel capability backed by this double.
    pub fn cancel_fn(&self) -> impl FnOnce() -> Ready<Result<(), ScriptedError>> + use<> {
        let outcome = self.outcome.clone();
        let calls = Arc::clone(&self.calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            ready(outcome)
        }
    }

    /// Number of cancel requests issued so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: AsyncMutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
