//! Newtypes shared by the poller and the lifecycle controller.

use std::fmt;
use std::ops::Deref;

/// Identity of the remote resource being observed, used in logs and errors.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ResourceId(String);

impl ResourceId {
    /// Wraps a provider specific identifier.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<String> for ResourceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ResourceId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl AsRef<str> for ResourceId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Deref for ResourceId {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Last label seen by a polling run, rendered as `none` before the first
/// observation completes.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LastObserved(Option<String>);

impl LastObserved {
    /// Captures the display form of an observed label.
    #[must_use]
    pub fn label(value: &impl fmt::Display) -> Self {
        Self(Some(value.to_string()))
    }

    /// Marker for runs that stopped before any observation completed.
    #[must_use]
    pub const fn nothing() -> Self {
        Self(None)
    }

    /// Returns the captured label, if any.
    #[must_use]
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl fmt::Display for LastObserved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_deref().unwrap_or("none"))
    }
}
