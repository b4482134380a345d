//! Presence labels for create and delete confirmation polling.

use std::fmt;

/// Whether a remote read found the resource.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Presence {
    /// The read returned the resource.
    Present,
    /// The read reported the resource as not found.
    Absent,
}

impl Presence {
    /// Classifies an optional read result.
    #[must_use]
    pub const fn of<T>(payload: Option<&T>) -> Self {
        if payload.is_some() {
            Self::Present
        } else {
            Self::Absent
        }
    }
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Present => "present",
            Self::Absent => "absent",
        })
    }
}
