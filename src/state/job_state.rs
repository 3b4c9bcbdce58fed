/// Job status definitions for tracking a mirror job from start to finish
///
/// This module defines the states a job moves through and which moves are legal.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the current status of a mirror job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    // ===== Active States =====
    /// Job was accepted and its task has not started fetching yet
    Starting,

    /// Pages are being fetched with the static byte-level strategy
    Downloading,

    /// Pages are being rendered in the headless browser
    Rendering,

    /// Traversal finished and the working directory is being packaged
    Archiving,

    // ===== Terminal States =====
    /// Archive is ready
    Completed,

    /// Job failed with a job-fatal error
    Error,

    /// Job was cancelled before producing an archive
    Cancelled,
}

impl JobStatus {
    /// Returns true if this is a terminal state (no further transitions)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Cancelled)
    }

    /// Returns true if the job is still making progress
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true while pages are being fetched
    pub fn is_traversing(&self) -> bool {
        matches!(self, Self::Downloading | Self::Rendering)
    }

    /// The traversal status used for a job, chosen once from its render flag
    pub fn traversal(render_javascript: bool) -> Self {
        if render_javascript {
            Self::Rendering
        } else {
            Self::Downloading
        }
    }

    /// Returns true if moving from `self` to `next` is allowed
    ///
    /// `Starting -> Downloading|Rendering -> Archiving -> Completed`, with
    /// `Error` and `Cancelled` reachable from any non-terminal state.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }

        match next {
            Self::Error | Self::Cancelled => true,
            Self::Downloading | Self::Rendering => *self == Self::Starting,
            Self::Archiving => self.is_traversing(),
            Self::Completed => *self == Self::Archiving,
            Self::Starting => false,
        }
    }

    /// Converts the status to its wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Downloading => "downloading",
            Self::Rendering => "rendering",
            Self::Archiving => "archiving",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns all possible job states
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Starting,
            Self::Downloading,
            Self::Rendering,
            Self::Archiving,
            Self::Completed,
            Self::Error,
            Self::Cancelled,
        ]
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
