//! Stage names and lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The stages that make up a comments load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    /// Fetches the comment list. Root stage.
    Comments,
    /// Fetches the current session. Root stage.
    Session,
    /// Fetches the authors of the comments.
    Users,
    /// Fetches the attachments of the comments.
    Attachments,
}

impl StageName {
    /// All stages, roots first.
    pub const ALL: [Self; 4] = [Self::Comments, Self::Session, Self::Users, Self::Attachments];

    /// Returns the stage name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Comments => "comments",
            Self::Session => "session",
            Self::Users => "users",
            Self::Attachments => "attachments",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The lifecycle state of a stage within one attempt.
///
/// `Pending -> Running -> {Done | Failed}`, or straight from `Pending` to
/// `Skipped` or `Aborted`. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    /// Waiting on dependencies or the start signal.
    #[default]
    Pending,
    /// The stage's work function is executing.
    Running,
    /// The work function returned successfully.
    Done,
    /// The work function returned an error or panicked.
    Failed,
    /// The skip predicate held; the work function was not invoked.
    Skipped,
    /// Cancelled, or a dependency did not complete; the work function was
    /// not invoked or its result was discarded.
    Aborted,
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

impl StageState {
    /// Returns true if the state is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Skipped | Self::Aborted)
    }

    /// Returns true if dependents may proceed past this stage.
    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Done | Self::Skipped)
    }

    /// Returns true if the stage did not complete.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Aborted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_name_display() {
        assert_eq!(StageName::Comments.to_string(), "comments");
        assert_eq!(StageName::Session.to_string(), "session");
        assert_eq!(StageName::Users.to_string(), "users");
        assert_eq!(StageName::Attachments.to_string(), "attachments");
    }

    #[test]
    fn test_stage_state_is_terminal() {
        assert!(StageState::Done.is_terminal());
        assert!(StageState::Skipped.is_terminal());
        assert!(StageState::Failed.is_terminal());
        assert!(StageState::Aborted.is_terminal());
        assert!(!StageState::Pending.is_terminal());
        assert!(!StageState::Running.is_terminal());
    }

    #[test]
    fn test_stage_state_satisfied() {
        assert!(StageState::Done.is_satisfied());
        assert!(StageState::Skipped.is_satisfied());
        assert!(!StageState::Aborted.is_satisfied());
        assert!(StageState::Aborted.is_failure());
    }

    #[test]
    fn test_stage_state_serialize() {
        let json = serde_json::to_string(&StageState::Aborted).unwrap();
        assert_eq!(json, r#""aborted""#);

        let deserialized: StageState = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, StageState::Aborted);
    }
}
