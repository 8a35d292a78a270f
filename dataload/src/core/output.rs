//! Per-stage output payloads.

use super::{Attachment, Comment, CommentId, Session, StageName, User, UserId};
use std::collections::HashMap;

/// The value a stage hands to its dependents and to the assembler.
///
/// Written once by the stage's own task and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutput {
    /// Output of the comments stage.
    Comments(Vec<Comment>),
    /// Output of the session stage.
    Session(Option<Session>),
    /// Output of the users stage, keyed by user id.
    Users(HashMap<UserId, User>),
    /// Output of the attachments stage, grouped by owning comment.
    Attachments(HashMap<CommentId, Vec<Attachment>>),
}

impl StageOutput {
    /// Returns the stage that produces this kind of output.
    #[must_use]
    pub fn stage(&self) -> StageName {
        match self {
            Self::Comments(_) => StageName::Comments,
            Self::Session(_) => StageName::Session,
            Self::Users(_) => StageName::Users,
            Self::Attachments(_) => StageName::Attachments,
        }
    }

    /// Returns the comments, if this is a comments output.
    #[must_use]
    pub fn as_comments(&self) -> Option<&[Comment]> {
        match self {
            Self::Comments(comments) => Some(comments),
            _ => None,
        }
    }

    /// Returns the session, if this is a session output carrying one.
    #[must_use]
    pub fn as_session(&self) -> Option<&Session> {
        match self {
            Self::Session(session) => session.as_ref(),
            _ => None,
        }
    }

    /// Number of entries, for diagnostics.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Comments(comments) => comments.len(),
            Self::Session(session) => usize::from(session.is_some()),
            Self::Users(users) => users.len(),
            Self::Attachments(groups) => groups.values().map(Vec::len).sum(),
        }
    }

    /// Returns true if the output carries no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_stage() {
        assert_eq!(StageOutput::Comments(Vec::new()).stage(), StageName::Comments);
        assert_eq!(StageOutput::Session(None).stage(), StageName::Session);
    }

    #[test]
    fn test_output_len_counts_grouped_attachments() {
        let mut groups = HashMap::new();
        groups.insert(
            CommentId(1),
            vec![
                Attachment::new(crate::core::AttachmentId(1), CommentId(1), ""),
                Attachment::new(crate::core::AttachmentId(2), CommentId(1), ""),
            ],
        );
        let output = StageOutput::Attachments(groups);
        assert_eq!(output.len(), 2);
        assert!(!output.is_empty());
        assert!(StageOutput::Session(None).is_empty());
    }
}
