//! Folds stage outputs into the loader's result.

use super::graph::GraphExecutionResult;
use crate::core::{Attachment, Comment, CommentId, Session, StageName, StageOutput, User, UserId};
use crate::errors::LoadError;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// The result of a successful load.
///
/// `users` and `attachments` are absent when their stage was skipped, which
/// is distinct from present-but-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadedData {
    comments: Vec<Comment>,
    users: Option<HashMap<UserId, User>>,
    attachments: Option<HashMap<CommentId, Vec<Attachment>>>,
    session: Option<Session>,
}

impl LoadedData {
    pub(crate) fn new(
        comments: Vec<Comment>,
        users: Option<HashMap<UserId, User>>,
        attachments: Option<HashMap<CommentId, Vec<Attachment>>>,
        session: Option<Session>,
    ) -> Self {
        Self {
            comments,
            users,
            attachments,
            session,
        }
    }

    /// Comments in the order the store returned them.
    #[must_use]
    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    /// Authors keyed by id, or `None` if the users stage was skipped.
    ///
    /// Ids the user store did not return are absent from the map.
    #[must_use]
    pub fn users(&self) -> Option<&HashMap<UserId, User>> {
        self.users.as_ref()
    }

    /// Looks up the author of a comment.
    #[must_use]
    pub fn author(&self, comment: &Comment) -> Option<&User> {
        self.users.as_ref()?.get(&comment.user_id)
    }

    /// Attachments grouped by comment, or `None` if the stage was skipped.
    #[must_use]
    pub fn attachments(&self) -> Option<&HashMap<CommentId, Vec<Attachment>>> {
        self.attachments.as_ref()
    }

    /// Attachments of one comment; empty when there are none or the stage
    /// was skipped.
    #[must_use]
    pub fn attachments_for(&self, comment: CommentId) -> &[Attachment] {
        self.attachments
            .as_ref()
            .and_then(|groups| groups.get(&comment))
            .map_or(&[], Vec::as_slice)
    }

    /// The session observed during the load.
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }
}

/// Distinct author ids of `comments`, in first-seen order.
#[must_use]
pub fn distinct_user_ids(comments: &[Comment]) -> Vec<UserId> {
    let mut seen = HashSet::with_capacity(comments.len());
    comments
        .iter()
        .map(|comment| comment.user_id)
        .filter(|id| seen.insert(*id))
        .collect()
}

/// Indexes users by id. A later duplicate replaces an earlier one.
#[must_use]
pub fn index_users(users: Vec<User>) -> HashMap<UserId, User> {
    users.into_iter().map(|user| (user.id, user)).collect()
}

/// Groups attachments by comment, keeping the store's order within a group.
#[must_use]
pub fn group_attachments(attachments: Vec<Attachment>) -> HashMap<CommentId, Vec<Attachment>> {
    let mut groups: HashMap<CommentId, Vec<Attachment>> = HashMap::new();
    for attachment in attachments {
        groups.entry(attachment.comment_id).or_default().push(attachment);
    }
    groups
}

/// Builds the load result from a completed graph execution.
///
/// # Errors
///
/// Returns [`LoadError::Internal`] if a stage did not finish `Done` or
/// `Skipped`, or if a finished stage's output has the wrong shape.
pub fn assemble(mut result: GraphExecutionResult) -> Result<LoadedData, LoadError> {
    for stage in StageName::ALL {
        let state = result.state(stage);
        if !state.is_satisfied() {
            return Err(LoadError::Internal(format!(
                "cannot assemble result: {stage} stage ended {state}"
            )));
        }
    }

    let comments = match take(&mut result, StageName::Comments) {
        Some(StageOutput::Comments(comments)) => comments,
        None => Vec::new(),
        Some(other) => return Err(mismatch(StageName::Comments, &other)),
    };

    let session = match take(&mut result, StageName::Session) {
        Some(StageOutput::Session(session)) => session,
        None => None,
        Some(other) => return Err(mismatch(StageName::Session, &other)),
    };

    let users = match take(&mut result, StageName::Users) {
        Some(StageOutput::Users(users)) => Some(users),
        None => None,
        Some(other) => return Err(mismatch(StageName::Users, &other)),
    };

    let attachments = match take(&mut result, StageName::Attachments) {
        Some(StageOutput::Attachments(groups)) => Some(groups),
        None => None,
        Some(other) => return Err(mismatch(StageName::Attachments, &other)),
    };

    Ok(LoadedData::new(comments, users, attachments, session))
}

fn take(result: &mut GraphExecutionResult, stage: StageName) -> Option<StageOutput> {
    result
        .outputs
        .remove(&stage)
        .map(|output| Arc::try_unwrap(output).unwrap_or_else(|shared| (*shared).clone()))
}

fn mismatch(stage: StageName, output: &StageOutput) -> LoadError {
    LoadError::Internal(format!(
        "{stage} stage produced {} output",
        output.stage()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AttachmentId, StageState};
    use pretty_assertions::assert_eq;

    fn comments() -> Vec<Comment> {
        vec![
            Comment::new(CommentId(1), UserId(101), "first"),
            Comment::new(CommentId(2), UserId(102), "second"),
            Comment::new(CommentId(3), UserId(101), "third"),
        ]
    }

    fn execution(
        states: [(StageName, StageState); 4],
        outputs: Vec<StageOutput>,
    ) -> GraphExecutionResult {
        GraphExecutionResult {
            states: states.into_iter().collect(),
            outputs: outputs
                .into_iter()
                .map(|output| (output.stage(), Arc::new(output)))
                .collect(),
            duration_ms: 1.0,
        }
    }

    #[test]
    fn test_distinct_user_ids_first_seen_order() {
        assert_eq!(distinct_user_ids(&comments()), vec![UserId(101), UserId(102)]);
        assert!(distinct_user_ids(&[]).is_empty());
    }

    #[test]
    fn test_group_attachments_keeps_order() {
        let groups = group_attachments(vec![
            Attachment::new(AttachmentId(1001), CommentId(1), "a"),
            Attachment::new(AttachmentId(1002), CommentId(2), "b"),
            Attachment::new(AttachmentId(1003), CommentId(1), "c"),
        ]);

        let ids: Vec<_> = groups[&CommentId(1)].iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![AttachmentId(1001), AttachmentId(1003)]);
        assert_eq!(groups[&CommentId(2)].len(), 1);
    }

    #[test]
    fn test_assemble_full_result() {
        let users = index_users(vec![User::new(UserId(101), "ada")]);
        let result = execution(
            [
                (StageName::Comments, StageState::Done),
                (StageName::Session, StageState::Done),
                (StageName::Users, StageState::Done),
                (StageName::Attachments, StageState::Done),
            ],
            vec![
                StageOutput::Comments(comments()),
                StageOutput::Session(Some(Session::new(UserId(101), "s1"))),
                StageOutput::Users(users.clone()),
                StageOutput::Attachments(HashMap::new()),
            ],
        );

        let data = assemble(result).unwrap();
        assert_eq!(data.comments(), comments().as_slice());
        assert_eq!(data.users(), Some(&users));
        assert_eq!(data.author(&data.comments()[1]), None);
        assert_eq!(data.attachments().map(HashMap::len), Some(0));
        assert!(data.attachments_for(CommentId(1)).is_empty());
        assert_eq!(data.session().map(|s| s.session_id.as_str()), Some("s1"));
    }

    #[test]
    fn test_assemble_skipped_stages_are_absent() {
        let result = execution(
            [
                (StageName::Comments, StageState::Done),
                (StageName::Session, StageState::Done),
                (StageName::Users, StageState::Skipped),
                (StageName::Attachments, StageState::Skipped),
            ],
            vec![StageOutput::Comments(Vec::new()), StageOutput::Session(None)],
        );

        let data = assemble(result).unwrap();
        assert!(data.comments().is_empty());
        assert!(data.users().is_none());
        assert!(data.attachments().is_none());
        assert!(data.session().is_none());
    }

    #[test]
    fn test_assemble_rejects_unfinished_stage() {
        let result = execution(
            [
                (StageName::Comments, StageState::Done),
                (StageName::Session, StageState::Done),
                (StageName::Users, StageState::Aborted),
                (StageName::Attachments, StageState::Skipped),
            ],
            vec![StageOutput::Comments(comments()), StageOutput::Session(None)],
        );

        let err = assemble(result).unwrap_err();
        assert!(err.to_string().contains("users stage ended aborted"));
    }
}
