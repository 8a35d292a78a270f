//! The four stages of a comments load and their skip predicates.

use super::{Stage, StageInputs};
use crate::context::LoadContext;
use crate::core::{StageName, StageOutput};
use crate::errors::LoadError;
use crate::pipeline::{distinct_user_ids, group_attachments, index_users};
use crate::stores::{AttachmentStore, CommentStore, SessionStore, UserStore};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Skips the users lookup when there are no comments to resolve authors for.
pub fn skip_users(inputs: &StageInputs) -> Option<String> {
    inputs
        .comments()
        .is_empty()
        .then(|| "no comments loaded".to_string())
}

/// Skips the attachments lookup without a session id or without comments.
pub fn skip_attachments(inputs: &StageInputs) -> Option<String> {
    if !inputs.session().is_some_and(|session| session.has_id()) {
        return Some("no session id".to_string());
    }
    if inputs.comments().is_empty() {
        return Some("no comments loaded".to_string());
    }
    None
}

/// Loads the comment list.
#[derive(Clone)]
pub struct CommentsStage {
    store: Arc<dyn CommentStore>,
}

impl CommentsStage {
    /// Creates the stage over a comment store.
    pub fn new(store: Arc<dyn CommentStore>) -> Self {
        Self { store }
    }
}

impl fmt::Debug for CommentsStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommentsStage").finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for CommentsStage {
    fn name(&self) -> StageName {
        StageName::Comments
    }

    async fn run(&self, ctx: &LoadContext, _inputs: &StageInputs) -> Result<StageOutput, LoadError> {
        let comments = self
            .store
            .fetch_comments(ctx)
            .await
            .map_err(|err| LoadError::store(StageName::Comments, err))?;
        Ok(StageOutput::Comments(comments))
    }
}

/// Reads the current session.
#[derive(Clone)]
pub struct SessionStage {
    store: Arc<dyn SessionStore>,
}

impl SessionStage {
    /// Creates the stage over a session store.
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }
}

impl fmt::Debug for SessionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStage").finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for SessionStage {
    fn name(&self) -> StageName {
        StageName::Session
    }

    async fn run(&self, _ctx: &LoadContext, _inputs: &StageInputs) -> Result<StageOutput, LoadError> {
        Ok(StageOutput::Session(self.store.fetch_current_session()))
    }
}

/// Resolves the distinct authors of the loaded comments.
#[derive(Clone)]
pub struct UsersStage {
    store: Arc<dyn UserStore>,
}

impl UsersStage {
    /// Creates the stage over a user store.
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }
}

impl fmt::Debug for UsersStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsersStage").finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for UsersStage {
    fn name(&self) -> StageName {
        StageName::Users
    }

    async fn run(&self, ctx: &LoadContext, inputs: &StageInputs) -> Result<StageOutput, LoadError> {
        let ids = distinct_user_ids(inputs.comments());
        let users = self.store.fetch_users_by_ids(ctx, &ids).await;
        Ok(StageOutput::Users(index_users(users)))
    }
}

/// Loads the attachments of the loaded comments.
#[derive(Clone)]
pub struct AttachmentsStage {
    store: Arc<dyn AttachmentStore>,
}

impl AttachmentsStage {
    /// Creates the stage over an attachment store.
    pub fn new(store: Arc<dyn AttachmentStore>) -> Self {
        Self { store }
    }
}

impl fmt::Debug for AttachmentsStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttachmentsStage").finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for AttachmentsStage {
    fn name(&self) -> StageName {
        StageName::Attachments
    }

    async fn run(&self, ctx: &LoadContext, inputs: &StageInputs) -> Result<StageOutput, LoadError> {
        let ids: Vec<_> = inputs.comments().iter().map(|comment| comment.id).collect();
        let attachments = self.store.fetch_attachments_by_comment_ids(ctx, &ids).await;
        Ok(StageOutput::Attachments(group_attachments(attachments)))
    }
}
