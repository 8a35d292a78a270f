//! Collaborator stores the loader reads from.
//!
//! Each store exposes a single operation. Only the comment store can fail;
//! the user and attachment lookups are best-effort and simply omit ids they
//! cannot resolve. The session lookup is local and synchronous.

use crate::context::LoadContext;
use crate::core::{Attachment, Comment, CommentId, Session, User, UserId};
use crate::errors::StoreError;
use async_trait::async_trait;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

/// Source of comments.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommentStore: Send + Sync {
    /// Fetches the comment list.
    async fn fetch_comments(&self, ctx: &LoadContext) -> Result<Vec<Comment>, StoreError>;
}

/// Batch user lookup.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fetches the users with the given ids. Unknown ids are absent.
    async fn fetch_users_by_ids(&self, ctx: &LoadContext, ids: &[UserId]) -> Vec<User>;
}

/// Access to the current session.
#[cfg_attr(test, automock)]
pub trait SessionStore: Send + Sync {
    /// Returns the current session, if any.
    fn fetch_current_session(&self) -> Option<Session>;
}

/// Batch attachment lookup.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    /// Fetches the attachments of the given comments, in store order.
    async fn fetch_attachments_by_comment_ids(
        &self,
        ctx: &LoadContext,
        ids: &[CommentId],
    ) -> Vec<Attachment>;
}

/// The four collaborators a loader needs.
#[derive(Clone)]
pub struct Stores {
    /// Comment source.
    pub comments: Arc<dyn CommentStore>,
    /// User lookup.
    pub users: Arc<dyn UserStore>,
    /// Session access.
    pub session: Arc<dyn SessionStore>,
    /// Attachment lookup.
    pub attachments: Arc<dyn AttachmentStore>,
}

impl Stores {
    /// Bundles the four stores.
    pub fn new(
        comments: Arc<dyn CommentStore>,
        users: Arc<dyn UserStore>,
        session: Arc<dyn SessionStore>,
        attachments: Arc<dyn AttachmentStore>,
    ) -> Self {
        Self {
            comments,
            users,
            session,
            attachments,
        }
    }
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}
