//! Test fixtures for loader testing.

use std::sync::Arc;

use super::mocks::{
    InMemoryAttachmentStore, InMemoryUserStore, ScriptedCommentStore, StaticSessionStore,
};
use crate::core::{Attachment, AttachmentId, Comment, CommentId, Session, User, UserId};
use crate::stores::Stores;

/// A set of in-memory stores, kept concrete so tests can inspect calls.
#[derive(Debug, Clone)]
pub struct TestStores {
    /// Comment source.
    pub comments: Arc<ScriptedCommentStore>,
    /// User lookup.
    pub users: Arc<InMemoryUserStore>,
    /// Session access.
    pub session: Arc<StaticSessionStore>,
    /// Attachment lookup.
    pub attachments: Arc<InMemoryAttachmentStore>,
}

impl TestStores {
    /// Bundles the given stores.
    #[must_use]
    pub fn new(
        comments: ScriptedCommentStore,
        users: InMemoryUserStore,
        session: StaticSessionStore,
        attachments: InMemoryAttachmentStore,
    ) -> Self {
        Self {
            comments: Arc::new(comments),
            users: Arc::new(users),
            session: Arc::new(session),
            attachments: Arc::new(attachments),
        }
    }

    /// Two comments by different authors, session `s1`, and one attachment
    /// per comment.
    #[must_use]
    pub fn scenario() -> Self {
        Self::with_comments(ScriptedCommentStore::new(scenario_comments()))
    }

    /// The scenario's users, session and attachments around a custom
    /// comment store.
    #[must_use]
    pub fn with_comments(comments: ScriptedCommentStore) -> Self {
        Self::new(
            comments,
            InMemoryUserStore::new(scenario_users()),
            StaticSessionStore::new(Some(Session::new(UserId(101), "s1"))),
            InMemoryAttachmentStore::new(scenario_attachments()),
        )
    }

    /// Replaces the session store.
    #[must_use]
    pub fn with_session(mut self, session: Option<Session>) -> Self {
        self.session = Arc::new(StaticSessionStore::new(session));
        self
    }

    /// Replaces the user store.
    #[must_use]
    pub fn with_users(mut self, users: InMemoryUserStore) -> Self {
        self.users = Arc::new(users);
        self
    }

    /// Replaces the attachment store.
    #[must_use]
    pub fn with_attachments(mut self, attachments: InMemoryAttachmentStore) -> Self {
        self.attachments = Arc::new(attachments);
        self
    }

    /// Returns the stores as trait objects for a loader.
    #[must_use]
    pub fn stores(&self) -> Stores {
        Stores::new(
            self.comments.clone(),
            self.users.clone(),
            self.session.clone(),
            self.attachments.clone(),
        )
    }
}

/// Comments 1 and 2, by users 101 and 102.
#[must_use]
pub fn scenario_comments() -> Vec<Comment> {
    vec![
        Comment::new(CommentId(1), UserId(101), "first!"),
        Comment::new(CommentId(2), UserId(102), "nice post"),
    ]
}

/// Users 101 and 102.
#[must_use]
pub fn scenario_users() -> Vec<User> {
    vec![User::new(UserId(101), "ada"), User::new(UserId(102), "grace")]
}

/// Attachment 1001 on comment 1 and 1002 on comment 2.
#[must_use]
pub fn scenario_attachments() -> Vec<Attachment> {
    vec![
        Attachment::new(AttachmentId(1001), CommentId(1), "data:text/plain,A1001"),
        Attachment::new(AttachmentId(1002), CommentId(2), "data:text/plain,A1002"),
    ]
}
