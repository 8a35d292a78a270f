//! Entities returned by the collaborator stores.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// Identifier of a comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentId(pub i64);

/// Identifier of an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttachmentId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for AttachmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a session. An empty string means "no session".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Creates a session id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns true if the id is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The caller's current session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// The user owning the session.
    pub user_id: UserId,
    /// The session identifier.
    pub session_id: SessionId,
}

impl Session {
    /// Creates a session.
    pub fn new(user_id: UserId, session_id: impl Into<String>) -> Self {
        Self {
            user_id,
            session_id: SessionId::new(session_id),
        }
    }

    /// Returns true if the session carries a non-empty identifier.
    #[must_use]
    pub fn has_id(&self) -> bool {
        !self.session_id.is_empty()
    }
}

/// A user referenced by a comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// The user id.
    pub id: UserId,
    /// Display name.
    #[serde(default)]
    pub name: String,
}

impl User {
    /// Creates a user.
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// A comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    /// The comment id.
    pub id: CommentId,
    /// The author.
    pub user_id: UserId,
    /// Comment body.
    #[serde(default)]
    pub text: String,
}

impl Comment {
    /// Creates a comment.
    pub fn new(id: CommentId, user_id: UserId, text: impl Into<String>) -> Self {
        Self {
            id,
            user_id,
            text: text.into(),
        }
    }
}

/// An attachment owned by a comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// The attachment id.
    pub id: AttachmentId,
    /// The owning comment.
    pub comment_id: CommentId,
    /// Where the attachment body lives.
    #[serde(default)]
    pub data_url: String,
}

impl Attachment {
    /// Creates an attachment.
    pub fn new(id: AttachmentId, comment_id: CommentId, data_url: impl Into<String>) -> Self {
        Self {
            id,
            comment_id,
            data_url: data_url.into(),
        }
    }
}
