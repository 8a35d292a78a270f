//! Testing utilities for loaders.
//!
//! This module provides:
//! - In-memory stores that record their calls
//! - A canned scenario of comments, users, a session and attachments

mod fixtures;
mod mocks;

pub use fixtures::{scenario_attachments, scenario_comments, scenario_users, TestStores};
pub use mocks::{
    CommentReply, InMemoryAttachmentStore, InMemoryUserStore, ScriptedCommentStore,
    StaticSessionStore,
};
