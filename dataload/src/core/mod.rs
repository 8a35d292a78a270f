//! Core domain model types for dataload.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Entities returned by the backing stores
//! - Stage names and lifecycle states
//! - Per-stage outputs

mod models;
mod output;
mod status;

pub use models::{
    Attachment, AttachmentId, Comment, CommentId, Session, SessionId, User, UserId,
};
pub use output::StageOutput;
pub use status::{StageName, StageState};
