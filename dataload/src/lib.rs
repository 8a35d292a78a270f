//! # Dataload
//!
//! A dependency-staged loader for comments and the data that hangs off them.
//!
//! A load runs four stages against pluggable stores:
//!
//! - **comments** and **session** start immediately and run in parallel
//! - **users** waits for comments and resolves their distinct authors
//! - **attachments** waits for comments and the session, and only runs when
//!   the session has an id
//!
//! The first stage failure (including a panic) cancels every other stage and
//! becomes the error of the load. A loader caches its first success, shares
//! one in-flight attempt between concurrent callers, and gives up after a
//! bounded number of failed attempts.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dataload::prelude::*;
//!
//! let loader = CommentsLoader::new(Stores::new(comments, users, session, attachments))?;
//! let data = loader.load(&LoadContext::background()).await?;
//!
//! for comment in data.comments() {
//!     let author = data.author(comment);
//!     let attachments = data.attachments_for(comment.id);
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod stages;
pub mod stores;
pub mod testing;

mod integration_tests;
mod loader;

pub use config::LoaderConfig;
pub use errors::{LoadError, LoadErrorKind};
pub use loader::{CommentsLoader, LoaderBuilder};
pub use pipeline::LoadedData;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::LoaderConfig;
    pub use crate::context::LoadContext;
    pub use crate::core::{
        Attachment, AttachmentId, Comment, CommentId, Session, SessionId, StageName, StageState,
        User, UserId,
    };
    pub use crate::errors::{LoadError, LoadErrorKind, StoreError};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::loader::{CommentsLoader, LoaderBuilder};
    pub use crate::observability::{init_tracing, TracingConfig};
    pub use crate::pipeline::{GateSnapshot, LoadedData};
    pub use crate::stores::{AttachmentStore, CommentStore, SessionStore, Stores, UserStore};
}
