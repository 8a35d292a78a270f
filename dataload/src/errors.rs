//! Error types for the dataload crate.
//!
//! Every failure a caller can observe from a load is a [`LoadError`], and each
//! value classifies into exactly one [`LoadErrorKind`].

use crate::core::StageName;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// The taxonomy a [`LoadError`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadErrorKind {
    /// A collaborator store returned an error.
    StoreFailure,
    /// A stage panicked and the panic was converted into an error.
    PanicDuringLoad,
    /// The caller's context was cancelled or its deadline passed.
    Cancelled,
    /// The retry budget has been consumed.
    AttemptsExhausted,
    /// The executor hit a state it should never reach.
    Internal,
}

impl fmt::Display for LoadErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StoreFailure => write!(f, "store_failure"),
            Self::PanicDuringLoad => write!(f, "panic_during_load"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::AttemptsExhausted => write!(f, "attempts_exhausted"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// The error type returned by [`crate::CommentsLoader::load`].
///
/// Cloneable so that a single attempt's error can be handed to every caller
/// that was waiting on it and cached for later callers.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// A store reported a failure; the message is kept verbatim.
    #[error("{stage} stage failed: {source}")]
    Store {
        /// The stage whose store failed.
        stage: StageName,
        /// The collaborator's error.
        #[source]
        source: StoreError,
    },

    /// A stage panicked.
    #[error("panic during load in {stage} stage: {message}")]
    PanicDuringLoad {
        /// The stage that panicked.
        stage: StageName,
        /// The panic payload rendered as text.
        message: String,
    },

    /// The load was cancelled before the attempt completed.
    #[error("load cancelled: {reason}")]
    Cancelled {
        /// Why the context was cancelled.
        reason: String,
    },

    /// No attempts remain; wraps the most recent failure.
    #[error("load attempts exhausted after {attempts} attempts: {last}")]
    AttemptsExhausted {
        /// How many attempts were made.
        attempts: u32,
        /// The error of the last attempt.
        last: Box<LoadError>,
    },

    /// An executor invariant was violated.
    #[error("internal error: {0}")]
    Internal(String),
}

impl LoadError {
    /// Creates a store failure for a stage.
    pub fn store(stage: StageName, source: impl Into<StoreError>) -> Self {
        Self::Store {
            stage,
            source: source.into(),
        }
    }

    /// Creates a converted panic for a stage.
    pub fn panic(stage: StageName, message: impl Into<String>) -> Self {
        Self::PanicDuringLoad {
            stage,
            message: message.into(),
        }
    }

    /// Creates a cancellation error.
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled {
            reason: reason.into(),
        }
    }

    /// Returns the taxonomy this error belongs to.
    #[must_use]
    pub fn kind(&self) -> LoadErrorKind {
        match self {
            Self::Store { .. } => LoadErrorKind::StoreFailure,
            Self::PanicDuringLoad { .. } => LoadErrorKind::PanicDuringLoad,
            Self::Cancelled { .. } => LoadErrorKind::Cancelled,
            Self::AttemptsExhausted { .. } => LoadErrorKind::AttemptsExhausted,
            Self::Internal(_) => LoadErrorKind::Internal,
        }
    }

    /// Returns the stage the error originated in, if it is stage-scoped.
    #[must_use]
    pub fn stage(&self) -> Option<StageName> {
        match self {
            Self::Store { stage, .. } | Self::PanicDuringLoad { stage, .. } => Some(*stage),
            Self::AttemptsExhausted { last, .. } => last.stage(),
            Self::Cancelled { .. } | Self::Internal(_) => None,
        }
    }

    /// Returns true if another call to `load` may start a fresh attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::AttemptsExhausted { .. })
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("kind".to_string(), serde_json::json!(self.kind()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        if let Some(stage) = self.stage() {
            map.insert("stage".to_string(), serde_json::json!(stage));
        }
        map
    }
}

/// An error returned by a collaborator store.
///
/// Holds the original `anyhow::Error` behind an `Arc` so the error survives
/// being cloned to several waiters and can still be downcast by the caller.
#[derive(Clone)]
pub struct StoreError(Arc<anyhow::Error>);

impl StoreError {
    /// Creates a store error from a message.
    pub fn msg(message: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
        Self(Arc::new(anyhow::Error::msg(message)))
    }

    /// Returns the wrapped error.
    #[must_use]
    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }

    /// Attempts to downcast the wrapped error to a concrete type.
    #[must_use]
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.0.downcast_ref::<E>()
    }
}

impl From<anyhow::Error> for StoreError {
    fn from(err: anyhow::Error) -> Self {
        Self(Arc::new(err))
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl fmt::Debug for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

/// Error raised when a stage graph is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphValidationError {
    /// The graph has no stages.
    #[error("stage graph is empty")]
    Empty,

    /// Two stages share a name.
    #[error("stage '{0}' is declared more than once")]
    DuplicateStage(StageName),

    /// A stage lists itself as a dependency.
    #[error("stage '{0}' cannot depend on itself")]
    SelfDependency(StageName),

    /// A stage depends on a stage that is not part of the graph.
    #[error("stage '{stage}' depends on '{dependency}' which is not in the graph")]
    UnknownDependency {
        /// The dependent stage.
        stage: StageName,
        /// The missing dependency.
        dependency: StageName,
    },

    /// The dependencies form a cycle.
    #[error("cycle detected between stages: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))]
    CycleDetected(Vec<StageName>),
}
