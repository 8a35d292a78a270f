//! Cancellation and deadline scope for a load.

use crate::cancellation::CancellationToken;
use crate::errors::LoadError;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Reason reported when a context's deadline passes.
pub const DEADLINE_EXCEEDED: &str = "deadline exceeded";

/// A cancellation/deadline scope.
///
/// Cloning is cheap; clones observe the same tokens. A child scope created
/// with [`LoadContext::child`] is done when its parent is done or when its
/// own token fires, whichever comes first.
#[derive(Debug, Clone, Default)]
pub struct LoadContext {
    /// Tokens from this scope and every ancestor, outermost first.
    tokens: Vec<Arc<CancellationToken>>,
    /// The earliest deadline of this scope and its ancestors.
    deadline: Option<Instant>,
}

impl LoadContext {
    /// Creates a context that is never cancelled and has no deadline.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// Creates a context observing an existing token.
    #[must_use]
    pub fn with_token(token: Arc<CancellationToken>) -> Self {
        Self {
            tokens: vec![token],
            deadline: None,
        }
    }

    /// Creates a cancellable context and returns the token that cancels it.
    #[must_use]
    pub fn cancellable() -> (Self, Arc<CancellationToken>) {
        Self::background().child()
    }

    /// Derives a child scope with its own cancellation token.
    #[must_use]
    pub fn child(&self) -> (Self, Arc<CancellationToken>) {
        let token = Arc::new(CancellationToken::new());
        let mut tokens = self.tokens.clone();
        tokens.push(token.clone());
        (
            Self {
                tokens,
                deadline: self.deadline,
            },
            token,
        )
    }

    /// Sets a deadline `timeout` from now, keeping an earlier inherited one.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Sets a deadline, keeping an earlier inherited one.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Returns the effective deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the time left until the deadline, if any.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Returns true if any token in scope fired or the deadline passed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.err().is_some()
    }

    /// Returns the cancellation error, if the context is done.
    ///
    /// Token cancellation is reported before deadline expiry, outermost
    /// scope first.
    #[must_use]
    pub fn err(&self) -> Option<LoadError> {
        if let Some(token) = self.tokens.iter().find(|token| token.is_cancelled()) {
            let reason = token.reason().unwrap_or_else(|| "cancelled".to_string());
            return Some(LoadError::cancelled(reason));
        }

        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                Some(LoadError::cancelled(DEADLINE_EXCEEDED))
            }
            _ => None,
        }
    }

    /// Completes once the context is cancelled or its deadline passes.
    pub async fn done(&self) {
        let cancelled = async {
            if self.tokens.is_empty() {
                futures::future::pending::<()>().await;
            } else {
                futures::future::select_all(
                    self.tokens.iter().map(|token| Box::pin(token.cancelled())),
                )
                .await;
            }
        };

        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    () = cancelled => {}
                    () = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => cancelled.await,
        }
    }
}
