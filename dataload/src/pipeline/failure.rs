//! First-failure-wins aggregation and panic containment.

use crate::cancellation::CancellationToken;
use crate::core::StageName;
use crate::errors::LoadError;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock};
use tokio::task::JoinError;
use tracing::{debug, warn};

/// Record of the failure that ended an attempt.
#[derive(Debug, Clone)]
pub struct FailureRecord {
    /// The stage that failed.
    pub stage: StageName,
    /// The error it reported.
    pub error: LoadError,
    /// When the failure was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl FailureRecord {
    /// Creates a new failure record stamped with the current time.
    #[must_use]
    pub fn new(stage: StageName, error: LoadError) -> Self {
        Self {
            stage,
            error,
            recorded_at: Utc::now(),
        }
    }
}

/// Captures the first failure of an attempt and cancels the rest of it.
///
/// The slot is write-once: concurrent reporters race on a single set and
/// every loser is discarded.
#[derive(Debug)]
pub struct FailureAggregator {
    first: OnceLock<FailureRecord>,
    token: Arc<CancellationToken>,
}

impl FailureAggregator {
    /// Creates an aggregator that cancels `token` on the first failure.
    #[must_use]
    pub fn new(token: Arc<CancellationToken>) -> Self {
        Self {
            first: OnceLock::new(),
            token,
        }
    }

    /// Records `error` if no failure has been recorded yet.
    ///
    /// Returns true if this call's error became the attempt's failure.
    pub fn report_failure(&self, stage: StageName, error: LoadError) -> bool {
        let message = error.to_string();
        if self.first.set(FailureRecord::new(stage, error)).is_err() {
            debug!(stage = %stage, error = %message, "Discarding failure after the first");
            return false;
        }

        warn!(stage = %stage, error = %message, "Stage failure recorded; cancelling attempt");
        self.cancel(format!("{stage} stage failed: {message}"));
        true
    }

    /// Triggers the attempt's cancellation signal.
    pub fn cancel(&self, reason: impl Into<String>) {
        self.token.cancel(reason);
    }

    /// Returns the recorded failure, if any.
    #[must_use]
    pub fn first_failure(&self) -> Option<&LoadError> {
        self.first.get().map(|record| &record.error)
    }

    /// Returns the full record of the recorded failure, if any.
    #[must_use]
    pub fn record(&self) -> Option<&FailureRecord> {
        self.first.get()
    }

    /// Returns the stage that failed first, if any.
    #[must_use]
    pub fn failed_stage(&self) -> Option<StageName> {
        self.first.get().map(|record| record.stage)
    }

    /// Returns true if the attempt has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Runs a stage future, converting a panic into [`LoadError::PanicDuringLoad`].
pub async fn guard_stage<F, T>(stage: StageName, work: F) -> Result<T, LoadError>
where
    F: Future<Output = Result<T, LoadError>>,
{
    match AssertUnwindSafe(work).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(LoadError::panic(stage, panic_message(payload.as_ref()))),
    }
}

/// Maps a failed stage task join into a load error.
pub(crate) fn join_error(stage: StageName, err: JoinError) -> LoadError {
    if err.is_panic() {
        LoadError::panic(stage, panic_message(err.into_panic().as_ref()))
    } else {
        LoadError::cancelled(format!("{stage} stage task aborted"))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{LoadErrorKind, StoreError};

    fn aggregator() -> (FailureAggregator, Arc<CancellationToken>) {
        let token = Arc::new(CancellationToken::new());
        (FailureAggregator::new(token.clone()), token)
    }

    #[test]
    fn test_first_failure_wins() {
        let (aggregator, token) = aggregator();

        assert!(aggregator.report_failure(
            StageName::Comments,
            LoadError::store(StageName::Comments, StoreError::msg("first")),
        ));
        assert!(!aggregator.report_failure(StageName::Users, LoadError::panic(StageName::Users, "second")));

        assert_eq!(aggregator.failed_stage(), Some(StageName::Comments));
        assert!(aggregator.first_failure().unwrap().to_string().contains("first"));
        assert!(token.is_cancelled());
        assert!(token.reason().unwrap().contains("comments stage failed"));
    }

    #[test]
    fn test_no_failure_no_cancel() {
        let (aggregator, token) = aggregator();
        assert!(aggregator.first_failure().is_none());
        assert!(aggregator.record().is_none());
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn test_concurrent_reports_record_one() {
        let (aggregator, _token) = aggregator();
        let aggregator = Arc::new(aggregator);

        let reporters: Vec<_> = StageName::ALL
            .into_iter()
            .map(|stage| {
                let aggregator = aggregator.clone();
                tokio::spawn(async move {
                    aggregator.report_failure(stage, LoadError::panic(stage, "boom"))
                })
            })
            .collect();

        let mut winners = 0;
        for reporter in reporters {
            if reporter.await.unwrap() {
                winners += 1;
            }
        }

        assert_eq!(winners, 1);
        assert_eq!(
            aggregator.first_failure().unwrap().stage(),
            aggregator.failed_stage()
        );
    }

    fn explode(message: String) -> Result<(), LoadError> {
        panic!("{}", message);
    }

    fn explode_static() -> Result<(), LoadError> {
        panic!("session store is nil");
    }

    #[tokio::test]
    async fn test_guard_converts_str_panic() {
        let result = guard_stage(StageName::Session, async { explode_static() }).await;

        let err = result.unwrap_err();
        assert_eq!(err.kind(), LoadErrorKind::PanicDuringLoad);
        assert_eq!(err.stage(), Some(StageName::Session));
        assert!(err.to_string().contains("session store is nil"));
    }

    #[tokio::test]
    async fn test_guard_converts_string_panic() {
        let id = 7;
        let result = guard_stage(StageName::Users, async move { explode(format!("missing user {id}")) }).await;

        assert!(result.unwrap_err().to_string().contains("missing user 7"));
    }

    #[tokio::test]
    async fn test_guard_passes_through() {
        let ok = guard_stage(StageName::Comments, async { Ok::<_, LoadError>(5) }).await;
        assert_eq!(ok.unwrap(), 5);

        let err = guard_stage(StageName::Comments, async {
            Err::<(), _>(LoadError::cancelled("stop"))
        })
        .await;
        assert_eq!(err.unwrap_err().kind(), LoadErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn test_join_error_from_panicking_task() {
        let handle = tokio::spawn(async {
            panic!("task blew up");
        });
        let err = join_error(StageName::Attachments, handle.await.unwrap_err());
        assert_eq!(err.kind(), LoadErrorKind::PanicDuringLoad);
        assert!(err.to_string().contains("task blew up"));
    }
}
