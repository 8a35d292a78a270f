//! Lifecycle events for loads.
//!
//! The stage graph executor reports every attempt and stage transition
//! to an [`EventSink`]. The default sink discards everything.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// An attempt was admitted by the retry gate.
pub const ATTEMPT_STARTED: &str = "attempt.started";
/// An attempt produced a result.
pub const ATTEMPT_COMPLETED: &str = "attempt.completed";
/// An attempt ended with an error.
pub const ATTEMPT_FAILED: &str = "attempt.failed";
/// A stage began running its work function.
pub const STAGE_STARTED: &str = "stage.started";
/// A stage finished successfully.
pub const STAGE_COMPLETED: &str = "stage.completed";
/// A stage's skip predicate held.
pub const STAGE_SKIPPED: &str = "stage.skipped";
/// A stage's work function failed or panicked.
pub const STAGE_FAILED: &str = "stage.failed";
/// A stage was cancelled or lost a dependency.
pub const STAGE_ABORTED: &str = "stage.aborted";
