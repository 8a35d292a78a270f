//! Single-flight retry gate.
//!
//! At most one load attempt is in flight at a time. Callers that arrive while
//! an attempt is running await that same attempt. A successful result is
//! cached for every later caller; each failed attempt consumes one unit of
//! the budget, and once the budget is spent callers get
//! [`LoadError::AttemptsExhausted`] without a new attempt being started.

use super::assembler::LoadedData;
use crate::context::LoadContext;
use crate::errors::LoadError;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Outcome of one attempt, shared by every caller that waited on it.
pub type AttemptResult = Result<Arc<LoadedData>, LoadError>;

type SharedAttempt = Shared<BoxFuture<'static, AttemptResult>>;

struct InFlight {
    generation: u64,
    attempt: SharedAttempt,
}

struct GateState {
    remaining_attempts: u32,
    generation: u64,
    last_result: Option<AttemptResult>,
    in_flight: Option<InFlight>,
}

impl GateState {
    /// Books the outcome of the attempt admitted as `generation`.
    fn record(&mut self, generation: u64, result: &AttemptResult) {
        if self
            .in_flight
            .as_ref()
            .is_some_and(|in_flight| in_flight.generation == generation)
        {
            self.in_flight = None;
        }
        if result.is_err() {
            self.remaining_attempts = self.remaining_attempts.saturating_sub(1);
        }
        self.last_result = Some(result.clone());
    }
}

/// Point-in-time view of a [`RetryGate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateSnapshot {
    /// Configured attempt budget.
    pub max_attempts: u32,
    /// Attempts started so far.
    pub generation: u64,
    /// Attempts left before the gate refuses.
    pub remaining_attempts: u32,
    /// Whether an attempt is running.
    pub in_flight: bool,
    /// Whether a successful result is cached.
    pub loaded: bool,
    /// Message of the most recent failure, if the last attempt failed.
    pub last_error: Option<String>,
}

/// Bounds and deduplicates load attempts.
pub struct RetryGate {
    max_attempts: u32,
    state: Arc<Mutex<GateState>>,
}

impl RetryGate {
    /// Creates a gate allowing `max_attempts` attempts in total.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            state: Arc::new(Mutex::new(GateState {
                remaining_attempts: max_attempts,
                generation: 0,
                last_result: None,
                in_flight: None,
            })),
        }
    }

    /// Returns the configured attempt budget.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the cached result, joins the in-flight attempt, or starts a
    /// new attempt by calling `start` with its generation number.
    ///
    /// The attempt runs on its own task, so a caller whose `ctx` is done
    /// stops waiting with a cancellation error while the attempt carries on
    /// for the other waiters. A caller whose `ctx` is already done never
    /// starts an attempt.
    pub async fn run<F, Fut>(&self, ctx: &LoadContext, start: F) -> AttemptResult
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = AttemptResult> + Send + 'static,
    {
        let attempt = {
            let mut state = self.state.lock();

            if let Some(Ok(data)) = &state.last_result {
                return Ok(data.clone());
            }

            match &state.in_flight {
                Some(in_flight) => {
                    debug!(generation = in_flight.generation, "Joining in-flight load attempt");
                    in_flight.attempt.clone()
                }
                None => {
                    if let Some(err) = ctx.err() {
                        return Err(err);
                    }

                    if state.remaining_attempts == 0 {
                        let last = match &state.last_result {
                            Some(Err(err)) => err.clone(),
                            _ => LoadError::Internal("no attempt recorded".to_string()),
                        };
                        warn!(attempts = self.max_attempts, error = %last, "Load attempts exhausted");
                        return Err(LoadError::AttemptsExhausted {
                            attempts: self.max_attempts,
                            last: Box::new(last),
                        });
                    }

                    state.generation += 1;
                    let generation = state.generation;
                    info!(
                        generation,
                        remaining_attempts = state.remaining_attempts,
                        "Starting load attempt"
                    );

                    let task = tokio::spawn(track(
                        Arc::downgrade(&self.state),
                        generation,
                        start(generation),
                    ));
                    let attempt = task
                        .map(|joined| {
                            joined.unwrap_or_else(|err| {
                                Err(LoadError::Internal(format!("load attempt task failed: {err}")))
                            })
                        })
                        .boxed()
                        .shared();

                    state.in_flight = Some(InFlight {
                        generation,
                        attempt: attempt.clone(),
                    });
                    attempt
                }
            }
        };

        tokio::select! {
            biased;
            result = attempt => result,
            () = ctx.done() => Err(ctx.err().unwrap_or_else(|| LoadError::cancelled("cancelled"))),
        }
    }

    /// Returns a point-in-time view of the gate.
    #[must_use]
    pub fn snapshot(&self) -> GateSnapshot {
        let state = self.state.lock();
        GateSnapshot {
            max_attempts: self.max_attempts,
            generation: state.generation,
            remaining_attempts: state.remaining_attempts,
            in_flight: state.in_flight.is_some(),
            loaded: matches!(state.last_result, Some(Ok(_))),
            last_error: match &state.last_result {
                Some(Err(err)) => Some(err.to_string()),
                _ => None,
            },
        }
    }
}

impl std::fmt::Debug for RetryGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryGate")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

/// Runs an attempt to completion and books its outcome.
async fn track<Fut>(state: Weak<Mutex<GateState>>, generation: u64, attempt: Fut) -> AttemptResult
where
    Fut: Future<Output = AttemptResult>,
{
    let result = match AssertUnwindSafe(attempt).catch_unwind().await {
        Ok(result) => result,
        Err(_) => Err(LoadError::Internal("load attempt panicked".to_string())),
    };

    match &result {
        Ok(_) => debug!(generation, "Load attempt succeeded"),
        Err(err) => warn!(generation, error = %err, "Load attempt failed"),
    }

    if let Some(state) = state.upgrade() {
        state.lock().record(generation, &result);
    }
    result
}
