//! Stage graph execution engine.
//!
//! Every stage runs on its own task from the start of the attempt. A stage
//! suspends until all of its dependencies have published a completion or the
//! attempt is cancelled, whichever comes first, so no stage ever blocks in a
//! way cancellation cannot reach.

use super::failure::{guard_stage, join_error, FailureAggregator};
use crate::context::LoadContext;
use crate::core::{StageName, StageOutput, StageState};
use crate::errors::{GraphValidationError, LoadError, LoadErrorKind};
use crate::events::{self, EventSink, NoOpEventSink};
use crate::stages::{
    skip_attachments, skip_users, AttachmentsStage, CommentsStage, SessionStage, Stage,
    StageCompletion, StageInputs, UsersStage,
};
use crate::stores::Stores;
use futures::future::join_all;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

/// Decides whether a stage should be skipped, returning the reason if so.
pub type SkipPredicate = fn(&StageInputs) -> Option<String>;

/// Specification for a single stage in the graph.
#[derive(Debug, Clone)]
pub struct StageSpec {
    /// The stage name.
    pub name: StageName,
    /// Stages whose completion gates this one.
    pub dependencies: Vec<StageName>,
    /// Evaluated once all dependencies are satisfied.
    pub skip: Option<SkipPredicate>,
    /// The stage implementation.
    pub runner: Arc<dyn Stage>,
}

impl StageSpec {
    /// Creates a spec named after its runner, with no dependencies.
    #[must_use]
    pub fn new(runner: Arc<dyn Stage>) -> Self {
        Self {
            name: runner.name(),
            dependencies: Vec::new(),
            skip: None,
            runner,
        }
    }

    /// Adds a dependency.
    #[must_use]
    pub fn with_dependency(mut self, dependency: StageName) -> Self {
        if !self.dependencies.contains(&dependency) {
            self.dependencies.push(dependency);
        }
        self
    }

    /// Sets the skip predicate.
    #[must_use]
    pub fn with_skip(mut self, skip: SkipPredicate) -> Self {
        self.skip = Some(skip);
        self
    }
}

/// Per-attempt execution parameters.
#[derive(Clone)]
pub struct AttemptScope {
    /// Unique id of the attempt, for correlating events.
    pub attempt_id: Uuid,
    /// The retry gate generation that admitted the attempt.
    pub generation: u64,
    /// Receives lifecycle events.
    pub events: Arc<dyn EventSink>,
    /// How long to wait for in-flight stages after cancellation.
    pub drain_timeout: Duration,
    /// Optional deadline for the whole attempt.
    pub timeout: Option<Duration>,
}

impl AttemptScope {
    /// Creates a scope for the given generation.
    #[must_use]
    pub fn new(generation: u64) -> Self {
        Self {
            attempt_id: Uuid::new_v4(),
            generation,
            events: Arc::new(NoOpEventSink),
            drain_timeout: Duration::from_millis(250),
            timeout: None,
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Sets the drain timeout.
    #[must_use]
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Sets the attempt deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn emit(&self, event_type: &str, mut data: serde_json::Value) {
        if let Some(map) = data.as_object_mut() {
            map.insert("attempt_id".to_string(), serde_json::json!(self.attempt_id));
            map.insert("generation".to_string(), serde_json::json!(self.generation));
        }
        self.events.emit(event_type, Some(data));
    }
}

impl std::fmt::Debug for AttemptScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttemptScope")
            .field("attempt_id", &self.attempt_id)
            .field("generation", &self.generation)
            .field("drain_timeout", &self.drain_timeout)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Result of a successful graph execution.
#[derive(Debug, Clone)]
pub struct GraphExecutionResult {
    /// Terminal state of every stage.
    pub states: HashMap<StageName, StageState>,
    /// Outputs of the stages that reached `Done`.
    pub outputs: HashMap<StageName, Arc<StageOutput>>,
    /// Total execution time in milliseconds.
    pub duration_ms: f64,
}

impl GraphExecutionResult {
    /// Returns a stage's terminal state, `Pending` if it is not in the graph.
    #[must_use]
    pub fn state(&self, stage: StageName) -> StageState {
        self.states.get(&stage).copied().unwrap_or_default()
    }

    /// Returns a stage's output, if it produced one.
    #[must_use]
    pub fn output(&self, stage: StageName) -> Option<&StageOutput> {
        self.outputs.get(&stage).map(AsRef::as_ref)
    }
}

/// A validated, acyclic graph of stages.
#[derive(Debug, Clone)]
pub struct StageGraph {
    /// Stage specifications in topological order.
    stages: Vec<StageSpec>,
}

impl StageGraph {
    /// Creates a graph, validating names and dependencies.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph is empty, a stage is declared twice,
    /// a dependency is unknown or self-referential, or the graph has a cycle.
    pub fn new(specs: Vec<StageSpec>) -> Result<Self, GraphValidationError> {
        if specs.is_empty() {
            return Err(GraphValidationError::Empty);
        }

        let mut names = HashSet::new();
        for spec in &specs {
            if !names.insert(spec.name) {
                return Err(GraphValidationError::DuplicateStage(spec.name));
            }
        }

        for spec in &specs {
            for dependency in &spec.dependencies {
                if *dependency == spec.name {
                    return Err(GraphValidationError::SelfDependency(spec.name));
                }
                if !names.contains(dependency) {
                    return Err(GraphValidationError::UnknownDependency {
                        stage: spec.name,
                        dependency: *dependency,
                    });
                }
            }
        }

        let stages = topological_sort(specs)?;
        Ok(Self { stages })
    }

    /// Builds the comments load graph.
    ///
    /// `comments` and `session` are roots; `users` waits on `comments`;
    /// `attachments` waits on both roots and is skipped without a session id.
    pub fn comments_loader(stores: &Stores) -> Result<Self, GraphValidationError> {
        Self::new(vec![
            StageSpec::new(Arc::new(CommentsStage::new(stores.comments.clone()))),
            StageSpec::new(Arc::new(SessionStage::new(stores.session.clone()))),
            StageSpec::new(Arc::new(UsersStage::new(stores.users.clone())))
                .with_dependency(StageName::Comments)
                .with_skip(skip_users),
            StageSpec::new(Arc::new(AttachmentsStage::new(stores.attachments.clone())))
                .with_dependency(StageName::Comments)
                .with_dependency(StageName::Session)
                .with_skip(skip_attachments),
        ])
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Returns the stage names in topological order.
    #[must_use]
    pub fn execution_order(&self) -> Vec<StageName> {
        self.stages.iter().map(|spec| spec.name).collect()
    }

    /// Executes one attempt of the graph.
    ///
    /// Returns the first recorded stage failure, or the context's
    /// cancellation error if no stage failed, or the per-stage results.
    pub async fn execute(
        &self,
        ctx: &LoadContext,
        scope: &AttemptScope,
    ) -> Result<GraphExecutionResult, LoadError> {
        let start = Instant::now();

        let (attempt_ctx, attempt_token) = ctx.child();
        let attempt_ctx = match scope.timeout {
            Some(timeout) => attempt_ctx.with_timeout(timeout),
            None => attempt_ctx,
        };
        let aggregator = Arc::new(FailureAggregator::new(attempt_token));

        debug!(attempt_id = %scope.attempt_id, generation = scope.generation, "Starting load attempt");
        scope.emit(
            events::ATTEMPT_STARTED,
            serde_json::json!({ "stages": self.stage_count() }),
        );

        // One single-writer completion channel per stage.
        let mut senders = HashMap::with_capacity(self.stages.len());
        let mut receivers = HashMap::with_capacity(self.stages.len());
        for spec in &self.stages {
            let (tx, rx) = watch::channel(None::<StageCompletion>);
            senders.insert(spec.name, tx);
            receivers.insert(spec.name, rx);
        }

        let mut names = Vec::with_capacity(self.stages.len());
        let mut handles = Vec::with_capacity(self.stages.len());
        for spec in &self.stages {
            let Some(completion) = senders.remove(&spec.name) else {
                continue;
            };
            let dependencies = spec
                .dependencies
                .iter()
                .filter_map(|dep| receivers.get(dep).map(|rx| (*dep, rx.clone())))
                .collect();

            let worker = StageWorker {
                spec: spec.clone(),
                dependencies,
                ctx: attempt_ctx.clone(),
                aggregator: aggregator.clone(),
                scope: scope.clone(),
                completion,
            };
            names.push(spec.name);
            handles.push(tokio::spawn(worker.run()));
        }

        let abort_handles: Vec<_> = handles.iter().map(tokio::task::JoinHandle::abort_handle).collect();
        let joined = join_all(handles);
        tokio::pin!(joined);

        let joins = tokio::select! {
            joins = &mut joined => joins,
            () = attempt_ctx.done() => {
                match tokio::time::timeout(scope.drain_timeout, &mut joined).await {
                    Ok(joins) => joins,
                    Err(_) => {
                        warn!(
                            attempt_id = %scope.attempt_id,
                            drain_timeout_ms = scope.drain_timeout.as_millis() as u64,
                            "Stages still running after cancellation; aborting them"
                        );
                        for handle in &abort_handles {
                            handle.abort();
                        }
                        joined.await
                    }
                }
            }
        };

        let mut states = HashMap::with_capacity(names.len());
        for (name, outcome) in names.into_iter().zip(joins) {
            let state = match outcome {
                Ok(state) => state,
                Err(err) => {
                    let err = join_error(name, err);
                    if err.kind() == LoadErrorKind::PanicDuringLoad {
                        aggregator.report_failure(name, err);
                        StageState::Failed
                    } else {
                        StageState::Aborted
                    }
                }
            };
            states.insert(name, state);
        }

        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        let failure = aggregator
            .first_failure()
            .cloned()
            .or_else(|| {
                states
                    .values()
                    .any(|state| !state.is_satisfied())
                    .then(|| incomplete_error(&attempt_ctx, &states))
            });

        if let Some(err) = failure {
            debug!(
                attempt_id = %scope.attempt_id,
                generation = scope.generation,
                duration_ms,
                error = %err,
                "Load attempt failed"
            );
            scope.emit(
                events::ATTEMPT_FAILED,
                serde_json::json!({
                    "error": err.to_string(),
                    "kind": err.kind(),
                    "duration_ms": duration_ms,
                }),
            );
            return Err(err);
        }

        let outputs = receivers
            .into_iter()
            .filter_map(|(name, rx)| {
                let completion = rx.borrow().clone();
                completion.and_then(|c| c.output).map(|output| (name, output))
            })
            .collect();

        debug!(attempt_id = %scope.attempt_id, duration_ms, "Load attempt completed");
        scope.emit(
            events::ATTEMPT_COMPLETED,
            serde_json::json!({ "duration_ms": duration_ms }),
        );

        Ok(GraphExecutionResult {
            states,
            outputs,
            duration_ms,
        })
    }
}

/// Error for an attempt where some stage did not complete but no stage
/// failure was recorded.
fn incomplete_error(ctx: &LoadContext, states: &HashMap<StageName, StageState>) -> LoadError {
    ctx.err().unwrap_or_else(|| {
        let mut incomplete: Vec<_> = states
            .iter()
            .filter(|(_, state)| !state.is_satisfied())
            .map(|(name, state)| format!("{name}={state}"))
            .collect();
        incomplete.sort();
        LoadError::Internal(format!(
            "attempt ended with incomplete stages: {}",
            incomplete.join(", ")
        ))
    })
}

/// Drives one stage through its lifecycle.
struct StageWorker {
    spec: StageSpec,
    dependencies: Vec<(StageName, watch::Receiver<Option<StageCompletion>>)>,
    ctx: LoadContext,
    aggregator: Arc<FailureAggregator>,
    scope: AttemptScope,
    completion: watch::Sender<Option<StageCompletion>>,
}

impl StageWorker {
    async fn run(self) -> StageState {
        let name = self.spec.name;
        let dependencies = self.dependencies.clone();

        let completions = tokio::select! {
            biased;
            () = self.ctx.done() => None,
            completions = wait_for_dependencies(dependencies) => Some(completions),
        };

        let Some(completions) = completions else {
            return self.abort("cancelled while waiting for dependencies");
        };

        if let Some((dependency, completion)) = completions
            .iter()
            .find(|(_, completion)| !completion.state.is_satisfied())
        {
            return self.abort(&format!("dependency {dependency} ended {}", completion.state));
        }

        let inputs = StageInputs::from_completions(completions);

        if let Some(reason) = self.spec.skip.and_then(|skip| skip(&inputs)) {
            debug!(stage = %name, reason = %reason, "Stage skipped");
            self.scope.emit(
                events::STAGE_SKIPPED,
                serde_json::json!({ "stage": name, "reason": reason }),
            );
            self.publish(StageCompletion::without_output(StageState::Skipped));
            return StageState::Skipped;
        }

        if self.ctx.is_cancelled() {
            return self.abort("cancelled before start");
        }

        debug!(stage = %name, state = %StageState::Running, "Stage started");
        self.scope
            .emit(events::STAGE_STARTED, serde_json::json!({ "stage": name }));
        let started = Instant::now();

        let result = guard_stage(name, self.spec.runner.run(&self.ctx, &inputs)).await;
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        match result {
            Ok(_) if self.ctx.is_cancelled() => self.abort("result arrived after cancellation"),
            Ok(output) => {
                debug!(stage = %name, duration_ms, entries = output.len(), "Stage completed");
                self.scope.emit(
                    events::STAGE_COMPLETED,
                    serde_json::json!({
                        "stage": name,
                        "duration_ms": duration_ms,
                        "entries": output.len(),
                    }),
                );
                self.publish(StageCompletion::done(output));
                StageState::Done
            }
            Err(err)
                if self.ctx.is_cancelled()
                    && err.kind() != LoadErrorKind::PanicDuringLoad =>
            {
                self.abort(&format!("failed after cancellation: {err}"))
            }
            Err(err) => {
                self.scope.emit(
                    events::STAGE_FAILED,
                    serde_json::json!({
                        "stage": name,
                        "error": err.to_string(),
                        "kind": err.kind(),
                        "duration_ms": duration_ms,
                    }),
                );
                self.aggregator.report_failure(name, err);
                self.publish(StageCompletion::without_output(StageState::Failed));
                StageState::Failed
            }
        }
    }

    fn abort(&self, reason: &str) -> StageState {
        debug!(stage = %self.spec.name, reason, "Stage aborted");
        self.scope.emit(
            events::STAGE_ABORTED,
            serde_json::json!({ "stage": self.spec.name, "reason": reason }),
        );
        self.publish(StageCompletion::without_output(StageState::Aborted));
        StageState::Aborted
    }

    fn publish(&self, completion: StageCompletion) {
        self.completion.send_replace(Some(completion));
    }
}

/// Waits until every dependency has published a completion.
///
/// A dependency whose task ended without publishing counts as aborted.
async fn wait_for_dependencies(
    dependencies: Vec<(StageName, watch::Receiver<Option<StageCompletion>>)>,
) -> Vec<(StageName, StageCompletion)> {
    join_all(dependencies.into_iter().map(|(name, mut rx)| async move {
        let completion = match rx.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        };
        (name, completion.unwrap_or_else(StageCompletion::aborted))
    }))
    .await
}

/// Orders stages so that every stage follows its dependencies.
///
/// Kahn's algorithm, seeded in declaration order for determinism.
fn topological_sort(specs: Vec<StageSpec>) -> Result<Vec<StageSpec>, GraphValidationError> {
    let mut in_degree: HashMap<StageName, usize> = specs
        .iter()
        .map(|spec| (spec.name, spec.dependencies.len()))
        .collect();

    let mut ready: VecDeque<StageName> = specs
        .iter()
        .filter(|spec| spec.dependencies.is_empty())
        .map(|spec| spec.name)
        .collect();

    let mut order = Vec::with_capacity(specs.len());
    while let Some(name) = ready.pop_front() {
        order.push(name);
        for spec in &specs {
            if spec.dependencies.contains(&name) {
                if let Some(count) = in_degree.get_mut(&spec.name) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push_back(spec.name);
                    }
                }
            }
        }
    }

    if order.len() != specs.len() {
        let mut cycle: Vec<_> = specs
            .iter()
            .map(|spec| spec.name)
            .filter(|name| !order.contains(name))
            .collect();
        cycle.sort();
        return Err(GraphValidationError::CycleDetected(cycle));
    }

    let mut by_name: HashMap<StageName, StageSpec> =
        specs.into_iter().map(|spec| (spec.name, spec)).collect();
    Ok(order
        .into_iter()
        .filter_map(|name| by_name.remove(&name))
        .collect())
}
