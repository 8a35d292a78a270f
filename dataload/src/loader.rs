//! The comments loader.
//!
//! A [`CommentsLoader`] owns the stage graph and the retry gate. Every call
//! to [`CommentsLoader::load`] goes through the gate, so the graph runs at
//! most once at a time and never again after a success.

use crate::config::LoaderConfig;
use crate::context::LoadContext;
use crate::errors::LoadError;
use crate::events::{EventSink, NoOpEventSink};
use crate::pipeline::{assemble, AttemptScope, GateSnapshot, LoadedData, RetryGate, StageGraph};
use crate::stores::Stores;
use anyhow::Context as _;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

struct LoaderInner {
    graph: StageGraph,
    gate: RetryGate,
    config: LoaderConfig,
    events: Arc<dyn EventSink>,
}

/// Loads comments together with their authors, attachments and the session.
///
/// Cloning is cheap; clones share the same cached result and retry budget.
#[derive(Clone)]
pub struct CommentsLoader {
    inner: Arc<LoaderInner>,
}

impl CommentsLoader {
    /// Creates a loader with the default configuration.
    pub fn new(stores: Stores) -> anyhow::Result<Self> {
        Self::builder(stores).build()
    }

    /// Creates a loader with an explicit configuration.
    pub fn with_config(stores: Stores, config: LoaderConfig) -> anyhow::Result<Self> {
        Self::builder(stores).config(config).build()
    }

    /// Starts building a loader over `stores`.
    #[must_use]
    pub fn builder(stores: Stores) -> LoaderBuilder {
        LoaderBuilder {
            stores,
            config: LoaderConfig::default(),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Loads the data, or returns the result cached by an earlier success.
    ///
    /// Concurrent callers share a single attempt. If `ctx` is done before
    /// the result is available the call returns [`LoadError::Cancelled`];
    /// the attempt itself runs under the context of the caller that
    /// started it.
    pub async fn load(&self, ctx: &LoadContext) -> Result<Arc<LoadedData>, LoadError> {
        let inner = self.inner.clone();
        let attempt_ctx = ctx.clone();

        self.inner
            .gate
            .run(ctx, move |generation| async move {
                let scope = AttemptScope::new(generation)
                    .with_events(inner.events.clone())
                    .with_drain_timeout(inner.config.drain_timeout())
                    .with_timeout(inner.config.attempt_timeout());

                let result = inner.graph.execute(&attempt_ctx, &scope).await?;
                debug!(
                    generation,
                    duration_ms = result.duration_ms,
                    "Assembling load result"
                );
                assemble(result).map(Arc::new)
            })
            .await
    }

    /// Returns the retry gate's current state.
    #[must_use]
    pub fn gate_snapshot(&self) -> GateSnapshot {
        self.inner.gate.snapshot()
    }

    /// Returns the loader configuration.
    #[must_use]
    pub fn config(&self) -> &LoaderConfig {
        &self.inner.config
    }
}

impl fmt::Debug for CommentsLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommentsLoader")
            .field("stages", &self.inner.graph.execution_order())
            .field("config", &self.inner.config)
            .field("gate", &self.inner.gate)
            .finish_non_exhaustive()
    }
}

/// Builder for [`CommentsLoader`].
pub struct LoaderBuilder {
    stores: Stores,
    config: LoaderConfig,
    events: Arc<dyn EventSink>,
}

impl LoaderBuilder {
    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the sink receiving attempt and stage events.
    #[must_use]
    pub fn event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Validates the configuration and builds the loader.
    pub fn build(self) -> anyhow::Result<CommentsLoader> {
        self.config.validate().context("invalid loader configuration")?;
        let graph = StageGraph::comments_loader(&self.stores)
            .context("failed to build the comments stage graph")?;

        Ok(CommentsLoader {
            inner: Arc::new(LoaderInner {
                graph,
                gate: RetryGate::new(self.config.max_attempts),
                config: self.config,
                events: self.events,
            }),
        })
    }
}

impl fmt::Debug for LoaderBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderBuilder")
            .field("stores", &self.stores)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
