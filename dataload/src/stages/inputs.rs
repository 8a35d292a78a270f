//! Dependency outputs handed to a stage.

use crate::core::{Comment, Session, StageName, StageOutput, StageState};
use std::collections::HashMap;
use std::sync::Arc;

/// What a stage publishes when it reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCompletion {
    /// The terminal state.
    pub state: StageState,
    /// The output, present only when the state is `Done`.
    pub output: Option<Arc<StageOutput>>,
}

impl StageCompletion {
    /// A successful completion.
    #[must_use]
    pub fn done(output: StageOutput) -> Self {
        Self {
            state: StageState::Done,
            output: Some(Arc::new(output)),
        }
    }

    /// A completion without output.
    #[must_use]
    pub fn without_output(state: StageState) -> Self {
        Self { state, output: None }
    }

    /// The completion assumed for a stage that vanished without publishing.
    #[must_use]
    pub fn aborted() -> Self {
        Self::without_output(StageState::Aborted)
    }
}

/// Outputs of a stage's dependencies.
///
/// A dependency that was skipped is present with no output.
#[derive(Debug, Clone, Default)]
pub struct StageInputs {
    outputs: HashMap<StageName, Option<Arc<StageOutput>>>,
}

impl StageInputs {
    /// Creates empty inputs, as seen by a root stage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a dependency's output.
    #[must_use]
    pub fn with_output(mut self, stage: StageName, output: Option<Arc<StageOutput>>) -> Self {
        self.outputs.insert(stage, output);
        self
    }

    /// Builds inputs from dependency completions.
    pub fn from_completions(completions: impl IntoIterator<Item = (StageName, StageCompletion)>) -> Self {
        Self {
            outputs: completions
                .into_iter()
                .map(|(stage, completion)| (stage, completion.output))
                .collect(),
        }
    }

    /// Returns true if `stage` is one of the dependencies.
    #[must_use]
    pub fn contains(&self, stage: StageName) -> bool {
        self.outputs.contains_key(&stage)
    }

    /// Returns a dependency's output, if it produced one.
    #[must_use]
    pub fn get(&self, stage: StageName) -> Option<&StageOutput> {
        self.outputs.get(&stage).and_then(Option::as_deref)
    }

    /// Returns the comments dependency, or an empty slice.
    #[must_use]
    pub fn comments(&self) -> &[Comment] {
        self.get(StageName::Comments)
            .and_then(StageOutput::as_comments)
            .unwrap_or_default()
    }

    /// Returns the session dependency, if present.
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.get(StageName::Session).and_then(StageOutput::as_session)
    }
}
