//! Stage trait and the four stages of a comments load.
//!
//! Stages are the units of work the executor schedules. Each one reads the
//! outputs of its declared dependencies from [`StageInputs`] and produces a
//! single [`StageOutput`].

mod inputs;
mod loaders;

pub use inputs::{StageCompletion, StageInputs};
pub use loaders::{
    skip_attachments, skip_users, AttachmentsStage, CommentsStage, SessionStage, UsersStage,
};

use crate::context::LoadContext;
use crate::core::{StageName, StageOutput};
use crate::errors::LoadError;
use async_trait::async_trait;
use std::fmt::Debug;

/// Trait for load stages.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> StageName;

    /// Runs the stage's work function.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The attempt-scoped context; long-running work should observe it
    /// * `inputs` - Outputs of the stage's declared dependencies
    async fn run(&self, ctx: &LoadContext, inputs: &StageInputs) -> Result<StageOutput, LoadError>;
}
