//! Staged load execution.
//!
//! This module provides:
//! - The failure aggregator (first failure wins, panic containment)
//! - The stage graph executor
//! - The result assembler
//! - The retry gate bounding how many attempts a loader makes

mod assembler;
mod failure;
mod gate;
mod graph;

pub use assembler::{assemble, distinct_user_ids, group_attachments, index_users, LoadedData};
pub use failure::{guard_stage, FailureAggregator, FailureRecord};
pub use gate::{GateSnapshot, RetryGate};
pub use graph::{AttemptScope, GraphExecutionResult, SkipPredicate, StageGraph, StageSpec};
