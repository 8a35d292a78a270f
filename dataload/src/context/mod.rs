//! The caller-supplied load context.
//!
//! A [`LoadContext`] carries cancellation and an optional deadline into a
//! load. Stages and stores receive the attempt-scoped child context and must
//! observe it at every suspension point.

mod load;

pub use load::{LoadContext, DEADLINE_EXCEEDED};
