//! Cooperative cancellation.
//!
//! A [`CancellationToken`] is a broadcast-once signal: it flips from "live" to
//! "cancelled" exactly once, remembers the first reason it was given, and can
//! be awaited from any number of tasks.

mod token;

pub use token::CancellationToken;
