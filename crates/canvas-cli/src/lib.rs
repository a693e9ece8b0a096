//! Pieces of the `canvas` binary that are worth testing on their own.

pub mod executor;
pub mod prompt;
