//! Session workflow: the step table, command routing, retry policy and the
//! engine that drives a session through them.
//!
//! - `transition` -- pure `(step, event) -> step` table
//! - `command` -- classification of user input at `AwaitInput`
//! - `retry` -- bounded retry decisions for the Execute step
//! - `engine` -- step execution against the snapshot store and collaborators

pub mod command;
pub mod engine;
pub mod retry;
pub mod transition;
