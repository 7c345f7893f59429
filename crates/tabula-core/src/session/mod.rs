//! Session state, undo log and the live-session registry.

pub mod registry;
pub mod state;
pub mod undo;
