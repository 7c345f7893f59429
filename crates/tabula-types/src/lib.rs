//! Shared domain types for Tabula.
//!
//! This crate contains the domain types used across the Tabula workspace:
//! dataset handles, session steps and undo entries, proposals, adapter
//! messages, configuration and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod dataset;
pub mod error;
pub mod llm;
pub mod message;
pub mod proposal;
pub mod session;
