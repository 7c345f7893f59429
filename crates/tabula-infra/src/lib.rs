//! Infrastructure layer for Tabula.
//!
//! Contains implementations of the ports defined in `tabula-core`: snapshot
//! stores, the CSV dataset codec, the subprocess Python code runner and the
//! LLM-backed proposal generator, plus config loading, data directory
//! resolution and environment secret lookup.

pub mod config;
pub mod dataset;
pub mod filesystem;
pub mod llm;
pub mod proposal;
pub mod runner;
pub mod secret;
pub mod snapshot;
