//! Session engine and collaborator traits for Tabula.
//!
//! This crate defines the "ports" (snapshot store, proposal generator, code
//! runner, dataset codec) that the infrastructure layer implements. It
//! depends only on `tabula-types` -- never on `tabula-infra` or any
//! process, network or filesystem-backed crate.

pub mod dataset;
pub mod llm;
pub mod proposal;
pub mod runner;
pub mod session;
pub mod snapshot;
pub mod workflow;
