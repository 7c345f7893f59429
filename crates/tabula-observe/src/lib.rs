//! Observability setup shared by the tabula binaries.

pub mod tracing_setup;
