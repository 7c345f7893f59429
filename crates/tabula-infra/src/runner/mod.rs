//! Code runner adapters.

pub mod python;

pub use python::PythonCodeRunner;
