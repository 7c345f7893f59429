//! Code runner trait.
//!
//! A code runner applies externally generated transformation code to a
//! dataset inside a sandbox. The engine trusts nothing about it beyond this
//! contract: a dataset comes back on success, anything else is a failure.

use std::future::Future;

use tabula_types::error::AttemptError;

/// Trait for sandboxed execution of transformation code.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
/// Implementations live in tabula-infra (e.g., `PythonCodeRunner`).
pub trait CodeRunner: Send + Sync {
    /// Run `code` against `dataset` and return the transformed dataset.
    ///
    /// "The code ran but produced no dataset" is a failure like any other
    /// (`AttemptError::Execution`). Implementations should enforce their own
    /// resource limits; the engine additionally applies a deadline and drops
    /// the returned future on timeout or cancellation.
    fn run(
        &self,
        code: &str,
        dataset: &[u8],
    ) -> impl Future<Output = Result<Vec<u8>, AttemptError>> + Send;
}
