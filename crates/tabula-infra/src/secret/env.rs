//! Environment variable secret provider.
//!
//! Reads API keys from the environment and hands them out wrapped in
//! [`SecretString`] so they never reach logs or `Debug` output.

use secrecy::SecretString;

/// Errors from secret lookup.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("environment variable '{0}' is not set")]
    Missing(String),

    #[error("environment variable '{0}' is not valid unicode")]
    NotUnicode(String),
}

/// Read-only environment variable secret provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecretProvider;

impl EnvSecretProvider {
    pub fn new() -> Self {
        Self
    }

    /// Look up `key`; blank values count as missing.
    pub fn get(&self, key: &str) -> Result<SecretString, SecretError> {
        match std::env::var(key) {
            Ok(val) if !val.trim().is_empty() => Ok(SecretString::from(val)),
            Ok(_) | Err(std::env::VarError::NotPresent) => Err(SecretError::Missing(key.to_string())),
            Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::NotUnicode(key.to_string())),
        }
    }
}
