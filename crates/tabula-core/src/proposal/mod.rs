//! Proposal generator trait, prompt construction and response parsing.
//!
//! A proposal generator turns `{stats, user message, prior error}` into one
//! of three tagged decisions (answer, clarify, code). The LLM-backed
//! implementation lives in tabula-infra; the prompt and the tolerant JSON
//! parsing live here so any backend can share them.

pub mod parse;
pub mod prompt;

use std::future::Future;

use tabula_types::error::AttemptError;
use tabula_types::proposal::{Proposal, ProposalContext};

/// Trait for the natural-language-to-action step.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait ProposalGenerator: Send + Sync {
    /// Decide what to do with the user's request.
    ///
    /// Output that does not parse into a [`Proposal`] is reported as
    /// `AttemptError::ProposalParse`; transport failures as
    /// `AttemptError::ProposalUnavailable`. Both count against the retry bound.
    fn propose(
        &self,
        context: &ProposalContext,
    ) -> impl Future<Output = Result<Proposal, AttemptError>> + Send;
}
