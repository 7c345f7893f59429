//! Proposal generator input and output shapes.

use serde::{Deserialize, Serialize};

/// The tagged decision produced by the proposal generator.
///
/// Wire form: `{"kind": "answer" | "clarify" | "code", "content": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "content", rename_all = "lowercase")]
pub enum Proposal {
    /// Plain-text reply; no change to the dataset.
    Answer(String),
    /// A question back to the user asking for missing details.
    Clarify(String),
    /// Transformation code to run against the current dataset.
    Code(String),
}

impl Proposal {
    pub fn kind(&self) -> &'static str {
        match self {
            Proposal::Answer(_) => "answer",
            Proposal::Clarify(_) => "clarify",
            Proposal::Code(_) => "code",
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Proposal::Answer(text) | Proposal::Clarify(text) | Proposal::Code(text) => text,
        }
    }
}

/// Everything the proposal generator is told about the current turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalContext {
    pub stats_summary: String,
    pub user_message: String,
    /// Failure description from the previous attempt, when retrying.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prior_error: Option<String>,
    /// 1-based number of the retry being attempted, when retrying.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_number: Option<u32>,
    pub max_retries: u32,
}

impl ProposalContext {
    pub fn is_retry(&self) -> bool {
        self.retry_number.is_some()
    }
}
