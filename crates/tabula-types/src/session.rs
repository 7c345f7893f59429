//! Session-level domain types: workflow steps, undo entries and parsed
//! user commands.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dataset::DatasetHandle;

/// Unique identifier for a cleaning session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// The named steps of the session workflow.
///
/// `Upload` is initial; `Terminal` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Upload,
    Analyze,
    AwaitInput,
    Execute,
    Undo,
    Reset,
    Export,
    Terminal,
}

impl Step {
    /// Steps at which the engine yields control back to the caller.
    pub fn is_suspension_point(&self) -> bool {
        matches!(self, Step::Upload | Step::AwaitInput | Step::Terminal)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Upload => write!(f, "upload"),
            Step::Analyze => write!(f, "analyze"),
            Step::AwaitInput => write!(f, "await_input"),
            Step::Execute => write!(f, "execute"),
            Step::Undo => write!(f, "undo"),
            Step::Reset => write!(f, "reset"),
            Step::Export => write!(f, "export"),
            Step::Terminal => write!(f, "terminal"),
        }
    }
}

impl FromStr for Step {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "upload" => Ok(Step::Upload),
            "analyze" => Ok(Step::Analyze),
            "await_input" => Ok(Step::AwaitInput),
            "execute" => Ok(Step::Execute),
            "undo" => Ok(Step::Undo),
            "reset" => Ok(Step::Reset),
            "export" => Ok(Step::Export),
            "terminal" => Ok(Step::Terminal),
            other => Err(format!("invalid step: '{other}'")),
        }
    }
}

/// One entry of a session's undo log.
///
/// Recorded immediately before a mutating operation; `prior_handle` is the
/// dataset version that was current at that moment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoEntry {
    pub description: String,
    pub prior_handle: DatasetHandle,
    pub recorded_at: DateTime<Utc>,
}

/// Result of reverting the most recent change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevertOutcome {
    /// The top entry was popped and its handle restored.
    Reverted {
        description: String,
        restored: DatasetHandle,
    },
    /// The undo log was empty. Not an error.
    NothingToUndo,
}

impl RevertOutcome {
    /// User-facing message for this outcome.
    pub fn message(&self) -> String {
        match self {
            RevertOutcome::Reverted { description, .. } => format!("Undone: {description}"),
            RevertOutcome::NothingToUndo => "Nothing to undo.".to_string(),
        }
    }
}

/// Read-only view of a session for adapters (HTTP status endpoint, CLI).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionView {
    pub id: SessionId,
    pub step: Step,
    pub original: Option<DatasetHandle>,
    pub current: Option<DatasetHandle>,
    pub undo_depth: usize,
    pub retry_count: u32,
    pub history: Vec<UndoEntry>,
    pub created_at: DateTime<Utc>,
}

/// A user message at `AwaitInput`, classified into a workflow command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum UserCommand {
    Undo,
    Export { filename: Option<String> },
    Quit,
    Reset,
    Stats,
    /// Anything else is a request for the proposal generator.
    Request { text: String },
}
