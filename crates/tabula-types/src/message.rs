//! Messages exchanged between the workflow engine and presentation adapters.
//!
//! Adapters deliver [`InboundMessage`]s at `AwaitInput` and receive
//! [`EngineOutput`]s as the engine advances. Both use serde-tagged JSON so
//! the same shapes travel over a WebSocket unchanged.

use serde::{Deserialize, Serialize};

/// A message delivered to the engine by a presentation adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// Free-form user text.
    Chat { text: String },
    /// Explicit export request.
    Export {
        #[serde(default)]
        filename: Option<String>,
    },
}

/// Something the engine wants shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineOutput {
    /// Fresh dataset statistics, emitted on entry to `Analyze`.
    Stats { text: String },
    /// Assistant text, emitted on exit from `Execute`, `Undo`, `Reset` and `Export`.
    Chat { text: String },
}

impl EngineOutput {
    pub fn text(&self) -> &str {
        match self {
            EngineOutput::Stats { text } | EngineOutput::Chat { text } => text,
        }
    }
}
