//! Async line input for the chat loop.
//!
//! Wraps `rustyline_async::Readline` so the prompt stays usable while the
//! spinner and engine output share the terminal.

use rustyline_async::{Readline, ReadlineError, ReadlineEvent, SharedWriter};

/// What the user did at the prompt.
#[derive(Debug, PartialEq, Eq)]
pub enum InputEvent {
    /// A submitted line, trimmed. May be empty; the engine answers blank
    /// input itself.
    Line(String),
    /// Ctrl+D.
    Eof,
    /// Ctrl+C.
    Interrupted,
}

impl From<ReadlineEvent> for InputEvent {
    fn from(event: ReadlineEvent) -> Self {
        match event {
            ReadlineEvent::Line(line) => InputEvent::Line(line.trim().to_string()),
            ReadlineEvent::Eof => InputEvent::Eof,
            ReadlineEvent::Interrupted => InputEvent::Interrupted,
        }
    }
}

pub struct ChatInput {
    rl: Readline,
}

impl ChatInput {
    /// Returns the input handle and a writer that prints above the prompt.
    pub fn new(prompt: String) -> Result<(Self, SharedWriter), ReadlineError> {
        let (rl, writer) = Readline::new(prompt)?;
        Ok((Self { rl }, writer))
    }

    /// Read one line. A terminal error is treated as end of input.
    pub async fn read_line(&mut self) -> InputEvent {
        match self.rl.readline().await {
            Ok(event) => event.into(),
            Err(e) => {
                tracing::debug!(error = %e, "readline failed, ending input");
                InputEvent::Eof
            }
        }
    }

    pub fn clear(&mut self) {
        let _ = self.rl.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_is_trimmed() {
        let event: InputEvent = ReadlineEvent::Line("  drop duplicates \n".to_string()).into();
        assert_eq!(event, InputEvent::Line("drop duplicates".to_string()));
    }

    #[test]
    fn test_blank_line_is_kept() {
        let event: InputEvent = ReadlineEvent::Line("   ".to_string()).into();
        assert_eq!(event, InputEvent::Line(String::new()));
    }

    #[test]
    fn test_control_events() {
        assert_eq!(InputEvent::from(ReadlineEvent::Eof), InputEvent::Eof);
        assert_eq!(InputEvent::from(ReadlineEvent::Interrupted), InputEvent::Interrupted);
    }
}
