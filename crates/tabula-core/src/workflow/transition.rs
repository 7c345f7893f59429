//! The session transition table as a pure function.
//!
//! `transition(step, event)` knows nothing about session data; the engine
//! performs a step's work, names the outcome as a [`StepEvent`], and asks
//! this table where to go next.

use std::fmt;

use tabula_types::error::TransitionError;
use tabula_types::session::{Step, UserCommand};

/// Outcome of a step, or the routing of a user command at `AwaitInput`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEvent {
    /// A dataset was imported and its handle recorded.
    DatasetLoaded,
    /// Statistics for the current dataset were emitted.
    StatsComputed,

    // User commands at AwaitInput
    UndoRequested,
    ExportRequested,
    QuitRequested,
    ResetRequested,
    StatsRequested,
    /// Anything else: hand the message to the proposal generator.
    ChangeRequested,
    /// Blank input; stay put.
    EmptyInput,

    // Execute outcomes
    /// The generator answered or asked for clarification.
    Replied,
    /// Generated code ran and its result was committed.
    Committed,
    /// The attempt failed and the retry bound allows another.
    RetryScheduled,
    /// The attempt failed and the retry bound is reached.
    RetriesExhausted,

    Reverted,
    ResetApplied,
    ExportFinished,

    /// The host ended the session (headless use, disconnect).
    Ended,
}

impl StepEvent {
    /// Routing event for a parsed user command.
    pub fn for_command(command: &UserCommand) -> Self {
        match command {
            UserCommand::Undo => StepEvent::UndoRequested,
            UserCommand::Export { .. } => StepEvent::ExportRequested,
            UserCommand::Quit => StepEvent::QuitRequested,
            UserCommand::Reset => StepEvent::ResetRequested,
            UserCommand::Stats => StepEvent::StatsRequested,
            UserCommand::Request { .. } => StepEvent::ChangeRequested,
        }
    }
}

impl fmt::Display for StepEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepEvent::DatasetLoaded => "dataset_loaded",
            StepEvent::StatsComputed => "stats_computed",
            StepEvent::UndoRequested => "undo_requested",
            StepEvent::ExportRequested => "export_requested",
            StepEvent::QuitRequested => "quit_requested",
            StepEvent::ResetRequested => "reset_requested",
            StepEvent::StatsRequested => "stats_requested",
            StepEvent::ChangeRequested => "change_requested",
            StepEvent::EmptyInput => "empty_input",
            StepEvent::Replied => "replied",
            StepEvent::Committed => "committed",
            StepEvent::RetryScheduled => "retry_scheduled",
            StepEvent::RetriesExhausted => "retries_exhausted",
            StepEvent::Reverted => "reverted",
            StepEvent::ResetApplied => "reset_applied",
            StepEvent::ExportFinished => "export_finished",
            StepEvent::Ended => "ended",
        };
        f.write_str(name)
    }
}

/// Next step for `(from, event)`, or an error if the table has no row for it.
pub fn transition(from: Step, event: StepEvent) -> Result<Step, TransitionError> {
    use Step::*;
    use StepEvent::*;

    let to = match (from, event) {
        (Terminal, _) => None,
        (_, Ended) => Some(Terminal),

        (Upload, DatasetLoaded) => Some(Analyze),
        (Analyze, StatsComputed) => Some(AwaitInput),

        (AwaitInput, UndoRequested) => Some(Undo),
        (AwaitInput, ExportRequested) => Some(Export),
        (AwaitInput, QuitRequested) => Some(Terminal),
        (AwaitInput, ResetRequested) => Some(Reset),
        (AwaitInput, StatsRequested) => Some(Analyze),
        (AwaitInput, ChangeRequested) => Some(Execute),
        (AwaitInput, EmptyInput) => Some(AwaitInput),

        (Execute, Replied) => Some(AwaitInput),
        (Execute, Committed) => Some(Analyze),
        (Execute, RetryScheduled) => Some(Execute),
        (Execute, RetriesExhausted) => Some(AwaitInput),

        (Undo, Reverted) => Some(Analyze),
        (Reset, ResetApplied) => Some(Analyze),
        (Export, ExportFinished) => Some(AwaitInput),

        _ => None,
    };

    to.ok_or_else(|| TransitionError {
        from,
        event: event.to_string(),
    })
}
