//! Workflow engine: drives a session through the step table.
//!
//! The engine owns the collaborators (snapshot store, proposal generator,
//! code runner, dataset codec) and no session data. Callers hold a
//! [`SessionState`] and hand it in by `&mut`, which together with the
//! registry's per-session mutex keeps each session single-threaded.
//!
//! # Driving a session
//!
//! 1. [`WorkflowEngine::load`] imports the original dataset (`Upload -> Analyze`).
//! 2. [`WorkflowEngine::advance`] runs steps until a suspension point
//!    (`AwaitInput` or `Terminal`), collecting outputs for the adapter.
//! 3. [`WorkflowEngine::submit`] delivers user input at `AwaitInput` and
//!    routes it; [`WorkflowEngine::respond`] is submit + advance.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use tabula_types::config::EngineConfig;
use tabula_types::dataset::DatasetHandle;
use tabula_types::error::{AttemptError, SessionError};
use tabula_types::message::{EngineOutput, InboundMessage};
use tabula_types::proposal::{Proposal, ProposalContext};
use tabula_types::session::{Step, UserCommand};

use crate::dataset::DatasetCodec;
use crate::proposal::ProposalGenerator;
use crate::runner::CodeRunner;
use crate::session::state::SessionState;
use crate::snapshot::SnapshotStore;

use super::command::{parse_command, sanitize_filename};
use super::retry::{RetryController, RetryDecision};
use super::transition::{StepEvent, transition};

/// Reply to blank input at `AwaitInput`.
pub const EMPTY_INPUT_MESSAGE: &str = "Please enter a valid command.";

/// Reply after a reset to the original dataset.
pub const RESET_MESSAGE: &str = "Reset to original data";

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Runtime settings for the engine, derived from `[engine]` config.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub max_retries: u32,
    pub execution_timeout: Duration,
    pub description_preview_chars: usize,
    pub max_steps_per_turn: u32,
    pub default_export_filename: String,
    /// Directory export destinations are resolved against.
    pub export_dir: PathBuf,
}

impl EngineSettings {
    pub fn from_config(config: &EngineConfig, export_dir: impl Into<PathBuf>) -> Self {
        Self {
            max_retries: config.max_retries,
            execution_timeout: Duration::from_secs(config.execution_timeout_secs),
            description_preview_chars: config.description_preview_chars,
            max_steps_per_turn: config.max_steps_per_turn,
            default_export_filename: config.default_export_filename.clone(),
            export_dir: export_dir.into(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default(), ".")
    }
}

// ---------------------------------------------------------------------------
// Turn
// ---------------------------------------------------------------------------

/// Everything one `advance` produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub outputs: Vec<EngineOutput>,
    /// The suspension point the session stopped at.
    pub halted_at: Step,
}

impl Turn {
    pub fn is_terminal(&self) -> bool {
        self.halted_at == Step::Terminal
    }
}

// ---------------------------------------------------------------------------
// WorkflowEngine
// ---------------------------------------------------------------------------

pub struct WorkflowEngine<S, P, R, D> {
    store: S,
    proposals: P,
    runner: R,
    codec: D,
    retry: RetryController,
    settings: EngineSettings,
}

impl<S, P, R, D> WorkflowEngine<S, P, R, D>
where
    S: SnapshotStore,
    P: ProposalGenerator,
    R: CodeRunner,
    D: DatasetCodec,
{
    pub fn new(store: S, proposals: P, runner: R, codec: D, settings: EngineSettings) -> Self {
        Self {
            store,
            proposals,
            runner,
            codec,
            retry: RetryController::new(settings.max_retries),
            settings,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn codec(&self) -> &D {
        &self.codec
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn retry(&self) -> &RetryController {
        &self.retry
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Import `blob` as the session's original dataset (`Upload -> Analyze`).
    ///
    /// A second load is an attempt to reassign the original handle and is
    /// rejected with `ImmutabilityViolation`, leaving the session unchanged.
    pub async fn load(
        &self,
        state: &mut SessionState,
        blob: Vec<u8>,
    ) -> Result<DatasetHandle, SessionError> {
        if state.original().is_none() && state.step() != Step::Upload {
            return Err(SessionError::InvalidStep {
                step: state.step(),
                reason: "datasets can only be loaded at upload".to_string(),
            });
        }

        let summary = self.codec.summarize(&blob)?;
        let handle = self.store.write(blob.into()).await?;
        state.set_original(handle)?;
        self.apply(state, StepEvent::DatasetLoaded)?;

        let (rows, cols) = summary.shape();
        tracing::info!(session_id = %state.id(), handle = %handle, rows, cols, "dataset loaded");
        Ok(handle)
    }

    /// Read a dataset from `path` through the codec and [`load`](Self::load) it.
    pub async fn load_path(
        &self,
        state: &mut SessionState,
        path: &Path,
    ) -> Result<DatasetHandle, SessionError> {
        let blob = self.codec.import(path).await?;
        self.load(state, blob).await
    }

    /// Deliver user input at `AwaitInput` and route it to the next step.
    ///
    /// Blank input stays at `AwaitInput` and returns a prompt to try again.
    /// A session left mid-step by a turn that never finished is returned to
    /// `AwaitInput` first.
    pub fn submit(
        &self,
        state: &mut SessionState,
        message: InboundMessage,
    ) -> Result<Option<EngineOutput>, SessionError> {
        self.recover_interrupted(state);
        if state.step() != Step::AwaitInput {
            return Err(SessionError::InvalidStep {
                step: state.step(),
                reason: "input is only accepted while awaiting input".to_string(),
            });
        }

        let command = match message {
            InboundMessage::Chat { text } => {
                let command = parse_command(&text);
                state.set_pending_message(text.trim());
                command
            }
            InboundMessage::Export { filename } => {
                let checked = filename.as_deref().and_then(sanitize_filename);
                if filename.is_some() && checked.is_none() {
                    tracing::warn!(session_id = %state.id(), "rejected export filename, using default");
                }
                state.set_pending_message("export");
                Some(UserCommand::Export { filename: checked })
            }
        };

        let Some(command) = command else {
            state.set_pending_message(EMPTY_INPUT_MESSAGE);
            self.apply(state, StepEvent::EmptyInput)?;
            return Ok(Some(EngineOutput::Chat {
                text: EMPTY_INPUT_MESSAGE.to_string(),
            }));
        };

        if let UserCommand::Export { filename } = &command {
            state.set_export_filename(filename.clone());
        }
        self.apply(state, StepEvent::for_command(&command))?;
        Ok(None)
    }

    /// Run steps until the session reaches a suspension point.
    ///
    /// On a structural error the current command is abandoned: a loaded
    /// session returns to `AwaitInput` with its handles untouched.
    pub async fn advance(
        &self,
        state: &mut SessionState,
        cancel: &CancellationToken,
    ) -> Result<Turn, SessionError> {
        let mut outputs = Vec::new();
        let mut steps = 0u32;

        while !state.step().is_suspension_point() {
            if steps >= self.settings.max_steps_per_turn {
                let step = state.step();
                tracing::warn!(session_id = %state.id(), step = %step, steps, "step limit reached");
                self.abandon_command(state);
                return Err(SessionError::InvalidStep {
                    step,
                    reason: format!("exceeded {} steps in one turn", self.settings.max_steps_per_turn),
                });
            }

            let before = (state.step(), state.retry_count());
            match self.step(state, cancel).await {
                Ok(Some(output)) => outputs.push(output),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(session_id = %state.id(), step = %state.step(), error = %e, "step failed");
                    self.abandon_command(state);
                    return Err(e);
                }
            }

            // Retry self-loops are bounded by the retry controller.
            if !is_retry_loop(before, (state.step(), state.retry_count())) {
                steps += 1;
            }
        }

        Ok(Turn {
            outputs,
            halted_at: state.step(),
        })
    }

    /// [`submit`](Self::submit) followed by [`advance`](Self::advance).
    pub async fn respond(
        &self,
        state: &mut SessionState,
        message: InboundMessage,
        cancel: &CancellationToken,
    ) -> Result<Turn, SessionError> {
        let immediate = self.submit(state, message)?;
        let mut turn = self.advance(state, cancel).await?;
        if let Some(output) = immediate {
            turn.outputs.insert(0, output);
        }
        Ok(turn)
    }

    /// End the session from outside (headless use, disconnect).
    pub fn finish(&self, state: &mut SessionState) -> Result<(), SessionError> {
        self.apply(state, StepEvent::Ended)?;
        Ok(())
    }

    /// Run exactly one non-suspension step.
    pub async fn step(
        &self,
        state: &mut SessionState,
        cancel: &CancellationToken,
    ) -> Result<Option<EngineOutput>, SessionError> {
        match state.step() {
            Step::Analyze => self.analyze(state).await.map(Some),
            Step::Execute => self.execute(state, cancel).await,
            Step::Undo => self.undo(state).map(Some),
            Step::Reset => self.reset(state).map(Some),
            Step::Export => self.export(state).await.map(Some),
            step @ (Step::Upload | Step::AwaitInput | Step::Terminal) => {
                Err(SessionError::InvalidStep {
                    step,
                    reason: "step waits for external input".to_string(),
                })
            }
        }
    }

    // -----------------------------------------------------------------------
    // Steps
    // -----------------------------------------------------------------------

    async fn analyze(&self, state: &mut SessionState) -> Result<EngineOutput, SessionError> {
        let handle = state.current().ok_or(SessionError::NotLoaded)?;
        let blob = self.store.read(&handle).await?;
        let summary = self.codec.summarize(&blob)?;

        state.set_stats_summary(summary.text.clone());
        self.apply(state, StepEvent::StatsComputed)?;
        Ok(EngineOutput::Stats { text: summary.text })
    }

    async fn execute(
        &self,
        state: &mut SessionState,
        cancel: &CancellationToken,
    ) -> Result<Option<EngineOutput>, SessionError> {
        let context = self.proposal_context(state).await?;

        let proposal = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SessionError::Cancelled),
            result = self.proposals.propose(&context) => result,
        };

        let attempt = match proposal {
            Ok(Proposal::Answer(text) | Proposal::Clarify(text)) => {
                state.set_pending_message(text.clone());
                self.apply(state, StepEvent::Replied)?;
                return Ok(Some(EngineOutput::Chat { text }));
            }
            Ok(Proposal::Code(code)) => {
                let outcome = self.attempt_code(state, &code, cancel).await?;
                outcome.map(|handle| (handle, code))
            }
            Err(e) => Err(e),
        };

        match attempt {
            Ok((handle, code)) => {
                state.commit(handle);
                let text = format!("✅ Success: {code}");
                state.set_pending_message(text.clone());
                self.apply(state, StepEvent::Committed)?;
                tracing::info!(session_id = %state.id(), handle = %handle, "transformation committed");
                Ok(Some(EngineOutput::Chat { text }))
            }
            Err(error) => {
                let description = error.to_string();
                state.set_last_error(description.clone());
                let failures = state.increment_retry();

                match self.retry.on_failure(failures, &description) {
                    RetryDecision::Retry { next_attempt } => {
                        tracing::warn!(
                            session_id = %state.id(),
                            attempt = failures,
                            next_attempt,
                            error = %description,
                            "attempt failed, retrying"
                        );
                        self.apply(state, StepEvent::RetryScheduled)?;
                        Ok(None)
                    }
                    RetryDecision::Exhausted { message } => {
                        tracing::warn!(
                            session_id = %state.id(),
                            attempts = failures,
                            error = %description,
                            "retries exhausted"
                        );
                        state.set_pending_message(message.clone());
                        self.apply(state, StepEvent::RetriesExhausted)?;
                        Ok(Some(EngineOutput::Chat { text: message }))
                    }
                }
            }
        }
    }

    /// Record the undo entry, run `code` under the deadline and store the
    /// result. The outer error is structural; the inner one is a failed
    /// attempt for the retry controller.
    async fn attempt_code(
        &self,
        state: &mut SessionState,
        code: &str,
        cancel: &CancellationToken,
    ) -> Result<Result<DatasetHandle, AttemptError>, SessionError> {
        let handle = state.current().ok_or(SessionError::NotLoaded)?;
        let blob = self.store.read(&handle).await?;
        state.record_before_change(self.describe(code))?;

        let timeout = self.settings.execution_timeout;
        let run = tokio::time::timeout(timeout, self.runner.run(code, &blob));
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SessionError::Cancelled),
            result = run => result,
        };

        let output = match result {
            Err(_elapsed) => {
                return Ok(Err(AttemptError::Timeout {
                    secs: timeout.as_secs(),
                }));
            }
            Ok(Err(e)) => return Ok(Err(e)),
            Ok(Ok(output)) => output,
        };

        if let Err(e) = self.codec.summarize(&output) {
            return Ok(Err(AttemptError::Execution(format!(
                "code did not produce a valid dataset: {e}"
            ))));
        }

        let new_handle = self.store.write(output.into()).await?;
        Ok(Ok(new_handle))
    }

    fn undo(&self, state: &mut SessionState) -> Result<EngineOutput, SessionError> {
        let outcome = state.revert();
        let text = outcome.message();
        tracing::info!(session_id = %state.id(), outcome = %text, "undo");

        state.set_pending_message(text.clone());
        self.apply(state, StepEvent::Reverted)?;
        Ok(EngineOutput::Chat { text })
    }

    fn reset(&self, state: &mut SessionState) -> Result<EngineOutput, SessionError> {
        let original = state.reset_to_original()?;
        tracing::info!(session_id = %state.id(), handle = %original, "reset to original");

        state.set_pending_message(RESET_MESSAGE);
        self.apply(state, StepEvent::ResetApplied)?;
        Ok(EngineOutput::Chat {
            text: RESET_MESSAGE.to_string(),
        })
    }

    async fn export(&self, state: &mut SessionState) -> Result<EngineOutput, SessionError> {
        let handle = state.current().ok_or(SessionError::NotLoaded)?;
        let filename = state
            .take_export_filename()
            .unwrap_or_else(|| self.settings.default_export_filename.clone());
        let path = self.settings.export_dir.join(&filename);
        let blob = self.store.read(&handle).await?;

        let text = match self.codec.export(&blob, &path).await {
            Ok(summary) => {
                let (rows, cols) = summary.shape();
                tracing::info!(session_id = %state.id(), handle = %handle, path = %path.display(), "dataset exported");
                format!("💾 Saved '{}' | Shape: ({rows}, {cols})", path.display())
            }
            Err(e) => {
                tracing::warn!(session_id = %state.id(), path = %path.display(), error = %e, "export failed");
                format!("❌ Export failed: {e}")
            }
        };

        state.set_pending_message(text.clone());
        self.apply(state, StepEvent::ExportFinished)?;
        Ok(EngineOutput::Chat { text })
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Take the transition for `event` and apply its bookkeeping: every
    /// transition other than a retry clears the last error and the retry
    /// counter.
    fn apply(&self, state: &mut SessionState, event: StepEvent) -> Result<Step, SessionError> {
        let from = state.step();
        let to = transition(from, event).map_err(|e| SessionError::InvalidStep {
            step: from,
            reason: e.to_string(),
        })?;

        if event != StepEvent::RetryScheduled {
            state.clear_last_error();
            state.reset_retry();
        }
        state.set_step(to);

        tracing::debug!(
            session_id = %state.id(),
            from = %from,
            to = %to,
            event = %event,
            retry = state.retry_count(),
            "step transition"
        );
        Ok(to)
    }

    async fn proposal_context(&self, state: &SessionState) -> Result<ProposalContext, SessionError> {
        let stats_summary = match state.stats_summary() {
            Some(text) => text.to_string(),
            None => {
                let handle = state.current().ok_or(SessionError::NotLoaded)?;
                let blob = self.store.read(&handle).await?;
                self.codec.summarize(&blob)?.text
            }
        };
        let failures = state.retry_count();

        Ok(ProposalContext {
            stats_summary,
            user_message: state.pending_message().to_string(),
            prior_error: state.last_error().map(str::to_string),
            retry_number: (failures > 0).then_some(failures),
            max_retries: self.retry.max_retries(),
        })
    }

    /// Undo entry description for a code attempt.
    fn describe(&self, code: &str) -> String {
        let flattened = code.split_whitespace().collect::<Vec<_>>().join(" ");
        let preview: String = flattened
            .chars()
            .take(self.settings.description_preview_chars)
            .collect();
        format!("Code: {preview}...")
    }

    /// Abandon a command whose turn was dropped before reaching a
    /// suspension point. Undo entries it pushed stay; each points at a
    /// dataset the session already held.
    fn recover_interrupted(&self, state: &mut SessionState) {
        let step = state.step();
        if step.is_suspension_point() || state.current().is_none() {
            return;
        }
        tracing::warn!(
            session_id = %state.id(),
            step = %step,
            undo_depth = state.history().len(),
            "recovering interrupted command"
        );
        self.abandon_command(state);
    }

    /// Drop the command in progress after a structural failure.
    fn abandon_command(&self, state: &mut SessionState) {
        state.set_export_filename(None);
        if state.current().is_some() && state.step() != Step::Terminal {
            state.set_step(Step::AwaitInput);
            state.clear_last_error();
            state.reset_retry();
        }
    }
}

/// True when a step only scheduled another attempt at `Execute`.
fn is_retry_loop(before: (Step, u32), after: (Step, u32)) -> bool {
    before.0 == Step::Execute && after.0 == Step::Execute && after.1 > before.1
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use tabula_types::dataset::{ColumnKind, ColumnSummary, DatasetSummary};
    use tabula_types::error::DatasetError;
    use tabula_types::session::{RevertOutcome, SessionId};

    use super::*;
    use crate::snapshot::memory::InMemorySnapshotStore;

    const THREE_ROWS: &str = "name,age\nann,30\nbob,\ncid,41\n";
    const TWO_ROWS: &str = "name,age\nann,30\ncid,41\n";

    // -- Fakes ---------------------------------------------------------------

    /// Minimal comma-separated codec: header line plus rows of equal width.
    struct FakeCodec;

    impl DatasetCodec for FakeCodec {
        fn summarize(&self, blob: &[u8]) -> Result<DatasetSummary, DatasetError> {
            let text = std::str::from_utf8(blob).map_err(|e| DatasetError::Invalid(e.to_string()))?;
            let mut lines = text.lines().filter(|l| !l.is_empty());
            let header: Vec<&str> = lines.next().ok_or(DatasetError::Empty)?.split(',').collect();
            let mut rows = 0;
            for line in lines {
                if line.split(',').count() != header.len() {
                    return Err(DatasetError::Invalid(format!("ragged row: {line}")));
                }
                rows += 1;
            }
            let columns = header
                .iter()
                .map(|name| ColumnSummary {
                    name: name.to_string(),
                    kind: ColumnKind::Text,
                    missing: 0,
                    unique: 0,
                    min: None,
                    max: None,
                    mean: None,
                    top: None,
                })
                .collect::<Vec<_>>();
            Ok(DatasetSummary {
                rows,
                text: format!("Shape: ({rows}, {})", columns.len()),
                columns,
                duplicate_rows: 0,
            })
        }

        fn preview(&self, _blob: &[u8], _limit: usize) -> Result<Vec<serde_json::Value>, DatasetError> {
            Ok(Vec::new())
        }

        async fn import(&self, path: &Path) -> Result<Vec<u8>, DatasetError> {
            Ok(tokio::fs::read(path).await?)
        }

        async fn export(&self, blob: &[u8], path: &Path) -> Result<DatasetSummary, DatasetError> {
            let summary = self.summarize(blob)?;
            tokio::fs::write(path, blob).await?;
            Ok(summary)
        }
    }

    #[derive(Default)]
    struct ScriptedProposals {
        script: Mutex<VecDeque<Result<Proposal, AttemptError>>>,
        contexts: Mutex<Vec<ProposalContext>>,
    }

    impl ScriptedProposals {
        fn new(script: Vec<Result<Proposal, AttemptError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                contexts: Mutex::default(),
            }
        }

        fn contexts(&self) -> Vec<ProposalContext> {
            self.contexts.lock().unwrap().clone()
        }
    }

    impl ProposalGenerator for ScriptedProposals {
        async fn propose(&self, context: &ProposalContext) -> Result<Proposal, AttemptError> {
            self.contexts.lock().unwrap().push(context.clone());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AttemptError::ProposalUnavailable("script exhausted".into())))
        }
    }

    #[derive(Default)]
    struct ScriptedRunner {
        script: Mutex<VecDeque<Result<Vec<u8>, AttemptError>>>,
        inputs: Mutex<Vec<Vec<u8>>>,
        hang: bool,
    }

    impl ScriptedRunner {
        fn new(script: Vec<Result<Vec<u8>, AttemptError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                ..Default::default()
            }
        }

        fn hanging() -> Self {
            Self {
                hang: true,
                ..Default::default()
            }
        }

        fn calls(&self) -> usize {
            self.inputs.lock().unwrap().len()
        }
    }

    impl CodeRunner for ScriptedRunner {
        async fn run(&self, _code: &str, dataset: &[u8]) -> Result<Vec<u8>, AttemptError> {
            self.inputs.lock().unwrap().push(dataset.to_vec());
            if self.hang {
                std::future::pending::<()>().await;
            }
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AttemptError::Execution("no scripted result".into())))
        }
    }

    type TestEngine = WorkflowEngine<InMemorySnapshotStore, ScriptedProposals, ScriptedRunner, FakeCodec>;

    // -- Helpers -------------------------------------------------------------

    fn settings(export_dir: &Path) -> EngineSettings {
        EngineSettings::from_config(&EngineConfig::default(), export_dir)
    }

    fn build(
        proposals: Vec<Result<Proposal, AttemptError>>,
        runner: ScriptedRunner,
        settings: EngineSettings,
    ) -> TestEngine {
        WorkflowEngine::new(
            InMemorySnapshotStore::new(),
            ScriptedProposals::new(proposals),
            runner,
            FakeCodec,
            settings,
        )
    }

    fn code(s: &str) -> Result<Proposal, AttemptError> {
        Ok(Proposal::Code(s.to_string()))
    }

    fn exec_err(s: &str) -> Result<Vec<u8>, AttemptError> {
        Err(AttemptError::Execution(s.to_string()))
    }

    fn chat(text: &str) -> InboundMessage {
        InboundMessage::Chat {
            text: text.to_string(),
        }
    }

    async fn loaded(engine: &TestEngine) -> (SessionState, DatasetHandle) {
        let mut state = SessionState::new(SessionId::new());
        let handle = engine
            .load(&mut state, THREE_ROWS.as_bytes().to_vec())
            .await
            .unwrap();
        let turn = engine
            .advance(&mut state, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(turn.halted_at, Step::AwaitInput);
        (state, handle)
    }

    async fn content(engine: &TestEngine, handle: Option<DatasetHandle>) -> String {
        let blob = engine.store().read(&handle.unwrap()).await.unwrap();
        String::from_utf8(blob.to_vec()).unwrap()
    }

    // -- Load ----------------------------------------------------------------

    #[tokio::test]
    async fn test_load_runs_to_await_input_with_stats() {
        let dir = tempfile::tempdir().unwrap();
        let engine = build(vec![], ScriptedRunner::default(), settings(dir.path()));
        let mut state = SessionState::new(SessionId::new());

        let handle = engine
            .load(&mut state, THREE_ROWS.as_bytes().to_vec())
            .await
            .unwrap();
        assert_eq!(state.step(), Step::Analyze);
        assert_eq!(state.original(), Some(handle));
        assert_eq!(state.current(), Some(handle));

        let turn = engine
            .advance(&mut state, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            turn.outputs,
            vec![EngineOutput::Stats {
                text: "Shape: (3, 2)".to_string()
            }]
        );
        assert_eq!(turn.halted_at, Step::AwaitInput);
    }

    #[tokio::test]
    async fn test_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.csv");
        std::fs::write(&path, THREE_ROWS).unwrap();
        let engine = build(vec![], ScriptedRunner::default(), settings(dir.path()));
        let mut state = SessionState::new(SessionId::new());

        let handle = engine.load_path(&mut state, &path).await.unwrap();
        assert_eq!(content(&engine, Some(handle)).await, THREE_ROWS);
    }

    #[tokio::test]
    async fn test_second_load_is_immutability_violation() {
        let dir = tempfile::tempdir().unwrap();
        let engine = build(vec![], ScriptedRunner::default(), settings(dir.path()));
        let (mut state, original) = loaded(&engine).await;

        let err = engine
            .load(&mut state, TWO_ROWS.as_bytes().to_vec())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::ImmutabilityViolation { existing, .. } if existing == original
        ));
        assert_eq!(state.original(), Some(original));
        assert_eq!(state.current(), Some(original));
        assert_eq!(state.step(), Step::AwaitInput);
    }

    #[tokio::test]
    async fn test_load_invalid_dataset_leaves_session_at_upload() {
        let dir = tempfile::tempdir().unwrap();
        let engine = build(vec![], ScriptedRunner::default(), settings(dir.path()));
        let mut state = SessionState::new(SessionId::new());

        let err = engine.load(&mut state, Vec::new()).await.unwrap_err();
        assert!(matches!(err, SessionError::Dataset(_)));
        assert_eq!(state.step(), Step::Upload);
        assert!(state.original().is_none());
    }

    #[tokio::test]
    async fn test_submit_before_load_is_invalid_step() {
        let dir = tempfile::tempdir().unwrap();
        let engine = build(vec![], ScriptedRunner::default(), settings(dir.path()));
        let mut state = SessionState::new(SessionId::new());

        let err = engine.submit(&mut state, chat("drop nulls")).unwrap_err();
        assert!(matches!(err, SessionError::InvalidStep { step: Step::Upload, .. }));
    }

    // -- Execute -------------------------------------------------------------

    #[tokio::test]
    async fn test_transform_then_undo_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let engine = build(
            vec![code("df = df.dropna()")],
            ScriptedRunner::new(vec![Ok(TWO_ROWS.as_bytes().to_vec())]),
            settings(dir.path()),
        );
        let (mut state, original) = loaded(&engine).await;
        let cancel = CancellationToken::new();

        let turn = engine
            .respond(&mut state, chat("drop rows with missing age"), &cancel)
            .await
            .unwrap();
        assert_eq!(
            turn.outputs,
            vec![
                EngineOutput::Chat {
                    text: "✅ Success: df = df.dropna()".to_string()
                },
                EngineOutput::Stats {
                    text: "Shape: (2, 2)".to_string()
                },
            ]
        );
        assert_eq!(content(&engine, state.current()).await, TWO_ROWS);
        assert_eq!(state.original(), Some(original));
        assert_eq!(content(&engine, state.original()).await, THREE_ROWS);
        assert_eq!(state.history().len(), 1);
        assert_eq!(state.history()[0].description, "Code: df = df.dropna()...");
        assert_eq!(state.history()[0].prior_handle, original);

        // The runner saw the dataset as it was before the change.
        assert_eq!(engine.runner.inputs.lock().unwrap()[0], THREE_ROWS.as_bytes());

        let turn = engine.respond(&mut state, chat("undo"), &cancel).await.unwrap();
        assert_eq!(
            turn.outputs[0],
            EngineOutput::Chat {
                text: "Undone: Code: df = df.dropna()...".to_string()
            }
        );
        assert_eq!(
            turn.outputs[1],
            EngineOutput::Stats {
                text: "Shape: (3, 2)".to_string()
            }
        );
        assert_eq!(state.current(), Some(original));
        assert_eq!(content(&engine, state.current()).await, THREE_ROWS);
    }

    #[tokio::test]
    async fn test_answer_and_clarify_return_to_await_input() {
        let dir = tempfile::tempdir().unwrap();
        let engine = build(
            vec![
                Ok(Proposal::Answer("age has 1 missing value".to_string())),
                Ok(Proposal::Clarify("mean or median?".to_string())),
            ],
            ScriptedRunner::default(),
            settings(dir.path()),
        );
        let (mut state, original) = loaded(&engine).await;
        let cancel = CancellationToken::new();

        let turn = engine
            .respond(&mut state, chat("how many nulls in age?"), &cancel)
            .await
            .unwrap();
        assert_eq!(
            turn.outputs,
            vec![EngineOutput::Chat {
                text: "age has 1 missing value".to_string()
            }]
        );
        assert_eq!(state.pending_message(), "age has 1 missing value");

        let turn = engine
            .respond(&mut state, chat("fill the gaps"), &cancel)
            .await
            .unwrap();
        assert_eq!(turn.halted_at, Step::AwaitInput);
        assert_eq!(state.pending_message(), "mean or median?");
        assert_eq!(state.retry_count(), 0);
        assert_eq!(state.current(), Some(original));
        assert_eq!(engine.runner.calls(), 0);
        assert!(state.history().is_empty());
    }

    #[tokio::test]
    async fn test_context_carries_stats_and_user_message() {
        let dir = tempfile::tempdir().unwrap();
        let engine = build(
            vec![Ok(Proposal::Answer("ok".to_string()))],
            ScriptedRunner::default(),
            settings(dir.path()),
        );
        let (mut state, _) = loaded(&engine).await;

        engine
            .respond(&mut state, chat("  describe age please "), &CancellationToken::new())
            .await
            .unwrap();
        let ctx = &engine.proposals.contexts()[0];
        assert_eq!(ctx.stats_summary, "Shape: (3, 2)");
        assert_eq!(ctx.user_message, "describe age please");
        assert!(ctx.prior_error.is_none());
        assert!(ctx.retry_number.is_none());
        assert_eq!(ctx.max_retries, 3);
    }

    #[tokio::test]
    async fn test_retry_bound_with_always_failing_runner() {
        let dir = tempfile::tempdir().unwrap();
        let engine = build(
            vec![code("df = df[df.x > 0]"), code("df = df[df.y > 0]"), code("df = df[df.z > 0]")],
            ScriptedRunner::new(vec![
                exec_err("KeyError: 'x'"),
                exec_err("KeyError: 'y'"),
                exec_err("KeyError: 'z'"),
            ]),
            settings(dir.path()),
        );
        let (mut state, original) = loaded(&engine).await;

        let turn = engine
            .respond(&mut state, chat("keep positive rows"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(engine.runner.calls(), 3);
        assert_eq!(turn.halted_at, Step::AwaitInput);
        assert_eq!(
            turn.outputs,
            vec![EngineOutput::Chat {
                text: "❌ Failed after 3 attempts. Last error: KeyError: 'z'".to_string()
            }]
        );
        assert_eq!(state.retry_count(), 0);
        assert!(state.last_error().is_none());
        assert_eq!(state.current(), Some(original));

        // Failed attempts keep their undo entries; each points at the unchanged dataset.
        assert_eq!(state.history().len(), 3);
        assert!(state.history().iter().all(|e| e.prior_handle == original));
    }

    #[tokio::test]
    async fn test_fails_twice_then_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let engine = build(
            vec![code("a"), code("b"), code("df = df.head(2)")],
            ScriptedRunner::new(vec![
                exec_err("NameError: name 'a' is not defined"),
                exec_err("NameError: name 'b' is not defined"),
                Ok(TWO_ROWS.as_bytes().to_vec()),
            ]),
            settings(dir.path()),
        );
        let (mut state, original) = loaded(&engine).await;
        let cancel = CancellationToken::new();

        assert_eq!(engine.submit(&mut state, chat("keep two rows")).unwrap(), None);
        assert_eq!(state.step(), Step::Execute);

        // Attempt 1 fails: self-loop, counter and error recorded.
        assert_eq!(engine.step(&mut state, &cancel).await.unwrap(), None);
        assert_eq!(state.step(), Step::Execute);
        assert_eq!(state.retry_count(), 1);
        assert_eq!(state.last_error(), Some("NameError: name 'a' is not defined"));

        // Attempt 2 fails.
        assert_eq!(engine.step(&mut state, &cancel).await.unwrap(), None);
        assert_eq!(state.retry_count(), 2);

        // Attempt 3 commits and leaves Execute with a cleared counter.
        let output = engine.step(&mut state, &cancel).await.unwrap();
        assert!(matches!(output, Some(EngineOutput::Chat { text }) if text.starts_with("✅ Success")));
        assert_eq!(state.step(), Step::Analyze);
        assert_eq!(state.retry_count(), 0);
        assert!(state.last_error().is_none());
        assert_ne!(state.current(), Some(original));

        let contexts = engine.proposals.contexts();
        assert_eq!(contexts.len(), 3);
        assert_eq!(contexts[1].retry_number, Some(1));
        assert_eq!(
            contexts[1].prior_error.as_deref(),
            Some("NameError: name 'a' is not defined")
        );
        assert_eq!(contexts[2].retry_number, Some(2));
        assert_eq!(contexts[2].user_message, "keep two rows");
    }

    #[tokio::test]
    async fn test_parse_failure_counts_against_same_bound() {
        let dir = tempfile::tempdir().unwrap();
        let engine = build(
            vec![
                Err(AttemptError::ProposalParse("no JSON object in response".into())),
                code("df = df.head(2)"),
            ],
            ScriptedRunner::new(vec![Ok(TWO_ROWS.as_bytes().to_vec())]),
            settings(dir.path()),
        );
        let (mut state, _) = loaded(&engine).await;

        let turn = engine
            .respond(&mut state, chat("keep two rows"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(turn.halted_at, Step::AwaitInput);
        assert_eq!(content(&engine, state.current()).await, TWO_ROWS);
        let contexts = engine.proposals.contexts();
        assert!(contexts[1]
            .prior_error
            .as_deref()
            .unwrap()
            .contains("could not parse proposal"));
    }

    #[tokio::test]
    async fn test_mixed_failures_exhaust_shared_bound() {
        let dir = tempfile::tempdir().unwrap();
        let engine = build(
            vec![
                Err(AttemptError::ProposalParse("garbage".into())),
                code("df = broken"),
                Err(AttemptError::ProposalUnavailable("503".into())),
            ],
            ScriptedRunner::new(vec![exec_err("NameError: name 'broken' is not defined")]),
            settings(dir.path()),
        );
        let (mut state, _) = loaded(&engine).await;

        let turn = engine
            .respond(&mut state, chat("fix it"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(engine.proposals.contexts().len(), 3);
        assert!(turn.outputs[0].text().starts_with("❌ Failed after 3 attempts"));
        assert!(turn.outputs[0].text().contains("503"));
        assert_eq!(state.retry_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_runner_output_is_a_failed_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings(dir.path());
        s.max_retries = 1;
        let engine = build(
            vec![code("df = 1")],
            ScriptedRunner::new(vec![Ok(b"a,b\n1\n".to_vec())]),
            s,
        );
        let (mut state, original) = loaded(&engine).await;

        let turn = engine
            .respond(&mut state, chat("break it"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(turn.outputs[0].text().contains("did not produce a valid dataset"));
        assert_eq!(state.current(), Some(original));
    }

    #[tokio::test]
    async fn test_runner_timeout_is_a_failed_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings(dir.path());
        s.max_retries = 1;
        s.execution_timeout = Duration::from_millis(50);
        let engine = build(vec![code("while True: pass")], ScriptedRunner::hanging(), s);
        let (mut state, original) = loaded(&engine).await;

        let turn = engine
            .respond(&mut state, chat("spin"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(turn.halted_at, Step::AwaitInput);
        assert!(turn.outputs[0].text().contains("timed out"));
        assert_eq!(state.current(), Some(original));
    }

    #[tokio::test]
    async fn test_cancellation_abandons_command() {
        let dir = tempfile::tempdir().unwrap();
        let engine = build(vec![code("df = df")], ScriptedRunner::hanging(), settings(dir.path()));
        let (mut state, original) = loaded(&engine).await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = engine
            .respond(&mut state, chat("spin"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Cancelled));
        assert_eq!(state.step(), Step::AwaitInput);
        assert_eq!(state.current(), Some(original));
        assert_eq!(state.retry_count(), 0);
    }

    #[tokio::test]
    async fn test_step_guard_stops_runaway_turn() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = build(vec![code("a")], ScriptedRunner::default(), settings(dir.path()));
        let (mut state, original) = loaded(&engine).await;
        engine.settings.max_steps_per_turn = 0;

        let err = engine
            .respond(&mut state, chat("go"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidStep { step: Step::Execute, .. }));
        assert_eq!(engine.runner.calls(), 0);
        assert_eq!(state.step(), Step::AwaitInput);
        assert_eq!(state.retry_count(), 0);
        assert_eq!(state.current(), Some(original));
    }

    #[tokio::test]
    async fn test_retries_do_not_count_against_step_guard() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings(dir.path());
        s.max_retries = 60;
        s.max_steps_per_turn = 5;
        let proposals = (0..60).map(|i| code(&format!("df = df.drop(columns=['c{i}'])"))).collect();
        let failures = (0..60).map(|i| exec_err(&format!("KeyError: 'c{i}'"))).collect();
        let engine = build(proposals, ScriptedRunner::new(failures), s);
        let (mut state, original) = loaded(&engine).await;

        let turn = engine
            .respond(&mut state, chat("drop the c columns"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(engine.runner.calls(), 60);
        assert_eq!(turn.halted_at, Step::AwaitInput);
        assert_eq!(
            turn.outputs,
            vec![EngineOutput::Chat {
                text: "❌ Failed after 60 attempts. Last error: KeyError: 'c59'".to_string()
            }]
        );
        assert_eq!(state.current(), Some(original));
    }

    #[test]
    fn test_is_retry_loop() {
        assert!(is_retry_loop((Step::Execute, 0), (Step::Execute, 1)));
        assert!(!is_retry_loop((Step::Execute, 2), (Step::AwaitInput, 0)));
        assert!(!is_retry_loop((Step::Analyze, 0), (Step::AwaitInput, 0)));
    }

    #[tokio::test]
    async fn test_dropped_turn_is_recovered_on_next_message() {
        let dir = tempfile::tempdir().unwrap();
        let engine = build(
            vec![code("df = df.dropna()"), Ok(Proposal::Answer("Hi there".to_string()))],
            ScriptedRunner::hanging(),
            settings(dir.path()),
        );
        let (mut state, original) = loaded(&engine).await;

        let cancel = CancellationToken::new();
        let dropped = tokio::time::timeout(
            Duration::from_millis(20),
            engine.respond(&mut state, chat("drop rows"), &cancel),
        )
        .await;
        assert!(dropped.is_err());
        assert_eq!(state.step(), Step::Execute);
        assert_eq!(state.history().len(), 1);

        let turn = engine.respond(&mut state, chat("hello"), &cancel).await.unwrap();
        assert_eq!(
            turn.outputs,
            vec![EngineOutput::Chat {
                text: "Hi there".to_string()
            }]
        );
        assert_eq!(turn.halted_at, Step::AwaitInput);
        assert_eq!(state.current(), Some(original));

        // The interrupted attempt's entry reverts to the unchanged dataset.
        assert_eq!(state.history().len(), 1);
        assert_eq!(state.history()[0].prior_handle, original);
    }

    #[tokio::test]
    async fn test_dropped_analyze_is_recovered_on_next_message() {
        let dir = tempfile::tempdir().unwrap();
        let engine = build(vec![], ScriptedRunner::default(), settings(dir.path()));
        let mut state = SessionState::new(SessionId::new());
        engine
            .load(&mut state, THREE_ROWS.as_bytes().to_vec())
            .await
            .unwrap();
        assert_eq!(state.step(), Step::Analyze);

        let turn = engine
            .respond(&mut state, chat("stats"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            turn.outputs,
            vec![EngineOutput::Stats {
                text: "Shape: (3, 2)".to_string()
            }]
        );
        assert_eq!(turn.halted_at, Step::AwaitInput);
    }

    // -- Undo / reset / stats ------------------------------------------------

    #[tokio::test]
    async fn test_undo_with_empty_stack_is_soft() {
        let dir = tempfile::tempdir().unwrap();
        let engine = build(vec![], ScriptedRunner::default(), settings(dir.path()));
        let (mut state, original) = loaded(&engine).await;

        let turn = engine
            .respond(&mut state, chat("undo"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(turn.outputs[0].text(), RevertOutcome::NothingToUndo.message());
        assert_eq!(turn.halted_at, Step::AwaitInput);
        assert_eq!(state.current(), Some(original));
        assert_eq!(state.original(), Some(original));
    }

    #[tokio::test]
    async fn test_reset_restores_original_and_clears_history() {
        let dir = tempfile::tempdir().unwrap();
        let engine = build(
            vec![code("df = df.head(2)")],
            ScriptedRunner::new(vec![Ok(TWO_ROWS.as_bytes().to_vec())]),
            settings(dir.path()),
        );
        let (mut state, original) = loaded(&engine).await;
        let cancel = CancellationToken::new();

        engine.respond(&mut state, chat("keep two"), &cancel).await.unwrap();
        assert_ne!(state.current(), Some(original));

        let turn = engine.respond(&mut state, chat("reset"), &cancel).await.unwrap();
        assert_eq!(turn.outputs[0].text(), RESET_MESSAGE);
        assert_eq!(turn.outputs[1].text(), "Shape: (3, 2)");
        assert_eq!(state.current(), Some(original));
        assert!(state.history().is_empty());
    }

    #[tokio::test]
    async fn test_stats_command_skips_generator() {
        let dir = tempfile::tempdir().unwrap();
        let engine = build(vec![], ScriptedRunner::default(), settings(dir.path()));
        let (mut state, _) = loaded(&engine).await;

        let turn = engine
            .respond(&mut state, chat("stats"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            turn.outputs,
            vec![EngineOutput::Stats {
                text: "Shape: (3, 2)".to_string()
            }]
        );
        assert!(engine.proposals.contexts().is_empty());
    }

    #[tokio::test]
    async fn test_empty_input_stays_at_await_input() {
        let dir = tempfile::tempdir().unwrap();
        let engine = build(vec![], ScriptedRunner::default(), settings(dir.path()));
        let (mut state, _) = loaded(&engine).await;

        let turn = engine
            .respond(&mut state, chat("   "), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            turn.outputs,
            vec![EngineOutput::Chat {
                text: EMPTY_INPUT_MESSAGE.to_string()
            }]
        );
        assert_eq!(turn.halted_at, Step::AwaitInput);
    }

    // -- Export / quit -------------------------------------------------------

    #[tokio::test]
    async fn test_export_named_file_reads_current_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let engine = build(
            vec![code("df = df.head(2)")],
            ScriptedRunner::new(vec![Ok(TWO_ROWS.as_bytes().to_vec())]),
            settings(dir.path()),
        );
        let (mut state, _) = loaded(&engine).await;
        let cancel = CancellationToken::new();
        engine.respond(&mut state, chat("keep two"), &cancel).await.unwrap();

        engine.submit(&mut state, chat("export sales.csv")).unwrap();
        assert_eq!(state.step(), Step::Export);

        let output = engine.step(&mut state, &cancel).await.unwrap().unwrap();
        assert!(output.text().contains("sales.csv"));
        assert!(output.text().contains("Shape: (2, 2)"));
        assert_eq!(state.step(), Step::AwaitInput);

        let written = std::fs::read_to_string(dir.path().join("sales.csv")).unwrap();
        assert_eq!(written, TWO_ROWS);
    }

    #[tokio::test]
    async fn test_export_message_uses_default_filename() {
        let dir = tempfile::tempdir().unwrap();
        let engine = build(vec![], ScriptedRunner::default(), settings(dir.path()));
        let (mut state, _) = loaded(&engine).await;

        let turn = engine
            .respond(
                &mut state,
                InboundMessage::Export { filename: None },
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(turn.halted_at, Step::AwaitInput);
        assert!(turn.outputs[0].text().contains("cleaned.csv"));
        assert!(dir.path().join("cleaned.csv").exists());
    }

    #[tokio::test]
    async fn test_export_failure_is_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let engine = build(
            vec![],
            ScriptedRunner::default(),
            settings(&dir.path().join("missing-dir")),
        );
        let (mut state, _) = loaded(&engine).await;

        let turn = engine
            .respond(&mut state, chat("export out.csv"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(turn.outputs[0].text().starts_with("❌ Export failed"));
        assert_eq!(turn.halted_at, Step::AwaitInput);
    }

    #[tokio::test]
    async fn test_quit_reaches_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let engine = build(vec![], ScriptedRunner::default(), settings(dir.path()));
        let (mut state, _) = loaded(&engine).await;

        let turn = engine
            .respond(&mut state, chat("quit"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(turn.is_terminal());
        assert!(turn.outputs.is_empty());

        let err = engine.submit(&mut state, chat("undo")).unwrap_err();
        assert!(matches!(err, SessionError::InvalidStep { step: Step::Terminal, .. }));
    }

    #[tokio::test]
    async fn test_finish_ends_session() {
        let dir = tempfile::tempdir().unwrap();
        let engine = build(vec![], ScriptedRunner::default(), settings(dir.path()));
        let (mut state, _) = loaded(&engine).await;

        engine.finish(&mut state).unwrap();
        assert_eq!(state.step(), Step::Terminal);
        assert!(engine.finish(&mut state).is_err());
    }

    #[test]
    fn test_describe_truncates_and_flattens() {
        let engine = build(vec![], ScriptedRunner::default(), EngineSettings::default());
        let long = format!("df = df.assign(\n    x={})", "1".repeat(100));
        let description = engine.describe(&long);
        assert!(description.starts_with("Code: df = df.assign( x=111"));
        assert!(description.ends_with("..."));
        assert_eq!(description.chars().count(), "Code: ".len() + 60 + 3);
    }
}
