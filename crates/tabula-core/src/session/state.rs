//! Session state: the record threaded through the workflow engine.
//!
//! Fields are private so the invariants hold at every observable boundary:
//! - the original handle is write-once;
//! - the current handle is set whenever the step is past `Upload`;
//! - undo entries only ever carry handles that were current at some point.
//!
//! The engine drives the crate-private mutators; adapters read through the
//! accessors or [`SessionState::view`].

use chrono::{DateTime, Utc};

use tabula_types::dataset::{DatasetHandle, WriteOnce};
use tabula_types::error::SessionError;
use tabula_types::session::{RevertOutcome, SessionId, SessionView, Step, UndoEntry};

use super::undo::UndoStack;

#[derive(Debug, Clone)]
pub struct SessionState {
    id: SessionId,
    original: WriteOnce<DatasetHandle>,
    current: Option<DatasetHandle>,
    undo: UndoStack,
    /// Latest inbound user text or outbound assistant text.
    pending_message: String,
    last_error: Option<String>,
    retry_count: u32,
    step: Step,
    /// Rendered statistics of the current dataset, refreshed on `Analyze`.
    stats_summary: Option<String>,
    /// Destination named by the export request being processed.
    export_filename: Option<String>,
    created_at: DateTime<Utc>,
}

impl SessionState {
    /// Fresh session at `Upload` with nothing loaded.
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            original: WriteOnce::empty(),
            current: None,
            undo: UndoStack::new(),
            pending_message: String::new(),
            last_error: None,
            retry_count: 0,
            step: Step::Upload,
            stats_summary: None,
            export_filename: None,
            created_at: Utc::now(),
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn original(&self) -> Option<DatasetHandle> {
        self.original.get().copied()
    }

    pub fn current(&self) -> Option<DatasetHandle> {
        self.current
    }

    pub fn undo_stack(&self) -> &UndoStack {
        &self.undo
    }

    /// Undo entries oldest first.
    pub fn history(&self) -> &[UndoEntry] {
        self.undo.entries()
    }

    pub fn pending_message(&self) -> &str {
        &self.pending_message
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn stats_summary(&self) -> Option<&str> {
        self.stats_summary.as_deref()
    }

    pub fn export_filename(&self) -> Option<&str> {
        self.export_filename.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            id: self.id,
            step: self.step,
            original: self.original(),
            current: self.current,
            undo_depth: self.undo.len(),
            retry_count: self.retry_count,
            history: self.undo.entries().to_vec(),
            created_at: self.created_at,
        }
    }

    // -----------------------------------------------------------------------
    // Handle operations
    // -----------------------------------------------------------------------

    /// Set the original handle. The first successful call also makes it the
    /// current handle.
    ///
    /// Re-assigning the same handle is a no-op. Any other value is rejected
    /// with `ImmutabilityViolation` and the session is left unchanged.
    pub fn set_original(&mut self, handle: DatasetHandle) -> Result<(), SessionError> {
        let first = !self.original.is_set();
        self.original.set(handle).map_err(|attempted| {
            // set() only fails when a value is already present.
            let existing = self.original.get().copied().unwrap_or(attempted);
            SessionError::ImmutabilityViolation {
                existing,
                attempted,
            }
        })?;
        if first {
            self.current = Some(handle);
        }
        Ok(())
    }

    /// Push `{description, current handle}` onto the undo log.
    ///
    /// Must be called strictly before the mutation it describes is committed.
    pub fn record_before_change(
        &mut self,
        description: impl Into<String>,
    ) -> Result<(), SessionError> {
        let prior = self.current.ok_or(SessionError::NotLoaded)?;
        self.undo.push(description.into(), prior);
        Ok(())
    }

    /// Pop the newest undo entry and restore its handle.
    ///
    /// An empty log is a soft outcome, not an error. The original handle is
    /// never touched.
    pub fn revert(&mut self) -> RevertOutcome {
        match self.undo.pop() {
            Some(entry) => {
                self.current = Some(entry.prior_handle);
                RevertOutcome::Reverted {
                    description: entry.description,
                    restored: entry.prior_handle,
                }
            }
            None => RevertOutcome::NothingToUndo,
        }
    }

    /// Make the original dataset current again and drop the undo log.
    pub fn reset_to_original(&mut self) -> Result<DatasetHandle, SessionError> {
        let original = self.original().ok_or(SessionError::NotLoaded)?;
        self.current = Some(original);
        self.undo.clear();
        Ok(original)
    }

    // -----------------------------------------------------------------------
    // Engine-driven mutators
    // -----------------------------------------------------------------------

    /// Commit a freshly written dataset version.
    pub(crate) fn commit(&mut self, handle: DatasetHandle) {
        self.current = Some(handle);
    }

    pub(crate) fn set_step(&mut self, step: Step) {
        self.step = step;
    }

    pub(crate) fn set_pending_message(&mut self, message: impl Into<String>) {
        self.pending_message = message.into();
    }

    pub(crate) fn set_last_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }

    pub(crate) fn clear_last_error(&mut self) {
        self.last_error = None;
    }

    /// Increment the retry counter and return the new value.
    pub(crate) fn increment_retry(&mut self) -> u32 {
        self.retry_count += 1;
        self.retry_count
    }

    pub(crate) fn reset_retry(&mut self) {
        self.retry_count = 0;
    }

    pub(crate) fn set_stats_summary(&mut self, text: String) {
        self.stats_summary = Some(text);
    }

    pub(crate) fn set_export_filename(&mut self, filename: Option<String>) {
        self.export_filename = filename;
    }

    pub(crate) fn take_export_filename(&mut self) -> Option<String> {
        self.export_filename.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded() -> (SessionState, DatasetHandle) {
        let mut state = SessionState::new(SessionId::new());
        let h = DatasetHandle::new();
        state.set_original(h).unwrap();
        (state, h)
    }

    #[test]
    fn test_new_session_is_empty() {
        let state = SessionState::new(SessionId::new());
        assert_eq!(state.step(), Step::Upload);
        assert!(state.original().is_none());
        assert!(state.current().is_none());
        assert!(state.undo_stack().is_empty());
        assert_eq!(state.retry_count(), 0);
        assert!(state.last_error().is_none());
    }

    #[test]
    fn test_set_original_sets_current() {
        let (state, h) = loaded();
        assert_eq!(state.original(), Some(h));
        assert_eq!(state.current(), Some(h));
    }

    #[test]
    fn test_set_original_twice_with_different_value_is_rejected() {
        let (mut state, h) = loaded();
        let changed = DatasetHandle::new();
        state.commit(changed);

        let other = DatasetHandle::new();
        let err = state.set_original(other).unwrap_err();
        match err {
            SessionError::ImmutabilityViolation {
                existing,
                attempted,
            } => {
                assert_eq!(existing, h);
                assert_eq!(attempted, other);
            }
            e => panic!("expected ImmutabilityViolation, got {e:?}"),
        }
        assert_eq!(state.original(), Some(h));
        assert_eq!(state.current(), Some(changed));
    }

    #[test]
    fn test_set_original_same_value_is_noop() {
        let (mut state, h) = loaded();
        let changed = DatasetHandle::new();
        state.commit(changed);
        state.set_original(h).unwrap();
        // current is not rewound by a repeated assignment
        assert_eq!(state.current(), Some(changed));
    }

    #[test]
    fn test_record_before_change_requires_dataset() {
        let mut state = SessionState::new(SessionId::new());
        let err = state.record_before_change("x").unwrap_err();
        assert!(matches!(err, SessionError::NotLoaded));
    }

    #[test]
    fn test_record_then_revert_restores_prior() {
        let (mut state, h) = loaded();
        state.record_before_change("Code: df = df.head(2)...").unwrap();
        let next = DatasetHandle::new();
        state.commit(next);

        let outcome = state.revert();
        assert_eq!(
            outcome,
            RevertOutcome::Reverted {
                description: "Code: df = df.head(2)...".to_string(),
                restored: h,
            }
        );
        assert_eq!(state.current(), Some(h));
        assert_eq!(state.original(), Some(h));
    }

    #[test]
    fn test_revert_on_empty_stack_is_soft() {
        let (mut state, h) = loaded();
        assert_eq!(state.revert(), RevertOutcome::NothingToUndo);
        assert_eq!(state.current(), Some(h));
        assert_eq!(state.original(), Some(h));
    }

    #[test]
    fn test_reset_to_original_clears_undo() {
        let (mut state, h) = loaded();
        state.record_before_change("a").unwrap();
        state.commit(DatasetHandle::new());
        state.record_before_change("b").unwrap();
        state.commit(DatasetHandle::new());

        assert_eq!(state.reset_to_original().unwrap(), h);
        assert_eq!(state.current(), Some(h));
        assert!(state.history().is_empty());
    }

    #[test]
    fn test_retry_counter() {
        let (mut state, _) = loaded();
        assert_eq!(state.increment_retry(), 1);
        assert_eq!(state.increment_retry(), 2);
        state.reset_retry();
        assert_eq!(state.retry_count(), 0);
    }

    #[test]
    fn test_view_reflects_state() {
        let (mut state, h) = loaded();
        state.record_before_change("a").unwrap();
        let view = state.view();
        assert_eq!(view.original, Some(h));
        assert_eq!(view.undo_depth, 1);
        assert_eq!(view.history[0].description, "a");
        assert_eq!(view.step, Step::Upload);
    }
}
