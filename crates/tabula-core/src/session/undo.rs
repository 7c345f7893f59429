//! Per-session undo log.

use chrono::Utc;

use tabula_types::dataset::DatasetHandle;
use tabula_types::session::UndoEntry;

/// Ordered log of undo entries with stack discipline: push before mutate,
/// pop on undo.
#[derive(Debug, Clone, Default)]
pub struct UndoStack {
    entries: Vec<UndoEntry>,
}

impl UndoStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, description: String, prior_handle: DatasetHandle) {
        self.entries.push(UndoEntry {
            description,
            prior_handle,
            recorded_at: Utc::now(),
        });
    }

    pub fn pop(&mut self) -> Option<UndoEntry> {
        self.entries.pop()
    }

    pub fn peek(&self) -> Option<&UndoEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries oldest first.
    pub fn entries(&self) -> &[UndoEntry] {
        &self.entries
    }
}
