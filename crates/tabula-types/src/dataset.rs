//! Dataset identity and summary types.
//!
//! A [`DatasetHandle`] is an opaque reference to an immutable blob held by a
//! snapshot store. Sessions only ever hold handles; the blobs themselves are
//! owned by the store.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque reference to an immutable dataset version.
///
/// Handles are minted by a snapshot store on write and are never reused
/// for different content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetHandle(pub Uuid);

impl DatasetHandle {
    /// Mint a fresh, time-sortable handle.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for DatasetHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DatasetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DatasetHandle {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// A value that may be assigned at most once.
///
/// Assigning the same value again is accepted as a no-op; assigning a
/// different value is rejected and leaves the slot untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WriteOnce<T>(Option<T>);

impl<T> Default for WriteOnce<T> {
    fn default() -> Self {
        Self(None)
    }
}

impl<T: PartialEq> WriteOnce<T> {
    /// Create an empty slot.
    pub fn empty() -> Self {
        Self(None)
    }

    /// Assign the slot. On conflict the rejected value is handed back.
    pub fn set(&mut self, value: T) -> Result<(), T> {
        match self.0.as_ref() {
            Some(existing) if *existing == value => return Ok(()),
            Some(_) => return Err(value),
            None => {}
        }
        self.0 = Some(value);
        Ok(())
    }

    pub fn get(&self) -> Option<&T> {
        self.0.as_ref()
    }

    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }
}

/// Inferred kind of a tabular column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Numeric,
    Text,
    /// Every cell is missing.
    Empty,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKind::Numeric => write!(f, "numeric"),
            ColumnKind::Text => write!(f, "text"),
            ColumnKind::Empty => write!(f, "empty"),
        }
    }
}

/// Per-column statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub name: String,
    pub kind: ColumnKind,
    pub missing: usize,
    pub unique: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
    /// Most frequent value for text columns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top: Option<String>,
}

/// Statistics for a whole dataset version.
///
/// `text` is the rendered form handed to the user on entry to `Analyze` and
/// to the proposal generator as its statistics context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub rows: usize,
    pub columns: Vec<ColumnSummary>,
    pub duplicate_rows: usize,
    pub text: String,
}

impl DatasetSummary {
    /// `(rows, columns)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.columns.len())
    }
}
