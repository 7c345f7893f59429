//! CsvCodec -- [`DatasetCodec`] for comma-separated text with a header row.
//!
//! Column kinds are inferred the way a dataframe reader would: a column whose
//! present values all parse as numbers is numeric, a column with no present
//! values is empty, anything else is text. Cells that are blank or hold a
//! conventional null marker count as missing.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::path::Path;

use tabula_core::dataset::DatasetCodec;
use tabula_types::dataset::{ColumnKind, ColumnSummary, DatasetSummary};
use tabula_types::error::DatasetError;

/// Cell values treated as missing.
const NULL_MARKERS: &[&str] = &["", "na", "n/a", "nan", "null", "none", "<na>"];

/// CSV implementation of [`DatasetCodec`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvCodec;

impl CsvCodec {
    pub fn new() -> Self {
        Self
    }

    fn reader(blob: &[u8]) -> csv::Reader<&[u8]> {
        csv::ReaderBuilder::new().has_headers(true).from_reader(blob)
    }

    fn headers(reader: &mut csv::Reader<&[u8]>) -> Result<Vec<String>, DatasetError> {
        let headers = reader
            .headers()
            .map_err(|e| DatasetError::Invalid(e.to_string()))?;
        if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
            return Err(DatasetError::Empty);
        }
        Ok(headers.iter().map(|h| h.trim().to_string()).collect())
    }
}

fn is_missing(cell: &str) -> bool {
    NULL_MARKERS.contains(&cell.trim().to_lowercase().as_str())
}

// ---------------------------------------------------------------------------
// Per-column accumulation
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ColumnStats {
    missing: usize,
    counts: HashMap<String, usize>,
    all_numeric: bool,
    sum: f64,
    min: Option<f64>,
    max: Option<f64>,
    numeric_count: usize,
}

impl ColumnStats {
    fn new() -> Self {
        Self {
            all_numeric: true,
            ..Default::default()
        }
    }

    fn observe(&mut self, cell: &str) {
        if is_missing(cell) {
            self.missing += 1;
            return;
        }
        let value = cell.trim();
        *self.counts.entry(value.to_string()).or_default() += 1;

        if !self.all_numeric {
            return;
        }
        match value.parse::<f64>() {
            Ok(n) if n.is_finite() => {
                self.numeric_count += 1;
                self.sum += n;
                self.min = Some(self.min.map_or(n, |m| m.min(n)));
                self.max = Some(self.max.map_or(n, |m| m.max(n)));
            }
            _ => self.all_numeric = false,
        }
    }

    fn finish(self, name: String) -> ColumnSummary {
        let kind = if self.counts.is_empty() {
            ColumnKind::Empty
        } else if self.all_numeric {
            ColumnKind::Numeric
        } else {
            ColumnKind::Text
        };
        let numeric = kind == ColumnKind::Numeric;

        // Most frequent value; ties go to the lexically smallest for stable output.
        let top = (kind == ColumnKind::Text)
            .then(|| {
                self.counts
                    .iter()
                    .max_by(|(a, ca), (b, cb)| ca.cmp(cb).then_with(|| b.cmp(a)))
                    .map(|(value, _)| value.clone())
            })
            .flatten();

        ColumnSummary {
            name,
            kind,
            missing: self.missing,
            unique: self.counts.len(),
            min: if numeric { self.min } else { None },
            max: if numeric { self.max } else { None },
            mean: (numeric && self.numeric_count > 0).then(|| self.sum / self.numeric_count as f64),
            top,
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{n:.0}")
    } else {
        format!("{n:.2}")
    }
}

/// Plain-text rendering handed to the user and to the proposal generator.
fn render(rows: usize, duplicate_rows: usize, columns: &[ColumnSummary]) -> String {
    let mut text = format!("Shape: ({rows}, {})", columns.len());
    let _ = write!(text, "\nDuplicate rows: {duplicate_rows}");
    text.push_str("\nColumns:");

    for col in columns {
        let kind = match col.kind {
            ColumnKind::Numeric => "numeric",
            ColumnKind::Text => "text",
            ColumnKind::Empty => "empty",
        };
        let pct = if rows == 0 {
            0.0
        } else {
            col.missing as f64 * 100.0 / rows as f64
        };
        let _ = write!(
            text,
            "\n  - {} ({kind}): missing {} ({pct:.1}%), unique {}",
            col.name, col.missing, col.unique
        );
        if let (Some(min), Some(max), Some(mean)) = (col.min, col.max, col.mean) {
            let _ = write!(
                text,
                ", min {}, max {}, mean {}",
                format_number(min),
                format_number(max),
                format_number(mean)
            );
        }
        if let Some(top) = &col.top {
            let _ = write!(text, ", top '{top}'");
        }
    }
    text
}

impl DatasetCodec for CsvCodec {
    fn summarize(&self, blob: &[u8]) -> Result<DatasetSummary, DatasetError> {
        let mut reader = Self::reader(blob);
        let headers = Self::headers(&mut reader)?;

        let mut stats: Vec<ColumnStats> = headers.iter().map(|_| ColumnStats::new()).collect();
        let mut seen = HashSet::new();
        let mut rows = 0;
        let mut duplicate_rows = 0;

        for record in reader.records() {
            let record = record.map_err(|e| DatasetError::Invalid(e.to_string()))?;
            for (column, cell) in stats.iter_mut().zip(record.iter()) {
                column.observe(cell);
            }
            let key: Vec<String> = record.iter().map(str::to_string).collect();
            if !seen.insert(key) {
                duplicate_rows += 1;
            }
            rows += 1;
        }

        let columns: Vec<ColumnSummary> = headers
            .into_iter()
            .zip(stats)
            .map(|(name, column)| column.finish(name))
            .collect();
        let text = render(rows, duplicate_rows, &columns);

        Ok(DatasetSummary {
            rows,
            columns,
            duplicate_rows,
            text,
        })
    }

    fn preview(&self, blob: &[u8], limit: usize) -> Result<Vec<serde_json::Value>, DatasetError> {
        let mut reader = Self::reader(blob);
        let headers = Self::headers(&mut reader)?;

        reader
            .records()
            .take(limit)
            .map(|record| {
                let record = record.map_err(|e| DatasetError::Invalid(e.to_string()))?;
                let object = headers
                    .iter()
                    .zip(record.iter())
                    .map(|(name, cell)| {
                        let value = if is_missing(cell) {
                            serde_json::Value::Null
                        } else {
                            serde_json::Value::String(cell.to_string())
                        };
                        (name.clone(), value)
                    })
                    .collect::<serde_json::Map<_, _>>();
                Ok(serde_json::Value::Object(object))
            })
            .collect()
    }

    async fn import(&self, path: &Path) -> Result<Vec<u8>, DatasetError> {
        let blob = tokio::fs::read(path).await?;
        tracing::debug!(path = %path.display(), bytes = blob.len(), "dataset read");
        Ok(blob)
    }

    async fn export(&self, blob: &[u8], path: &Path) -> Result<DatasetSummary, DatasetError> {
        let summary = self.summarize(blob)?;
        tokio::fs::write(path, blob).await?;
        Ok(summary)
    }
}
