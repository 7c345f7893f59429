//! `tabula inspect`: column statistics without starting a session.

use std::path::Path;

use anyhow::Context;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use tabula_core::dataset::DatasetCodec;
use tabula_infra::dataset::CsvCodec;
use tabula_types::dataset::{ColumnKind, ColumnSummary, DatasetSummary};

/// Summarize `file` and print it as a table, or as JSON with `--json`.
pub async fn inspect(file: &Path, json: bool) -> anyhow::Result<()> {
    let codec = CsvCodec::new();
    let blob = codec
        .import(file)
        .await
        .with_context(|| format!("cannot read {}", file.display()))?;
    let summary = codec
        .summarize(&blob)
        .with_context(|| format!("{} is not a usable dataset", file.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let (rows, cols) = summary.shape();
    println!();
    println!(
        "  {} {}",
        style(file.display()).cyan().bold(),
        style(format!("({rows} rows, {cols} columns)")).dim()
    );
    println!();
    println!("{}", summary_table(&summary));
    println!();
    if summary.duplicate_rows > 0 {
        println!(
            "  {} {} duplicate row{}",
            style("!").yellow().bold(),
            summary.duplicate_rows,
            if summary.duplicate_rows == 1 { "" } else { "s" }
        );
        println!();
    }

    Ok(())
}

fn summary_table(summary: &DatasetSummary) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Column").fg(Color::White),
        Cell::new("Kind").fg(Color::White),
        Cell::new("Missing").fg(Color::White),
        Cell::new("Unique").fg(Color::White),
        Cell::new("Range / Top").fg(Color::White),
    ]);

    for column in &summary.columns {
        let kind_cell = match column.kind {
            ColumnKind::Numeric => Cell::new("numeric").fg(Color::Green),
            ColumnKind::Text => Cell::new("text").fg(Color::Blue),
            ColumnKind::Empty => Cell::new("empty").fg(Color::DarkGrey),
        };
        let missing_cell = if column.missing > 0 {
            Cell::new(missing_label(column, summary.rows)).fg(Color::Yellow)
        } else {
            Cell::new("0")
        };

        table.add_row(vec![
            Cell::new(&column.name).fg(Color::Cyan),
            kind_cell,
            missing_cell,
            Cell::new(column.unique),
            Cell::new(detail(column)).fg(Color::DarkGrey),
        ]);
    }

    table
}

fn missing_label(column: &ColumnSummary, rows: usize) -> String {
    if rows == 0 {
        return column.missing.to_string();
    }
    let pct = column.missing as f64 * 100.0 / rows as f64;
    format!("{} ({pct:.1}%)", column.missing)
}

fn detail(column: &ColumnSummary) -> String {
    match (column.min, column.max, column.mean) {
        (Some(min), Some(max), Some(mean)) => format!("{min} .. {max}, mean {mean:.2}"),
        _ => column
            .top
            .as_deref()
            .map(|top| format!("top '{top}'"))
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(kind: ColumnKind) -> ColumnSummary {
        ColumnSummary {
            name: "Age".to_string(),
            kind,
            missing: 1,
            unique: 3,
            min: None,
            max: None,
            mean: None,
            top: None,
        }
    }

    #[test]
    fn test_missing_label_has_percentage() {
        assert_eq!(missing_label(&column(ColumnKind::Numeric), 4), "1 (25.0%)");
        assert_eq!(missing_label(&column(ColumnKind::Numeric), 0), "1");
    }

    #[test]
    fn test_detail_numeric_range() {
        let mut c = column(ColumnKind::Numeric);
        c.min = Some(1.0);
        c.max = Some(80.0);
        c.mean = Some(29.699);
        assert_eq!(detail(&c), "1 .. 80, mean 29.70");
    }

    #[test]
    fn test_detail_text_top_value() {
        let mut c = column(ColumnKind::Text);
        c.top = Some("male".to_string());
        assert_eq!(detail(&c), "top 'male'");
        assert_eq!(detail(&column(ColumnKind::Empty)), "");
    }

    #[tokio::test]
    async fn test_inspect_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = inspect(&dir.path().join("absent.csv"), true).await.unwrap_err();
        assert!(err.to_string().contains("cannot read"));
    }
}
