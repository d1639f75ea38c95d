use std::fmt::Write as _;

use crate::importer::{FileReport, FileStage, RunSummary};

const SUMMARY_HEADERS: [&str; 5] = ["file", "table", "status", "rows", "note"];

pub fn render_summary(summary: &RunSummary) -> String {
    let headers = SUMMARY_HEADERS.map(str::to_string).to_vec();
    let rows = summary.files.iter().map(summary_row).collect::<Vec<_>>();
    let mut output = render_table(&headers, &rows);
    let _ = writeln!(
        output,
        "{} file(s): {} row(s) inserted, {} skipped, {} failed",
        summary.files.len(),
        summary.rows_inserted(),
        summary.skipped(),
        summary.failed()
    );
    if !summary.violations.is_empty() {
        let _ = writeln!(
            output,
            "{} foreign key violation(s)",
            summary.violations.len()
        );
    }
    output
}

fn summary_row(file: &FileReport) -> Vec<String> {
    let name = file
        .path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let status = if file.is_failed() {
        "failed".to_string()
    } else {
        file.stage.to_string()
    };
    let note = if let Some(err) = &file.error {
        format!("during {}: {err}", file.stage)
    } else if let Some(reason) = &file.skipped {
        reason.to_string()
    } else if file.stage == FileStage::Done && file.rows_ignored() > 0 {
        format!("{} duplicate row(s) ignored", file.rows_ignored())
    } else {
        file.primary_key
            .as_ref()
            .map(|pk| format!("primary key {pk}"))
            .unwrap_or_default()
    };
    vec![
        name,
        file.table.clone(),
        status,
        file.rows_inserted.to_string(),
        note,
    ]
}

pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths = headers
        .iter()
        .map(|h| h.chars().count().max(1))
        .collect::<Vec<_>>();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(single_line(cell).chars().count());
        }
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers, &widths));
    let separator = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&separator, &widths));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths));
    }
    output
}

fn format_row(values: &[String], widths: &[usize]) -> String {
    let line = values
        .iter()
        .zip(widths)
        .map(|(value, width)| format!("{:<width$}", single_line(value), width = *width))
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}

fn single_line(value: &str) -> String {
    value.replace(['\n', '\r', '\t'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::SkipReason;
    use std::path::Path;

    #[test]
    fn table_columns_are_aligned() {
        let headers = vec!["id".to_string(), "name".to_string()];
        let rows = vec![
            vec!["1".to_string(), "Alice".to_string()],
            vec!["22".to_string(), "Bob\nSmith".to_string()],
        ];
        let rendered = render_table(&headers, &rows);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines, vec!["id  name", "--  ---------", "1   Alice", "22  Bob Smith"]);
    }

    #[test]
    fn summary_lists_outcomes_and_totals() {
        let mut done = FileReport::new(Path::new("csv/colors.csv"));
        done.stage = FileStage::Done;
        done.rows_processed = 5;
        done.rows_inserted = 3;
        let mut skipped = FileReport::new(Path::new("csv/big.csv"));
        skipped.stage = FileStage::Skipped;
        skipped.skipped = Some(SkipReason::TooLarge { rows: 20, limit: 10 });

        let summary = RunSummary {
            files: vec![done, skipped],
            violations: Vec::new(),
        };
        let rendered = render_summary(&summary);
        assert!(rendered.contains("colors.csv  colors  done     3     2 duplicate row(s) ignored"));
        assert!(rendered.contains("big.csv     big     skipped  0     20 rows > 10"));
        assert!(rendered.ends_with("2 file(s): 3 row(s) inserted, 1 skipped, 0 failed\n"));
    }
}
