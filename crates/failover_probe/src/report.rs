//! Human-readable output: progress sinks and the summary table.

use std::fmt::Write as _;

/// Appended to display text that was cut short.
pub const TRUNCATION_MARKER: &str = "...";

/// Display width of the SQL column in the summary table.
pub const SQL_COLUMN_WIDTH: usize = 40;

/// Width SQL text is truncated to inside the SQL column.
pub const SQL_DISPLAY_WIDTH: usize = 38;

/// Shortens `text` to at most `width` chars for display.
///
/// Text longer than `width` keeps its first `width - 3` chars followed by
/// [`TRUNCATION_MARKER`]. Widths too small to hold the marker get a plain cut.
pub fn truncate_display(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let marker_len = TRUNCATION_MARKER.chars().count();
    if width < marker_len {
        return text.chars().take(width).collect();
    }
    let mut out: String = text.chars().take(width - marker_len).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}

/// One line of the summary table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRow<'a> {
    pub name: &'a str,
    pub sql: &'a str,
    pub success: u64,
    pub failure: u64,
    pub avg_ms: u64,
}

/// Renders the end-of-run table, one row per input row in the given order.
pub fn render_summary_table<'a>(rows: impl IntoIterator<Item = SummaryRow<'a>>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "==== Summary Report ====");
    let header = format!(
        "{:<10} {:<SQL_COLUMN_WIDTH$} {:<10} {:<10} {:<10}",
        "Key", "SQL", "Success", "Failure", "Avg(ms)"
    );
    let _ = writeln!(out, "{}", header.trim_end());
    for row in rows {
        let line = format!(
            "{:<10} {:<SQL_COLUMN_WIDTH$} {:<10} {:<10} {:<10}",
            row.name,
            truncate_display(row.sql, SQL_DISPLAY_WIDTH),
            row.success,
            row.failure,
            row.avg_ms
        );
        let _ = writeln!(out, "{}", line.trim_end());
    }
    let _ = write!(out, "=========================");
    out
}

/// Destination for progress lines and failure observations.
pub trait Reporter: Send {
    /// Normal progress, written to standard output by the console sink.
    fn progress(&mut self, line: &str);
    /// Failure observations, written to standard error by the console sink.
    fn failure(&mut self, line: &str);
}

/// Writes progress to stdout and failures to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn progress(&mut self, line: &str) {
        println!("{line}");
    }

    fn failure(&mut self, line: &str) {
        eprintln!("{line}");
    }
}

/// Keeps every line in memory.
#[derive(Debug, Default, Clone)]
pub struct CaptureReporter {
    pub progress: Vec<String>,
    pub failures: Vec<String>,
}

impl Reporter for CaptureReporter {
    fn progress(&mut self, line: &str) {
        self.progress.push(line.to_string());
    }

    fn failure(&mut self, line: &str) {
        self.failures.push(line.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_to_exact_width_with_marker() {
        let sql = "SELECT 1 FROM very_long_table_name";
        let shown = truncate_display(sql, 10);
        assert_eq!(shown, "SELECT ...");
        assert_eq!(shown.chars().count(), 10);
        assert!(shown.ends_with(TRUNCATION_MARKER));
        assert_eq!(sql, "SELECT 1 FROM very_long_table_name");
    }

    #[test]
    fn short_text_is_untouched() {
        assert_eq!(truncate_display("SELECT 1", 10), "SELECT 1");
        assert_eq!(truncate_display("SELECT 123", 10), "SELECT 123");
    }

    #[test]
    fn truncation_counts_chars_not_bytes() {
        let shown = truncate_display("SELECT 'ééééééééé'", 10);
        assert_eq!(shown, "SELECT ...");
        assert_eq!(truncate_display("ééé", 3), "ééé");
        assert_eq!(truncate_display("éééé", 2), "éé");
    }

    #[test]
    fn summary_table_lists_rows_in_order() {
        let long_sql = "SELECT owner, table_name FROM all_tables WHERE owner = 'APP'";
        let table = render_summary_table([
            SummaryRow {
                name: "sql2",
                sql: long_sql,
                success: 3,
                failure: 0,
                avg_ms: 20,
            },
            SummaryRow {
                name: "sql1",
                sql: "SELECT 1",
                success: 0,
                failure: 0,
                avg_ms: 0,
            },
        ]);
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "==== Summary Report ====");
        assert!(lines[1].starts_with("Key        SQL"));
        assert!(lines[2].starts_with("sql2       SELECT owner, table_name FROM all_t..."));
        assert!(lines[2].ends_with("3          0          20"));
        assert!(lines[3].starts_with("sql1       SELECT 1 "));
        assert_eq!(lines[4], "=========================");
    }
}
