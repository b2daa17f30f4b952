//! Table formatting utilities for CLI list commands
//!
//! List commands describe their columns once and hand typed rows to
//! [`TableFormatter`], which renders them as aligned TSV, CSV, markdown or
//! bare ids. Report-style views (recaps, statistics) use [`markdown_table`].

use chrono::{DateTime, Local, Utc};
use console::style;
use miette::{IntoDiagnostic, Result};
use tabled::{builder::Builder, settings::Style};

use crate::cli::helpers::truncate_str;
use crate::cli::OutputFormat;

/// A typed cell value with semantic meaning for formatting
#[derive(Debug, Clone)]
pub enum CellValue {
    /// Record id (cyan)
    Id(i64),
    /// Plain text, truncated to the column width
    Text(String),
    /// Count of things (right aligned)
    Number(u64),
    /// Percentage with one decimal
    Percent(f64),
    /// DateTime displayed as date only
    Date(DateTime<Utc>),
    /// DateTime displayed with time
    DateTime(DateTime<Utc>),
    /// Empty/placeholder
    Empty,
}

impl CellValue {
    /// Format for TSV output (with colors if terminal)
    pub fn format_tsv(&self, width: usize) -> String {
        match self {
            CellValue::Id(id) => format!("{:<width$}", style(id).cyan(), width = width),
            CellValue::Text(s) => {
                let truncated = truncate_str(s, width.saturating_sub(2));
                format!("{:<width$}", truncated, width = width)
            }
            CellValue::Number(n) => format!("{:>width$}", n, width = width),
            CellValue::Percent(_) => format!("{:>width$}", self.raw(), width = width),
            CellValue::Date(_) | CellValue::DateTime(_) => {
                format!("{:<width$}", style(self.raw()).dim(), width = width)
            }
            CellValue::Empty => format!("{:<width$}", style("-").dim(), width = width),
        }
    }

    /// Format for markdown output
    pub fn format_md(&self) -> String {
        let raw = match self {
            CellValue::Empty => "-".to_string(),
            _ => self.raw(),
        };
        // Escape pipe characters for markdown tables
        raw.replace('|', "\\|")
    }

    /// Get raw string value (no formatting, for CSV and ID output)
    pub fn raw(&self) -> String {
        match self {
            CellValue::Id(id) => id.to_string(),
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => n.to_string(),
            CellValue::Percent(p) => format!("{:.1}%", p),
            CellValue::Date(dt) => {
                let local: DateTime<Local> = dt.with_timezone(&Local);
                local.format("%Y-%m-%d").to_string()
            }
            CellValue::DateTime(dt) => {
                let local: DateTime<Local> = dt.with_timezone(&Local);
                local.format("%Y-%m-%d %H:%M").to_string()
            }
            CellValue::Empty => String::new(),
        }
    }

    /// Get the display width of this cell's content (for dynamic column sizing)
    pub fn display_width(&self) -> usize {
        match self {
            CellValue::Text(s) => s.chars().count(),
            CellValue::Date(_) => 10,     // "YYYY-MM-DD"
            CellValue::DateTime(_) => 16, // "YYYY-MM-DD HH:MM"
            CellValue::Empty => 1,
            _ => self.raw().len(),
        }
    }
}

/// Column definition with header label and maximum width
#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub key: &'static str,
    pub header: &'static str,
    pub width: usize,
}

impl ColumnDef {
    pub const fn new(key: &'static str, header: &'static str, width: usize) -> Self {
        Self { key, header, width }
    }
}

/// A row of cell values for table output
pub struct TableRow {
    pub id: i64,
    pub cells: Vec<(&'static str, CellValue)>,
}

impl TableRow {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            cells: Vec::new(),
        }
    }

    pub fn cell(mut self, key: &'static str, value: CellValue) -> Self {
        self.cells.push((key, value));
        self
    }

    pub fn get(&self, key: &str) -> Option<&CellValue> {
        self.cells.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }
}

/// Table formatter that outputs rows in various formats
pub struct TableFormatter<'a> {
    columns: &'a [ColumnDef],
    record_name: &'static str,
    show_summary: bool,
}

impl<'a> TableFormatter<'a> {
    pub fn new(columns: &'a [ColumnDef], record_name: &'static str) -> Self {
        Self {
            columns,
            record_name,
            show_summary: true,
        }
    }

    /// Drop the "N record(s) found" line (for quiet mode)
    pub fn without_summary(mut self) -> Self {
        self.show_summary = false;
        self
    }

    /// Output rows in the specified format
    pub fn output<I>(&self, rows: I, format: OutputFormat) -> Result<()>
    where
        I: IntoIterator<Item = TableRow>,
    {
        let rows: Vec<TableRow> = rows.into_iter().collect();

        match format {
            OutputFormat::Csv => self.output_csv(&rows)?,
            OutputFormat::Md => self.output_md(&rows),
            OutputFormat::Id => self.output_ids(&rows),
            _ => self.output_tsv(&rows),
        }
        Ok(())
    }

    /// Calculate dynamic column widths based on actual content
    fn calculate_widths(&self, rows: &[TableRow]) -> Vec<usize> {
        let id_width = rows
            .iter()
            .map(|r| r.id.to_string().len())
            .max()
            .unwrap_or(2)
            .max(2); // "ID" header
        let mut widths = vec![id_width];

        for col in self.columns {
            let max_content = rows
                .iter()
                .filter_map(|r| r.get(col.key))
                .map(|v| v.display_width())
                .max()
                .unwrap_or(0);
            // truncate_str keeps width-2 characters of text
            let natural_width = col.header.len().max(max_content.saturating_add(2));
            widths.push(natural_width.min(col.width));
        }

        widths
    }

    fn output_tsv(&self, rows: &[TableRow]) {
        let widths = self.calculate_widths(rows);

        let mut header_parts = vec![format!(
            "{:<width$}",
            style("ID").bold().dim(),
            width = widths[0]
        )];
        for (col, width) in self.columns.iter().zip(&widths[1..]) {
            header_parts.push(format!("{:<width$}", style(col.header).bold(), width = *width));
        }
        println!("{}", header_parts.join(" "));

        let total_width: usize = widths.iter().sum::<usize>() + widths.len() - 1;
        println!("{}", "-".repeat(total_width));

        for row in rows {
            let mut parts = vec![CellValue::Id(row.id).format_tsv(widths[0])];
            for (col, width) in self.columns.iter().zip(&widths[1..]) {
                match row.get(col.key) {
                    Some(value) => parts.push(value.format_tsv(*width)),
                    None => parts.push(CellValue::Empty.format_tsv(*width)),
                }
            }
            println!("{}", parts.join(" "));
        }

        if self.show_summary {
            println!();
            println!("{} {}(s) found.", style(rows.len()).cyan(), self.record_name);
        }
    }

    fn output_csv(&self, rows: &[TableRow]) -> Result<()> {
        let mut writer = csv::Writer::from_writer(std::io::stdout());

        let mut headers = vec!["id"];
        headers.extend(self.columns.iter().map(|c| c.key));
        writer.write_record(&headers).into_diagnostic()?;

        for row in rows {
            let mut values = vec![row.id.to_string()];
            for col in self.columns {
                values.push(row.get(col.key).map(CellValue::raw).unwrap_or_default());
            }
            writer.write_record(&values).into_diagnostic()?;
        }
        writer.flush().into_diagnostic()?;
        Ok(())
    }

    fn output_md(&self, rows: &[TableRow]) {
        let mut headers = vec!["ID".to_string()];
        headers.extend(self.columns.iter().map(|c| c.header.to_string()));
        println!("| {} |", headers.join(" | "));

        let separators: Vec<&str> = headers.iter().map(|_| "---").collect();
        println!("|{}|", separators.join("|"));

        for row in rows {
            let mut values = vec![row.id.to_string()];
            for col in self.columns {
                values.push(
                    row.get(col.key)
                        .map(CellValue::format_md)
                        .unwrap_or_else(|| "-".to_string()),
                );
            }
            println!("| {} |", values.join(" | "));
        }
    }

    fn output_ids(&self, rows: &[TableRow]) {
        for row in rows {
            println!("{}", row.id);
        }
    }
}

/// Render a header plus records as a markdown table
pub fn markdown_table<I, R>(header: &[&str], records: I) -> String
where
    I: IntoIterator<Item = R>,
    R: IntoIterator<Item = String>,
{
    let mut builder = Builder::default();
    builder.push_record(header.iter().map(|h| h.to_string()));
    for record in records {
        builder.push_record(record);
    }
    builder.build().with(Style::markdown()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_value_text_format() {
        let cell = CellValue::Text("Hello World".to_string());
        assert_eq!(cell.raw(), "Hello World");
        assert_eq!(cell.display_width(), 11);

        let formatted = cell.format_tsv(8);
        assert!(formatted.starts_with("Hell..."));
    }

    #[test]
    fn test_cell_value_numbers() {
        assert_eq!(CellValue::Number(42).raw(), "42");
        assert_eq!(CellValue::Percent(33.333).raw(), "33.3%");
        assert_eq!(CellValue::Id(7).raw(), "7");
        assert_eq!(CellValue::Empty.raw(), "");
        assert_eq!(CellValue::Empty.format_md(), "-");
    }

    #[test]
    fn test_cell_value_md_escapes_pipes() {
        let cell = CellValue::Text("a|b".to_string());
        assert_eq!(cell.format_md(), "a\\|b");
    }

    #[test]
    fn test_table_row_builder() {
        let row = TableRow::new(3)
            .cell("name", CellValue::Text("Ada".to_string()))
            .cell("units", CellValue::Number(4));
        assert_eq!(row.id, 3);
        assert!(matches!(row.get("units"), Some(CellValue::Number(4))));
        assert!(row.get("missing").is_none());
    }

    #[test]
    fn test_widths_are_capped() {
        const COLUMNS: &[ColumnDef] = &[ColumnDef::new("name", "NAME", 10)];
        let formatter = TableFormatter::new(COLUMNS, "participant");
        let rows = vec![TableRow::new(12345).cell(
            "name",
            CellValue::Text("A very long participant name".to_string()),
        )];
        assert_eq!(formatter.calculate_widths(&rows), vec![5, 10]);
    }

    #[test]
    fn test_markdown_table() {
        let table = markdown_table(
            &["Metric", "Value"],
            vec![vec!["Units".to_string(), "12".to_string()]],
        );
        assert!(table.contains("| Metric | Value |"));
        assert!(table.contains("| Units  | 12    |"));
    }
}
