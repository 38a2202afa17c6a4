//! Output formatters for rows, plans and sync reports.

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use ormsync_core::sync::{TableAction, TablePlan};
use ormsync_core::{ResultSet, SyncPlan, SyncReport, TableOutcome, Value};

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
    /// CSV format
    Csv,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter {
    /// Format the rows of one table.
    fn format_rows(&self, rows: &ResultSet) -> String;

    /// Format a list of table names.
    fn format_tables(&self, tables: &[String]) -> String;

    /// Format a dry-run plan.
    fn format_plan(&self, plan: &SyncPlan) -> String;

    /// Format the report of a synchronization run.
    fn format_report(&self, report: &SyncReport) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Csv => Box::new(CsvFormatter),
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_rows(&self, rows: &ResultSet) -> String {
        let mut table = Table::new();
        table.set_header(rows.columns.iter().map(Cell::new));
        for row in rows.iter() {
            table.add_row(row.iter().map(|(_, value)| Cell::new(format_value(value))));
        }
        format!("{}\n{} row(s)", table, rows.len())
    }

    fn format_tables(&self, tables: &[String]) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Table"]);
        for name in tables {
            table.add_row(vec![name]);
        }
        table.to_string()
    }

    fn format_plan(&self, plan: &SyncPlan) -> String {
        if plan.is_noop() {
            return "Schema is up to date".to_string();
        }
        let mut table = Table::new();
        table.set_header(vec!["Table", "Action", "Details"]);
        for step in &plan.tables {
            table.add_row(vec![
                step.table.clone(),
                action_name(&step.action).to_string(),
                plan_details(step),
            ]);
        }
        table.to_string()
    }

    fn format_report(&self, report: &SyncReport) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Table", "Outcome", "Details"]);
        for entry in &report.tables {
            let mut details = outcome_details(&entry.outcome);
            if !entry.kept_columns.is_empty() {
                if !details.is_empty() {
                    details.push_str("; ");
                }
                details.push_str(&format!("kept {}", entry.kept_columns.join(", ")));
            }
            table.add_row(vec![
                entry.table.clone(),
                outcome_name(&entry.outcome).to_string(),
                details,
            ]);
        }

        let mut output = table.to_string();
        for cache in &report.caches {
            output.push_str(&format!(
                "\ncache {}: {} row(s) deleted",
                cache.table, cache.deleted
            ));
            if cache.unparsable > 0 {
                output.push_str(&format!(", {} unparsable row(s) kept", cache.unparsable));
            }
            if let Some(error) = &cache.error {
                output.push_str(&format!(" (error: {})", error));
            }
        }
        output.push_str(&format!("\n{} DDL statement(s)", report.ddl_statements));
        output
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_rows(&self, rows: &ResultSet) -> String {
        let array: Vec<serde_json::Value> = rows
            .iter()
            .map(|row| {
                let obj: serde_json::Map<String, serde_json::Value> = row
                    .iter()
                    .map(|(name, value)| (name.to_string(), value_to_json(value)))
                    .collect();
                serde_json::Value::Object(obj)
            })
            .collect();
        serde_json::to_string_pretty(&array).unwrap_or_else(|_| "[]".to_string())
    }

    fn format_tables(&self, tables: &[String]) -> String {
        serde_json::to_string_pretty(tables).unwrap_or_else(|_| "[]".to_string())
    }

    fn format_plan(&self, plan: &SyncPlan) -> String {
        serde_json::to_string_pretty(plan).unwrap_or_else(|_| "{}".to_string())
    }

    fn format_report(&self, report: &SyncReport) -> String {
        serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string())
    }
}

/// CSV formatter.
pub struct CsvFormatter;

impl Formatter for CsvFormatter {
    fn format_rows(&self, rows: &ResultSet) -> String {
        let mut output = rows.columns.join(",");
        output.push('\n');
        for row in rows.iter() {
            let cells: Vec<String> = row.iter().map(|(_, v)| format_value_csv(v)).collect();
            output.push_str(&cells.join(","));
            output.push('\n');
        }
        output
    }

    fn format_tables(&self, tables: &[String]) -> String {
        let mut output = String::from("table\n");
        for name in tables {
            output.push_str(&format!("{}\n", name));
        }
        output
    }

    fn format_plan(&self, plan: &SyncPlan) -> String {
        let mut output = String::from("table,action,details\n");
        for step in &plan.tables {
            output.push_str(&format!(
                "{},{},\"{}\"\n",
                step.table,
                action_name(&step.action),
                escape_csv(&plan_details(step))
            ));
        }
        output
    }

    fn format_report(&self, report: &SyncReport) -> String {
        let mut output = String::from("table,outcome,details\n");
        for entry in &report.tables {
            output.push_str(&format!(
                "{},{},\"{}\"\n",
                entry.table,
                outcome_name(&entry.outcome),
                escape_csv(&outcome_details(&entry.outcome))
            ));
        }
        output
    }
}

fn action_name(action: &TableAction) -> &'static str {
    match action {
        TableAction::Create => "create",
        TableAction::AddColumns { .. } => "add columns",
        TableAction::Rebuild { .. } => "rebuild",
        TableAction::Unchanged => "unchanged",
    }
}

fn plan_details(step: &TablePlan) -> String {
    let mut details = match &step.action {
        TableAction::AddColumns { columns } => columns.join(", "),
        TableAction::Rebuild { reason } => reason.to_string(),
        TableAction::Create | TableAction::Unchanged => String::new(),
    };
    if !step.kept_columns.is_empty() {
        if !details.is_empty() {
            details.push_str("; ");
        }
        details.push_str(&format!("keeping {}", step.kept_columns.join(", ")));
    }
    details
}

fn outcome_name(outcome: &TableOutcome) -> &'static str {
    match outcome {
        TableOutcome::Created => "created",
        TableOutcome::Altered { .. } => "altered",
        TableOutcome::Rebuilt { .. } => "rebuilt",
        TableOutcome::Unchanged => "unchanged",
        TableOutcome::Failed { .. } => "FAILED",
    }
}

fn outcome_details(outcome: &TableOutcome) -> String {
    match outcome {
        TableOutcome::Altered { added } => format!("added {}", added.join(", ")),
        TableOutcome::Rebuilt { rows } => format!("{} row(s) copied", rows),
        TableOutcome::Failed { reason } => reason.clone(),
        TableOutcome::Created | TableOutcome::Unchanged => String::new(),
    }
}

/// Format a Value as a display string.
fn format_value(value: &Value) -> String {
    match value {
        Value::Blob(b) => format!("<{} bytes>", b.len()),
        other => other.to_string(),
    }
}

/// Format a Value for CSV output.
fn format_value_csv(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Text(s) => format!("\"{}\"", escape_csv(s)),
        Value::Blob(b) => hex::encode(b),
        other => other.to_string(),
    }
}

/// Convert a Value to JSON. Blobs become hex strings.
fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Integer(i) => serde_json::Value::Number((*i).into()),
        Value::Real(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Blob(b) => serde_json::Value::String(hex::encode(b)),
    }
}

/// Escape a string for CSV.
fn escape_csv(s: &str) -> String {
    s.replace('"', "\"\"")
}
