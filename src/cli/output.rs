use std::fmt::Write as FmtWrite;

use serde::Serialize;

use crate::models::OutputFormat;

pub trait Formatter {
    fn format_run_summary(&self, summary: &RunSummary) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_error(&self, error: &str) -> String;
}

/// Outcome of one `run` invocation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub texts: usize,
    pub batches: usize,
    pub embeddings_inserted: usize,
    pub responses_inserted: usize,
    pub database: String,
    pub embedding_collection: String,
    pub response_collection: String,
    pub duration_ms: u64,
}

pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_run_summary(&self, summary: &RunSummary) -> String {
        let mut output = String::new();
        writeln!(output, "Run Complete").unwrap();
        writeln!(output, "------------").unwrap();
        writeln!(output, "Texts processed: {}", summary.texts).unwrap();
        writeln!(output, "Batches: {}", summary.batches).unwrap();
        writeln!(
            output,
            "Embeddings inserted: {} ({}.{})",
            summary.embeddings_inserted, summary.database, summary.embedding_collection
        )
        .unwrap();
        writeln!(
            output,
            "Responses inserted: {} ({}.{})",
            summary.responses_inserted, summary.database, summary.response_collection
        )
        .unwrap();
        writeln!(output, "Duration: {}ms", summary.duration_ms).unwrap();
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}\n", error)
    }
}

pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }
}

impl Formatter for JsonFormatter {
    fn format_run_summary(&self, summary: &RunSummary) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(summary)
        } else {
            serde_json::to_string(summary)
        };
        let mut output =
            rendered.unwrap_or_else(|e| serde_json::json!({"error": e.to_string()}).to_string());
        output.push('\n');
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", serde_json::json!({"message": message}))
    }

    fn format_error(&self, error: &str) -> String {
        format!("{}\n", serde_json::json!({"error": error}))
    }
}

pub struct MarkdownFormatter;

impl Formatter for MarkdownFormatter {
    fn format_run_summary(&self, summary: &RunSummary) -> String {
        let mut output = String::new();
        writeln!(output, "## Run Complete\n").unwrap();
        writeln!(output, "| Metric | Value |").unwrap();
        writeln!(output, "|--------|-------|").unwrap();
        writeln!(output, "| Texts processed | {} |", summary.texts).unwrap();
        writeln!(output, "| Batches | {} |", summary.batches).unwrap();
        writeln!(
            output,
            "| Embeddings inserted | {} (`{}.{}`) |",
            summary.embeddings_inserted, summary.database, summary.embedding_collection
        )
        .unwrap();
        writeln!(
            output,
            "| Responses inserted | {} (`{}.{}`) |",
            summary.responses_inserted, summary.database, summary.response_collection
        )
        .unwrap();
        writeln!(output, "| Duration | {}ms |", summary.duration_ms).unwrap();
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("> {}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("> **Error:** {}\n", error)
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
        OutputFormat::Markdown => Box::new(MarkdownFormatter),
    }
}
