//! Human- and spreadsheet-facing run reports.
//!
//! [`ResultsTracker`] appends one row per run to a comparison CSV (pass@1
//! through pass@10, token counts, estimated cost), [`render_summary`]
//! prints the pass@k table, and [`write_score_json`] saves a score report.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDateTime;

use crate::scorer::ScoreReport;
use crate::usage::UsageSnapshot;

/// pass@k columns carried by the comparison CSV.
pub const CSV_KS: std::ops::RangeInclusive<usize> = 1..=10;

const CSV_HEADER: &[&str] = &[
    "Approach/Framework",
    "Dataset/Benchmark",
    "pass@1",
    "pass@2",
    "pass@3",
    "pass@4",
    "pass@5",
    "pass@6",
    "pass@7",
    "pass@8",
    "pass@9",
    "pass@10",
    "Time (sec)",
    "Input Tokens",
    "Output Tokens",
    "Total Tokens",
    "Estimated Cost ($)",
    "Timestamp",
    "Model",
    "Tasks",
    "Samples per Task",
];

/// USD per 1K tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPrice {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

const PRICES: &[(&str, ModelPrice)] = &[
    (
        "gpt-4o",
        ModelPrice {
            input_per_1k: 0.005,
            output_per_1k: 0.015,
        },
    ),
    (
        "gpt-4o-mini",
        ModelPrice {
            input_per_1k: 0.00015,
            output_per_1k: 0.0006,
        },
    ),
    (
        "gpt-4",
        ModelPrice {
            input_per_1k: 0.03,
            output_per_1k: 0.06,
        },
    ),
    (
        "gpt-3.5-turbo",
        ModelPrice {
            input_per_1k: 0.001,
            output_per_1k: 0.002,
        },
    ),
];

/// Price for `model`; models missing from the table are priced as gpt-4o.
pub fn price_for(model: &str) -> ModelPrice {
    PRICES
        .iter()
        .find(|(name, _)| *name == model)
        .unwrap_or(&PRICES[0])
        .1
}

pub fn estimate_cost(model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
    let price = price_for(model);
    input_tokens as f64 / 1000.0 * price.input_per_1k
        + output_tokens as f64 / 1000.0 * price.output_per_1k
}

/// One run as it appears in the comparison CSV.
#[derive(Debug, Clone)]
pub struct RunRow<'a> {
    pub approach: &'a str,
    pub benchmark: &'a str,
    pub score: &'a ScoreReport,
    pub elapsed_secs: f64,
    pub usage: UsageSnapshot,
    pub timestamp: NaiveDateTime,
    pub model: &'a str,
    pub tasks: usize,
    pub samples_per_task: usize,
}

impl RunRow<'_> {
    pub fn estimated_cost(&self) -> f64 {
        estimate_cost(self.model, self.usage.input_tokens, self.usage.output_tokens)
    }

    fn fields(&self) -> Vec<String> {
        let mut fields = vec![self.approach.to_string(), self.benchmark.to_string()];
        fields.extend(CSV_KS.map(|k| self.score.display_value(k)));
        fields.extend([
            format!("{:.2}", self.elapsed_secs),
            self.usage.input_tokens.to_string(),
            self.usage.output_tokens.to_string(),
            self.usage.total_tokens().to_string(),
            format!("{:.4}", self.estimated_cost()),
            self.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            self.model.to_string(),
            self.tasks.to_string(),
            self.samples_per_task.to_string(),
        ]);
        fields
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn csv_line<S: AsRef<str>>(fields: &[S]) -> String {
    let mut line = fields
        .iter()
        .map(|f| csv_field(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    line.push('\n');
    line
}

/// Appends one row per run to a CSV file shared across runs.
#[derive(Debug, Clone)]
pub struct ResultsTracker {
    path: PathBuf,
}

impl ResultsTracker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `row`, writing the header first when the file is new or empty.
    pub fn append(&self, row: &RunRow<'_>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| format!("create {:?}", parent))?;
        }
        let needs_header = std::fs::metadata(&self.path)
            .map(|m| m.len() == 0)
            .unwrap_or(true);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open {:?}", self.path))?;

        let mut content = String::new();
        if needs_header {
            content.push_str(&csv_line(CSV_HEADER));
        }
        content.push_str(&csv_line(&row.fields()));
        file.write_all(content.as_bytes())
            .with_context(|| format!("append to {:?}", self.path))?;
        Ok(())
    }
}

/// Human-readable run summary printed by the CLI.
pub fn render_summary(report: &ScoreReport, usage: Option<&UsageSnapshot>, model: &str) -> String {
    let (samples, passed) = report.totals();
    let mut out = String::new();
    out.push_str(&format!(
        "Problems: {}  Samples: {}  Passed: {}\n",
        report.problems.len(),
        samples,
        passed
    ));
    for entry in &report.corpus {
        let value = report.display_value(entry.k);
        if entry.excluded > 0 {
            out.push_str(&format!(
                "  pass@{:<2} {}  ({} problems, {} excluded)\n",
                entry.k, value, entry.included, entry.excluded
            ));
        } else {
            out.push_str(&format!("  pass@{:<2} {}\n", entry.k, value));
        }
    }
    if let Some(usage) = usage {
        out.push_str(&format!(
            "Tokens: {} input + {} output = {} total  Requests: {} ({} failed)\n",
            usage.input_tokens,
            usage.output_tokens,
            usage.total_tokens(),
            usage.requests,
            usage.failed_attempts
        ));
        out.push_str(&format!(
            "Estimated cost: ${:.4}\n",
            estimate_cost(model, usage.input_tokens, usage.output_tokens)
        ));
    }
    out
}

/// Write a score report as pretty JSON.
pub fn write_score_json(path: &Path, report: &ScoreReport) -> Result<()> {
    let content = serde_json::to_string_pretty(report).context("serialize score report")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}
