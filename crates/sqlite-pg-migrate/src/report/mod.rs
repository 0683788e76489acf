//! Per-table and run-level migration results.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::project::SkipReason;

/// Example `(column, value)` pairs shown per reason in the text summary.
const EXAMPLES_PER_REASON: usize = 3;

/// How a table's migration ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TableStatus {
    Completed,
    Skipped { reason: String },
    Failed { error: String },
}

/// One row that was skipped or could not be inserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowIssue {
    pub table: String,
    /// Offending column, or the primary key column for failed inserts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    pub value: String,
    pub reason: String,
}

/// Counts and issues for one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableReport {
    pub table: String,
    #[serde(flatten)]
    pub status: TableStatus,
    pub total_source_rows: u64,
    pub inserted: u64,
    pub duplicates: u64,
    pub skipped: u64,
    pub failed: u64,
    /// First issues of the table, capped; the counts above are exact.
    pub issues: Vec<RowIssue>,
    /// Exact number of skipped or failed rows per reason.
    #[serde(default)]
    pub reasons: BTreeMap<String, u64>,
    #[serde(skip)]
    max_issues: usize,
}

impl TableReport {
    pub fn new(table: impl Into<String>, max_issues: usize) -> Self {
        Self {
            table: table.into(),
            status: TableStatus::Completed,
            total_source_rows: 0,
            inserted: 0,
            duplicates: 0,
            skipped: 0,
            failed: 0,
            issues: Vec::new(),
            reasons: BTreeMap::new(),
            max_issues,
        }
    }

    /// Mark the table as not migrated at all.
    pub fn skip(&mut self, reason: impl Into<String>) {
        self.status = TableStatus::Skipped {
            reason: reason.into(),
        };
    }

    pub fn record_skip(&mut self, reason: &SkipReason) {
        self.skipped += 1;
        self.push_issue(RowIssue {
            table: self.table.clone(),
            column: Some(reason.column().to_string()),
            value: reason.value().to_string(),
            reason: reason.reason().to_string(),
        });
    }

    /// Record a row the target rejected. `key` identifies the source row.
    pub fn record_failure(&mut self, column: Option<&str>, key: &str, error: &str) {
        self.failed += 1;
        self.push_issue(RowIssue {
            table: self.table.clone(),
            column: column.map(str::to_string),
            value: key.to_string(),
            reason: error.to_string(),
        });
    }

    /// Record the outcome of an insert of `attempted` rows.
    pub fn record_insert(&mut self, attempted: u64, affected: u64) {
        self.inserted += affected;
        self.duplicates += attempted.saturating_sub(affected);
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = TableStatus::Failed {
            error: error.into(),
        };
    }

    fn push_issue(&mut self, issue: RowIssue) {
        *self.reasons.entry(issue.reason.clone()).or_default() += 1;
        if self.issues.len() < self.max_issues {
            self.issues.push(issue);
        }
    }

    /// One line per reason: its exact count and the first recorded
    /// `column=value` examples, e.g. `missing reference: 2 (user_id=8, user_id=9)`.
    pub fn reason_summary(&self) -> Vec<String> {
        self.reasons
            .iter()
            .map(|(reason, count)| {
                let examples: Vec<String> = self
                    .issues
                    .iter()
                    .filter(|i| &i.reason == reason)
                    .take(EXAMPLES_PER_REASON)
                    .map(|i| match &i.column {
                        Some(column) => format!("{}={}", column, i.value),
                        None => i.value.clone(),
                    })
                    .collect();
                if examples.is_empty() {
                    format!("{}: {}", reason, count)
                } else {
                    format!("{}: {} ({})", reason, count, examples.join(", "))
                }
            })
            .collect()
    }

    /// Rows accounted for so far.
    pub fn processed(&self) -> u64 {
        self.inserted + self.duplicates + self.skipped + self.failed
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, TableStatus::Failed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, TableStatus::Skipped { .. })
    }
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status: "completed" or "completed_with_errors".
    pub status: String,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Whether rows were only projected, not written.
    pub dry_run: bool,

    /// Tables in the order they were processed.
    pub tables: Vec<TableReport>,

    pub total_source_rows: u64,
    pub inserted: u64,
    pub duplicates: u64,
    pub skipped: u64,
    pub failed: u64,

    /// Names of tables that failed.
    pub failed_tables: Vec<String>,
}

impl MigrationReport {
    /// Aggregate per-table reports into the run summary.
    pub fn new(
        run_id: String,
        started_at: DateTime<Utc>,
        dry_run: bool,
        tables: Vec<TableReport>,
    ) -> Self {
        let completed_at = Utc::now();
        let duration_seconds = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;
        let sum = |f: fn(&TableReport) -> u64| tables.iter().map(f).sum::<u64>();

        let failed_tables: Vec<String> = tables
            .iter()
            .filter(|t| t.is_failed())
            .map(|t| t.table.clone())
            .collect();
        let failed = sum(|t| t.failed);

        let status = if failed_tables.is_empty() && failed == 0 {
            "completed"
        } else {
            "completed_with_errors"
        };

        Self {
            run_id,
            status: status.to_string(),
            started_at,
            completed_at,
            duration_seconds,
            dry_run,
            total_source_rows: sum(|t| t.total_source_rows),
            inserted: sum(|t| t.inserted),
            duplicates: sum(|t| t.duplicates),
            skipped: sum(|t| t.skipped),
            failed,
            failed_tables,
            tables,
        }
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn table(&self, name: &str) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.table == name)
    }

    /// Emit the per-table lines and the run summary through tracing.
    pub fn log_summary(&self) {
        for table in &self.tables {
            match &table.status {
                TableStatus::Completed => info!(
                    "{}: {} source rows, {} inserted, {} duplicates, {} skipped, {} failed",
                    table.table,
                    table.total_source_rows,
                    table.inserted,
                    table.duplicates,
                    table.skipped,
                    table.failed
                ),
                TableStatus::Skipped { reason } => info!("{}: skipped ({})", table.table, reason),
                TableStatus::Failed { error } => warn!(
                    "{}: failed after {} rows: {}",
                    table.table,
                    table.processed(),
                    error
                ),
            }
            for line in table.reason_summary() {
                warn!("{}:   {}", table.table, line);
            }
        }

        info!(
            "Migration {}{}: {} tables, {} source rows, {} inserted, {} duplicates, {} skipped, {} failed in {:.1}s",
            self.status,
            if self.dry_run { " (dry run)" } else { "" },
            self.tables.len(),
            self.total_source_rows,
            self.inserted,
            self.duplicates,
            self.skipped,
            self.failed,
            self.duration_seconds
        );
    }
}
