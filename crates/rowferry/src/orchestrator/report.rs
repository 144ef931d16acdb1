//! Run results.

use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::TransferCounters;
use crate::error::{Result, TransferError};

/// Final status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        })
    }
}

/// Outcome of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableResult {
    pub table: String,
    pub file: PathBuf,
    pub success: bool,
    pub counters: TransferCounters,
    /// Rows removed by the delete phase, if it ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<u64>,
    /// Per-row failure lines (`row 17: ...`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<String>,
    /// Why the table as a whole failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_seconds: f64,
}

impl TableResult {
    pub(crate) fn new(table: impl Into<String>, file: impl Into<PathBuf>) -> Self {
        Self {
            table: table.into(),
            file: file.into(),
            success: false,
            counters: TransferCounters::default(),
            deleted: None,
            failures: Vec::new(),
            error: None,
            duration_seconds: 0.0,
        }
    }

    pub(crate) fn failed(mut self, error: &TransferError) -> Self {
        self.success = false;
        self.error = Some(error.to_string());
        self
    }
}

/// Result of an export or import run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferReport {
    /// Unique run identifier.
    pub run_id: String,

    /// `export` or `import`.
    pub operation: String,

    pub status: RunStatus,

    pub started_at: DateTime<Utc>,

    pub completed_at: DateTime<Utc>,

    pub duration_seconds: f64,

    pub tables_total: usize,

    pub tables_success: usize,

    pub tables_failed: usize,

    /// Sum over all tables.
    pub rows: TransferCounters,

    pub failed_tables: Vec<String>,

    pub tables: Vec<TableResult>,

    #[serde(skip)]
    clock: Option<Instant>,
}

impl TransferReport {
    pub(crate) fn start(operation: &str, tables_total: usize) -> Self {
        let now = Utc::now();
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            operation: operation.to_string(),
            status: RunStatus::Completed,
            started_at: now,
            completed_at: now,
            duration_seconds: 0.0,
            tables_total,
            tables_success: 0,
            tables_failed: 0,
            rows: TransferCounters::default(),
            failed_tables: Vec::new(),
            tables: Vec::new(),
            clock: Some(Instant::now()),
        }
    }

    pub(crate) fn push(&mut self, result: TableResult) {
        self.rows += result.counters;
        if result.success {
            self.tables_success += 1;
        } else {
            self.tables_failed += 1;
            self.failed_tables.push(result.table.clone());
        }
        self.tables.push(result);
    }

    pub(crate) fn finish(mut self, cancelled: bool) -> Self {
        self.completed_at = Utc::now();
        self.duration_seconds = self
            .clock
            .take()
            .map_or(0.0, |c| c.elapsed().as_secs_f64());
        self.status = if cancelled {
            RunStatus::Cancelled
        } else if self.tables_failed > 0 {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// One-line outcome, e.g. `import failed for 1 of 3 table(s)`.
    pub fn summary(&self) -> String {
        match self.status {
            RunStatus::Completed => format!(
                "{} completed: {} table(s), {} row(s) written",
                self.operation, self.tables_total, self.rows.written
            ),
            RunStatus::Failed => format!(
                "{} failed for {} of {} table(s)",
                self.operation, self.tables_failed, self.tables_total
            ),
            RunStatus::Cancelled => format!(
                "{} cancelled after {} of {} table(s)",
                self.operation,
                self.tables.len(),
                self.tables_total
            ),
        }
    }

    /// The error a failed run maps to, if any.
    pub fn error(&self) -> Option<TransferError> {
        match self.status {
            RunStatus::Completed => None,
            RunStatus::Failed => Some(TransferError::RunFailed(self.summary())),
            RunStatus::Cancelled => Some(TransferError::Cancelled),
        }
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
