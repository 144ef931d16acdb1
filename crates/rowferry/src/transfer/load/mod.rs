//! Load engine: a [`Sink`] that writes rows into one table.
//!
//! Rows are queued per statement and executed in batches. Successful rows
//! are counted as written once the transaction holding them commits; a row
//! that fails is counted and logged without affecting its neighbours.

pub mod mapping;
pub mod statements;

use tracing::{debug, info, warn};

use self::mapping::ColumnMap;
use self::statements::{Operation, Prepared, Statements, Target};
use crate::config::{ColumnMapping, TransferConfig};
use crate::core::{
    ColumnDescriptor, Connection, DatasetMetadata, RowFailure, RowKind, Sink, Source, SqlType,
    SqlValue, TableName, TransferCounters,
};
use crate::error::{ErrorKind, Result, TransferError};

/// Load settings, fixed before `open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Rows per executed batch (at least 1).
    pub batch_size: usize,
    /// Successful rows between commits. 0 commits only on close.
    pub commit_interval: usize,
    pub mapping: ColumnMapping,
    pub skip_unmatched: bool,
    /// Act on `Current` and `Insert` rows.
    pub apply_import: bool,
    /// Act on `Update` and `Delete` rows, and on `Insert` rows.
    pub apply_sync: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self::from(&TransferConfig::default())
    }
}

impl From<&TransferConfig> for LoadOptions {
    fn from(config: &TransferConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            commit_interval: config.commit_interval,
            mapping: config.mapping,
            skip_unmatched: config.skip_unmatched,
            apply_import: config.apply_import,
            apply_sync: config.apply_sync,
        }
    }
}

impl LoadOptions {
    /// Operation for a row kind, or `None` when the kind is not acted on.
    pub fn operation(&self, kind: RowKind) -> Option<Operation> {
        match kind {
            RowKind::Current if self.apply_import => Some(Operation::Insert),
            RowKind::Insert if self.apply_import || self.apply_sync => Some(Operation::Insert),
            RowKind::Update if self.apply_sync => Some(Operation::Update),
            RowKind::Delete if self.apply_sync => Some(Operation::Delete),
            _ => None,
        }
    }
}

/// State that only exists between `open` and `close`.
struct Opened {
    target: Vec<ColumnDescriptor>,
    map: ColumnMap,
    statements: Statements,
}

/// Writes rows into one table.
pub struct LoadSink<'c> {
    conn: &'c mut dyn Connection,
    table: TableName,
    options: LoadOptions,
    opened: Option<Opened>,

    row_kind: RowKind,
    /// Converted values of the current row, by incoming column.
    row: Vec<SqlValue<'static>>,
    /// Conversion failures of the current row, by incoming column.
    row_errors: Vec<Option<RowFailure>>,

    queue: Vec<Vec<SqlValue<'static>>>,
    queued_rows: Vec<u64>,
    queued_op: Option<Operation>,
    /// Rows executed successfully but not yet committed.
    pending: u64,

    counters: TransferCounters,
    failures: Vec<String>,
}

impl<'c> LoadSink<'c> {
    pub fn new(conn: &'c mut dyn Connection, table: TableName, options: LoadOptions) -> Self {
        Self {
            conn,
            table,
            options,
            opened: None,
            row_kind: RowKind::Current,
            row: Vec::new(),
            row_errors: Vec::new(),
            queue: Vec::new(),
            queued_rows: Vec::new(),
            queued_op: None,
            pending: 0,
            counters: TransferCounters::default(),
            failures: Vec::new(),
        }
    }

    /// Counters so far. `written` only includes committed rows.
    pub fn counters(&self) -> TransferCounters {
        self.counters
    }

    fn opened(&self) -> Result<&Opened> {
        self.opened
            .as_ref()
            .ok_or_else(|| TransferError::Internal(format!("load of {} is not open", self.table)))
    }

    fn fail_row(&mut self, row: u64, cause: &str) {
        warn!("{}: row {}: {}", self.table, row, cause);
        self.failures.push(format!("row {}: {}", row, cause));
        self.counters.failed += 1;
    }

    /// Prepare each ready statement, disabling the ones that fail.
    fn prepare_all(&mut self, statements: &mut Statements) {
        for op in [Operation::Insert, Operation::Update, Operation::Delete] {
            let prepared = statements.get_mut(op);
            let failed = match &*prepared {
                Prepared::Ready { sql, .. } => {
                    debug!("{} {}: {}", self.table, op, sql);
                    self.conn.prepare(sql).err()
                }
                Prepared::Disabled(_) => None,
            };
            if let Some(e) = failed {
                *prepared = Prepared::Disabled(format!("{} statement failed to prepare: {}", op, e));
            }

            let used = match op {
                Operation::Insert => self.options.apply_import || self.options.apply_sync,
                Operation::Update | Operation::Delete => self.options.apply_sync,
            };
            if let (true, Prepared::Disabled(cause)) = (used, &*prepared) {
                warn!("{}: {} disabled: {}", self.table, op, cause);
            }
        }
    }

    /// Execute the queued batch.
    fn flush(&mut self) -> Result<()> {
        let Some(op) = self.queued_op.take() else {
            return Ok(());
        };
        if self.queue.is_empty() {
            return Ok(());
        }
        let queue = std::mem::take(&mut self.queue);
        let rows = std::mem::take(&mut self.queued_rows);

        let sql = match self.opened()?.statements.get(op) {
            Prepared::Ready { sql, .. } => sql.clone(),
            Prepared::Disabled(cause) => {
                return Err(TransferError::Internal(format!(
                    "queued rows for disabled {}: {}",
                    op, cause
                )))
            }
        };

        debug!("{}: flushing {} {} row(s)", self.table, queue.len(), op);
        match self.conn.execute_batch(&sql, &queue) {
            Ok(outcomes) => {
                if outcomes.len() != rows.len() {
                    return Err(TransferError::Internal(format!(
                        "batch of {} rows returned {} outcomes",
                        rows.len(),
                        outcomes.len()
                    )));
                }
                for (row, outcome) in rows.into_iter().zip(outcomes) {
                    match outcome {
                        Ok(_) => self.pending += 1,
                        Err(failure) => self.fail_row(row, &failure.cause),
                    }
                }
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                let cause = e.to_string();
                for row in rows {
                    self.fail_row(row, &cause);
                }
            }
        }

        let interval = self.options.commit_interval as u64;
        if interval > 0 && self.pending >= interval {
            self.commit()?;
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.conn.commit()?;
        debug!("{}: committed {} row(s)", self.table, self.pending);
        self.counters.written += self.pending;
        self.pending = 0;
        Ok(())
    }
}

impl Sink for LoadSink<'_> {
    fn open(&mut self, metadata: &DatasetMetadata) -> Result<()> {
        if self.options.batch_size == 0 {
            return Err(TransferError::config("batch_size must be at least 1"));
        }
        let target = self.conn.list_columns(&self.table)?;
        if target.is_empty() {
            return Err(TransferError::table(self.table.qualified(), "table not found"));
        }
        let primary_key = self.conn.primary_keys(&self.table)?;
        let qualified = self.table.qualified();
        let map = mapping::build(
            &qualified,
            metadata,
            &target,
            self.options.mapping,
            self.options.skip_unmatched,
        )?;
        if map.mapped_count() < map.incoming_count() {
            info!(
                "{}: skipping {} unmatched input column(s)",
                self.table,
                map.incoming_count() - map.mapped_count()
            );
        }

        let mut statements = statements::derive(
            self.conn.dialect(),
            &Target {
                table: &self.table,
                columns: &target,
                primary_key: &primary_key,
                map: &map,
                mapping: self.options.mapping,
                sync: self.options.apply_sync,
            },
        )?;
        self.prepare_all(&mut statements);

        let width = metadata.column_count();
        self.row = vec![SqlValue::Null(SqlType::Text); width];
        self.row_errors = vec![None; width];
        self.opened = Some(Opened {
            target,
            map,
            statements,
        });
        Ok(())
    }

    fn begin_row(&mut self, kind: RowKind) -> Result<()> {
        self.counters.seen += 1;
        self.row_kind = kind;
        for error in &mut self.row_errors {
            *error = None;
        }
        Ok(())
    }

    fn set_column(&mut self, column: usize, source: &dyn Source) -> Result<()> {
        let opened = self.opened()?;
        let Some(target) = opened.map.target(column) else {
            return Ok(());
        };
        let descriptor = &opened.target[target];
        let ty = descriptor.sql_type;
        let name = descriptor.name.clone();

        match source.get(column, ty) {
            Ok(value) => self.row[column] = value.into_owned(),
            Err(e) if matches!(e.kind(), ErrorKind::Conversion | ErrorKind::UnsupportedType) => {
                self.row[column] = SqlValue::Null(ty);
                self.row_errors[column] = Some(RowFailure {
                    kind: e.kind(),
                    cause: format!("column {}: {}", name, e),
                });
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    fn end_row(&mut self) -> Result<()> {
        let row = self.counters.seen;
        let Some(op) = self.options.operation(self.row_kind) else {
            self.counters.ignored += 1;
            return Ok(());
        };

        let params = match self.opened()?.statements.get(op) {
            Prepared::Ready { params, .. } => Ok(params.clone()),
            Prepared::Disabled(cause) => Err(format!("{} disabled: {}", op, cause)),
        };
        let params = match params {
            Ok(params) => params,
            Err(cause) => {
                self.fail_row(row, &cause);
                return Ok(());
            }
        };

        if let Some(failure) = params.iter().find_map(|&i| self.row_errors[i].clone()) {
            self.fail_row(row, &failure.cause);
            return Ok(());
        }

        if self.queued_op != Some(op) {
            self.flush()?;
            self.queued_op = Some(op);
        }
        self.queue
            .push(params.iter().map(|&i| self.row[i].clone()).collect());
        self.queued_rows.push(row);

        if self.queue.len() >= self.options.batch_size {
            self.flush()?;
            self.queued_op = Some(op);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<TransferCounters> {
        self.flush()?;
        self.commit()?;
        self.opened = None;
        info!(
            "{}: {} written, {} failed, {} ignored",
            self.table, self.counters.written, self.counters.failed, self.counters.ignored
        );
        Ok(self.counters)
    }

    fn abort(&mut self) {
        self.queue.clear();
        self.queued_rows.clear();
        self.queued_op = None;
        self.pending = 0;
        if let Err(e) = self.conn.rollback() {
            warn!("{}: rollback failed: {}", self.table, e);
        }
        self.opened = None;
    }

    fn failures(&self) -> &[String] {
        &self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_kind_dispatch() {
        let import = LoadOptions::default();
        assert_eq!(import.operation(RowKind::Current), Some(Operation::Insert));
        assert_eq!(import.operation(RowKind::Insert), Some(Operation::Insert));
        assert_eq!(import.operation(RowKind::Update), None);
        assert_eq!(import.operation(RowKind::Delete), None);

        let sync_only = LoadOptions {
            apply_import: false,
            apply_sync: true,
            ..Default::default()
        };
        assert_eq!(sync_only.operation(RowKind::Current), None);
        assert_eq!(sync_only.operation(RowKind::Insert), Some(Operation::Insert));
        assert_eq!(sync_only.operation(RowKind::Update), Some(Operation::Update));
        assert_eq!(sync_only.operation(RowKind::Delete), Some(Operation::Delete));
    }
}
