//! Import: data files into database tables.

use std::collections::HashMap;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::progress::{Phase, Progress, ProgressFn, Tracker};
use super::report::{TableResult, TransferReport};
use crate::codec::open_source;
use crate::config::Config;
use crate::core::{Connection, Sink};
use crate::error::Result;
use crate::tables::{TableDef, TableList};
use crate::transfer::{copy, LoadOptions, LoadSink};

/// Loads data files into their tables.
pub struct Importer<'a> {
    config: &'a Config,
    cancel: Option<CancellationToken>,
    progress: Option<ProgressFn<'a>>,
}

impl<'a> Importer<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            cancel: None,
            progress: None,
        }
    }

    /// Stop before the next table once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_progress(mut self, reporter: impl FnMut(&Progress) + Send + 'a) -> Self {
        self.progress = Some(Box::new(reporter));
        self
    }

    /// Load one table from its data file.
    ///
    /// Succeeds only when every row was written or ignored.
    pub fn import_table(&self, conn: &mut dyn Connection, table: &TableDef) -> Result<TableResult> {
        import_table(self.config, conn, table)
    }

    /// Delete the table's rows (those matching its filter, if any) and commit.
    pub fn delete_table(&self, conn: &mut dyn Connection, table: &TableDef) -> Result<u64> {
        delete_rows(conn, table)
    }

    /// Import every table of the list.
    ///
    /// With `delete_before_load`, tables are first emptied in reverse list
    /// order, so children go before their parents. Loads then run in list
    /// order. A table whose delete failed is not loaded.
    pub fn import_all(
        &mut self,
        conn: &mut dyn Connection,
        tables: &TableList,
    ) -> Result<TransferReport> {
        let config = self.config;
        let total = tables.len();
        let delete = config.transfer.delete_before_load;
        let mut report = TransferReport::start("import", total);
        info!("Starting import run: {}", report.run_id);

        let fraction = if delete {
            config.transfer.delete_progress_fraction
        } else {
            0.0
        };
        let mut tracker = Tracker::new(self.progress.as_mut(), fraction);
        let cancel = self.cancel.clone();
        let is_cancelled = || cancel.as_ref().is_some_and(|t| t.is_cancelled());

        let mut deleted: HashMap<String, std::result::Result<u64, String>> = HashMap::new();
        let mut cancelled = false;

        if delete {
            for (i, table) in tables.reversed().iter().enumerate() {
                if is_cancelled() {
                    cancelled = true;
                    break;
                }
                let name = table.name.qualified();
                match delete_rows(conn, table) {
                    Ok(n) => {
                        info!("{}: deleted {} row(s)", name, n);
                        deleted.insert(table.key(), Ok(n));
                    }
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        error!("{}: delete failed - {}", name, e);
                        deleted.insert(table.key(), Err(e.to_string()));
                    }
                }
                tracker.report(Phase::Delete, &name, i + 1, total);
            }
        }

        if !cancelled {
            for (i, table) in tables.iter().enumerate() {
                if is_cancelled() {
                    cancelled = true;
                    break;
                }
                let result = match deleted.remove(&table.key()) {
                    Some(Err(cause)) => {
                        let mut result = TableResult::new(table.name.qualified(), &table.file);
                        result.error = Some(format!("delete failed: {}", cause));
                        result
                    }
                    previous => {
                        let mut result = import_table(config, conn, table)?;
                        result.deleted = previous.and_then(|d| d.ok());
                        result
                    }
                };
                report.push(result);
                tracker.report(Phase::Load, &table.name.qualified(), i + 1, total);
            }
        }

        if cancelled {
            info!("Cancellation requested, stopping import");
            if let Err(e) = conn.rollback() {
                warn!("Rollback after cancellation failed: {}", e);
            }
        }

        let report = report.finish(cancelled);
        if report.is_success() {
            info!("{}", report.summary());
        } else {
            error!("{}", report.summary());
        }
        Ok(report)
    }
}

fn import_table(config: &Config, conn: &mut dyn Connection, table: &TableDef) -> Result<TableResult> {
    let name = table.name.qualified();
    let started = Instant::now();
    info!("{}: importing {}", name, table.file.display());

    let mut source = open_source(&table.file, config.transfer.format, &config.transfer.csv);
    let mut sink = LoadSink::new(conn, table.name.clone(), LoadOptions::from(&config.transfer));
    let outcome = copy(source.as_mut(), &mut sink);

    let mut result = TableResult::new(&name, &table.file);
    result.counters = sink.counters();
    result.failures = sink.failures().to_vec();
    result.duration_seconds = started.elapsed().as_secs_f64();

    match outcome {
        Ok(counters) => {
            result.counters = counters;
            result.success = counters.failed == 0 && counters.unknown() == 0;
            if result.success {
                info!(
                    "{}: imported {} row(s) in {:.2}s",
                    name, counters.written, result.duration_seconds
                );
            } else {
                error!(
                    "{}: {} of {} row(s) failed",
                    name, counters.failed, counters.seen
                );
            }
            Ok(result)
        }
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            error!("{}: failed - {}", name, e);
            Ok(result.failed(&e))
        }
    }
}

fn delete_rows(conn: &mut dyn Connection, table: &TableDef) -> Result<u64> {
    let mut sql = format!("DELETE FROM {}", conn.dialect().qualify(&table.name)?);
    if let Some(filter) = &table.filter {
        sql.push_str(" WHERE ");
        sql.push_str(filter);
    }
    debug!("{}", sql);

    let outcome = conn.execute(&sql, &[]).and_then(|n| {
        conn.commit()?;
        Ok(n)
    });
    if outcome.is_err() {
        if let Err(e) = conn.rollback() {
            warn!("{}: rollback failed: {}", table.name, e);
        }
    }
    outcome
}
