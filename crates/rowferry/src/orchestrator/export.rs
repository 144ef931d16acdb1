//! Export: database tables to data files.

use std::path::Path;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::progress::{Phase, Progress, ProgressFn, Tracker};
use super::report::{TableResult, TransferReport};
use crate::codec::FileSink;
use crate::config::Config;
use crate::core::{Connection, Source, SqlValue};
use crate::error::Result;
use crate::tables::{TableDef, TableList};
use crate::transfer::{copy, UnloadSource};

/// Writes tables to files in the configured format and directory.
pub struct Exporter<'a> {
    config: &'a Config,
    cancel: Option<CancellationToken>,
    progress: Option<ProgressFn<'a>>,
}

impl<'a> Exporter<'a> {
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

    /// Export one table (its filter applied) to its data file.
    pub fn export_table(&self, conn: &mut dyn Connection, table: &TableDef) -> Result<TableResult> {
        export_table(self.config, conn, table)
    }

    /// Export the rows of a query to `file`.
    pub fn export_query(
        &self,
        conn: &mut dyn Connection,
        sql: &str,
        params: Vec<SqlValue<'static>>,
        file: &Path,
    ) -> Result<TableResult> {
        let file = self.config.transfer.resolve(file);
        info!("Exporting query to {}", file.display());
        let mut source = UnloadSource::query(conn, sql, params);
        write_file(self.config, "query", &file, &mut source)
    }

    /// Export every table of the list, in list order.
    ///
    /// A table that fails is recorded and the run continues; fatal errors
    /// end the run.
    pub fn export_all(
        &mut self,
        conn: &mut dyn Connection,
        tables: &TableList,
    ) -> Result<TransferReport> {
        let config = self.config;
        let mut report = TransferReport::start("export", tables.len());
        info!("Starting export run: {}", report.run_id);

        let mut tracker = Tracker::new(self.progress.as_mut(), 0.0);
        let mut cancelled = false;
        for (i, table) in tables.iter().enumerate() {
            if self.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
                info!("Cancellation requested, stopping export");
                cancelled = true;
                break;
            }
            let result = export_table(config, conn, table)?;
            report.push(result);
            tracker.report(Phase::Export, &table.name.qualified(), i + 1, tables.len());
        }

        let report = report.finish(cancelled);
        info!("{}", report.summary());
        Ok(report)
    }
}

fn export_table(config: &Config, conn: &mut dyn Connection, table: &TableDef) -> Result<TableResult> {
    let name = table.name.qualified();
    info!("{}: exporting to {}", name, table.file.display());
    let mut source = UnloadSource::table(conn, table.name.clone(), table.filter.clone());
    write_file(config, &name, &table.file, &mut source)
}

fn write_file(
    config: &Config,
    label: &str,
    file: &Path,
    source: &mut dyn Source,
) -> Result<TableResult> {
    let started = Instant::now();
    let mut sink = FileSink::create(file, config.transfer.format, &config.transfer.csv);
    let mut result = TableResult::new(label, file);

    let outcome = copy(source, &mut sink);
    result.duration_seconds = started.elapsed().as_secs_f64();
    match outcome {
        Ok(counters) => {
            result.counters = counters;
            result.success = true;
            info!(
                "{}: exported {} row(s) in {:.2}s",
                label, counters.written, result.duration_seconds
            );
            Ok(result)
        }
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            error!("{}: failed - {}", label, e);
            Ok(result.failed(&e))
        }
    }
}
