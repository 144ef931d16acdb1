//! rowferry CLI - export and import tables between a database and data files.

use clap::{Args, Parser, Subcommand};
use rowferry::core::{TableFilter, TableName};
use rowferry::{
    ColumnMapping, Config, DriverCatalog, Exporter, FileFormat, Importer, Progress, TableDef,
    TableList, TransferError, TransferReport,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "rowferry")]
#[command(about = "Export and import tables between a database and CSV/JSON files")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "rowferry.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Print progress updates as JSON lines to stderr
    #[arg(long)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Default)]
struct FileArgs {
    /// Override the data file directory
    #[arg(long)]
    directory: Option<PathBuf>,

    /// Override the file format: csv or json
    #[arg(long)]
    format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Export tables to data files
    Export {
        /// Export a single table instead of the configured list
        #[arg(long, conflicts_with_all = ["query", "manifest"])]
        table: Option<String>,

        /// Export the rows of a query (requires --file)
        #[arg(long, requires = "file", conflicts_with = "manifest")]
        query: Option<String>,

        /// Output file for --table or --query
        #[arg(long)]
        file: Option<PathBuf>,

        /// Read the table list from a manifest file
        #[arg(long)]
        manifest: Option<PathBuf>,

        #[command(flatten)]
        files: FileArgs,
    },

    /// Import data files into tables
    Import {
        /// Import a single table instead of the configured list
        #[arg(long, conflicts_with = "manifest")]
        table: Option<String>,

        /// Input file for --table
        #[arg(long, requires = "table")]
        file: Option<PathBuf>,

        /// Read the table list from a manifest file
        #[arg(long)]
        manifest: Option<PathBuf>,

        /// Delete existing rows before loading
        #[arg(long)]
        delete: bool,

        /// Apply update and delete rows by primary key
        #[arg(long)]
        sync: bool,

        /// Keep the list order instead of sorting parents first
        #[arg(long)]
        no_sort: bool,

        /// Column matching: by_name or by_ordinal
        #[arg(long)]
        mapping: Option<String>,

        /// Override rows per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Override rows per commit (0 = commit at end of table)
        #[arg(long)]
        commit_interval: Option<usize>,

        /// Ignore input columns with no target column
        #[arg(long)]
        skip_unmatched: bool,

        #[command(flatten)]
        files: FileArgs,
    },

    /// List the resolved tables in processing order
    Tables {
        /// Write the list as a manifest file
        #[arg(long)]
        write_manifest: Option<PathBuf>,
    },

    /// Test the database connection
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), TransferError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(TransferError::Config)?;

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);
    DriverCatalog::with_builtins().require(&config.connection.driver)?;

    let cancel_token = setup_signal_handler().await?;
    let output_json = cli.output_json;
    let progress = cli.progress;

    match cli.command {
        Commands::Export {
            table,
            query,
            file,
            manifest,
            files,
        } => {
            files.apply(&mut config)?;
            if manifest.is_some() {
                config.tables.manifest = manifest;
            }
            config.validate()?;

            if let Some(sql) = query {
                let file = file.ok_or_else(|| TransferError::config("--query requires --file"))?;
                let result = blocking(move || {
                    let mut conn = DriverCatalog::with_builtins().connect(&config.connection)?;
                    Exporter::new(&config).export_query(conn.as_mut(), &sql, Vec::new(), &file)
                })
                .await?;

                if output_json {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                } else {
                    println!("Exported {} row(s) to {}", result.counters.written, result.file.display());
                }
                if !result.success {
                    return Err(TransferError::RunFailed(format!(
                        "export failed: {}",
                        result.error.unwrap_or_default()
                    )));
                }
                return Ok(());
            }

            let report = blocking(move || {
                let mut conn = DriverCatalog::with_builtins().connect(&config.connection)?;
                let tables = match table {
                    Some(name) => single_table(&config, &name, file)?,
                    None => TableList::resolve(conn.as_mut(), &config)?,
                };
                let mut exporter = Exporter::new(&config).with_cancellation(cancel_token);
                if progress {
                    exporter = exporter.with_progress(print_progress);
                }
                exporter.export_all(conn.as_mut(), &tables)
            })
            .await?;
            finish(&report, output_json)?;
        }

        Commands::Import {
            table,
            file,
            manifest,
            delete,
            sync,
            no_sort,
            mapping,
            batch_size,
            commit_interval,
            skip_unmatched,
            files,
        } => {
            files.apply(&mut config)?;
            if manifest.is_some() {
                config.tables.manifest = manifest;
            }
            let transfer = &mut config.transfer;
            if delete {
                transfer.delete_before_load = true;
            }
            if sync {
                transfer.apply_sync = true;
            }
            if no_sort {
                transfer.sort_tables = false;
            }
            if skip_unmatched {
                transfer.skip_unmatched = true;
            }
            if let Some(m) = mapping {
                transfer.mapping = ColumnMapping::parse(&m).ok_or_else(|| {
                    TransferError::config(format!("Unknown column mapping '{}'", m))
                })?;
            }
            if let Some(n) = batch_size {
                transfer.batch_size = n;
            }
            if let Some(n) = commit_interval {
                transfer.commit_interval = n;
            }
            config.validate()?;

            let report = blocking(move || {
                let mut conn = DriverCatalog::with_builtins().connect(&config.connection)?;
                let tables = match table {
                    Some(name) => single_table(&config, &name, file)?,
                    None => TableList::resolve(conn.as_mut(), &config)?,
                };
                let mut importer = Importer::new(&config).with_cancellation(cancel_token);
                if progress {
                    importer = importer.with_progress(print_progress);
                }
                importer.import_all(conn.as_mut(), &tables)
            })
            .await?;
            finish(&report, output_json)?;
        }

        Commands::Tables { write_manifest } => {
            config.validate()?;
            let directory = config.transfer.directory.clone();
            let tables = blocking(move || {
                let mut conn = DriverCatalog::with_builtins().connect(&config.connection)?;
                TableList::resolve(conn.as_mut(), &config)
            })
            .await?;

            if output_json {
                println!("{}", serde_json::to_string_pretty(&tables.names())?);
            } else {
                for table in &tables {
                    println!("{}\t{}\t{}", table.name, table.table_type, table.file.display());
                }
            }
            if let Some(path) = write_manifest {
                tables.write_manifest(&path, &directory)?;
                info!("Wrote {} table(s) to {}", tables.len(), path.display());
            }
        }

        Commands::HealthCheck => {
            let driver = config.connection.driver.clone();
            let started = Instant::now();
            let outcome = blocking(move || {
                let mut conn = DriverCatalog::with_builtins().connect(&config.connection)?;
                let tables = conn.list_tables(&TableFilter::any())?;
                Ok((conn.data_source(), tables.len()))
            })
            .await;
            let latency_ms = started.elapsed().as_millis() as u64;

            if output_json {
                let result = match &outcome {
                    Ok((source, count)) => serde_json::json!({
                        "driver": driver,
                        "data_source": source,
                        "healthy": true,
                        "tables": count,
                        "latency_ms": latency_ms,
                    }),
                    Err(e) => serde_json::json!({
                        "driver": driver,
                        "healthy": false,
                        "error": e.to_string(),
                        "latency_ms": latency_ms,
                    }),
                };
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                match &outcome {
                    Ok((source, count)) => {
                        println!("  Database ({}): OK ({}ms)", driver, latency_ms);
                        println!("    Source: {}", source);
                        println!("    Tables: {}", count);
                    }
                    Err(e) => {
                        println!("  Database ({}): FAILED ({}ms)", driver, latency_ms);
                        println!("    Error: {}", e);
                    }
                }
            }
            outcome?;
        }
    }

    Ok(())
}

impl FileArgs {
    fn apply(&self, config: &mut Config) -> Result<(), TransferError> {
        if let Some(dir) = &self.directory {
            config.transfer.directory = dir.clone();
        }
        if let Some(f) = &self.format {
            config.transfer.format = FileFormat::parse(f)
                .ok_or_else(|| TransferError::config(format!("Unknown file format '{}'", f)))?;
        }
        Ok(())
    }
}

/// A one-table list for `--table`, with the file defaulting to the
/// configured directory and format.
fn single_table(config: &Config, name: &str, file: Option<PathBuf>) -> Result<TableList, TransferError> {
    let name = TableName::parse(name)?;
    let transfer = &config.transfer;
    let file = match file {
        Some(f) => transfer.resolve(&f),
        None => TableDef::default_file(&transfer.directory, &name, transfer.format.extension()),
    };
    let mut list = TableList::new();
    list.push(TableDef::new(name, file))?;
    Ok(list)
}

/// Run a transfer on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, TransferError>
where
    F: FnOnce() -> Result<T, TransferError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TransferError::Internal(format!("transfer task failed: {}", e)))?
}

fn print_progress(progress: &Progress) {
    if let Ok(line) = serde_json::to_string(progress) {
        eprintln!("{}", line);
    }
}

fn finish(report: &TransferReport, output_json: bool) -> Result<(), TransferError> {
    if output_json {
        println!("{}", report.to_json()?);
    } else {
        println!("\n{}", report.summary());
        println!("  Run ID: {}", report.run_id);
        println!("  Duration: {:.2}s", report.duration_seconds);
        println!("  Tables: {}/{}", report.tables_success, report.tables_total);
        println!(
            "  Rows: {} written, {} failed, {} ignored",
            report.rows.written, report.rows.failed, report.rows.ignored
        );
        if !report.failed_tables.is_empty() {
            println!("  Failed tables: {:?}", report.failed_tables);
        }
    }
    match report.error() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => return Err(format!("Unknown verbosity '{}'", other)),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("Unknown log format '{}'", other)),
    }

    Ok(())
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
async fn setup_signal_handler() -> Result<CancellationToken, TransferError> {
    let cancel_token = CancellationToken::new();

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let token_int = cancel_token.clone();
    tokio::spawn(async move {
        sigint.recv().await;
        eprintln!("\nReceived SIGINT. Stopping after the current table...");
        token_int.cancel();
    });

    let token_term = cancel_token.clone();
    tokio::spawn(async move {
        sigterm.recv().await;
        eprintln!("\nReceived SIGTERM. Stopping after the current table...");
        token_term.cancel();
    });

    Ok(cancel_token)
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
async fn setup_signal_handler() -> Result<CancellationToken, TransferError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Stopping after the current table...");
            token.cancel();
        }
    });

    Ok(cancel_token)
}
