//! # rowferry
//!
//! Move tabular data between a relational database and row-oriented files.
//!
//! This library provides:
//!
//! - **A row transfer contract** ([`Source`] / [`Sink`]) and a generic
//!   [`copy`](transfer::copy) that pumps any source into any sink
//! - **Table resolution** from glob patterns or a manifest file, sorted
//!   parent-first by foreign keys
//! - **Unload and load engines** with batching, commit intervals and
//!   primary-key synchronisation (insert/update/delete)
//! - **Multi-table export and import** with a reverse-order delete phase,
//!   cancellation, progress reporting and a JSON run report
//! - **Drivers** for SQLite and PostgreSQL, **codecs** for CSV and JSON
//!
//! ## Example
//!
//! ```rust,no_run
//! use rowferry::{Config, DriverCatalog, Importer, TableList};
//!
//! fn main() -> rowferry::Result<()> {
//!     let config = Config::load("rowferry.yaml")?;
//!     let mut conn = DriverCatalog::with_builtins().connect(&config.connection)?;
//!     let tables = TableList::resolve(conn.as_mut(), &config)?;
//!     let report = Importer::new(&config).import_all(conn.as_mut(), &tables)?;
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod orchestrator;
pub mod tables;
pub mod transfer;

// Re-exports for convenient access
pub use config::{ColumnMapping, Config, ConnectionConfig, FileFormat, TransferConfig};
pub use core::{
    Connection, DatasetMetadata, DriverCatalog, RowKind, Sink, Source, SqlType, SqlValue,
    TransferCounters,
};
pub use error::{ErrorKind, Result, TransferError};
pub use orchestrator::{Exporter, Importer, Phase, Progress, RunStatus, TableResult, TransferReport};
pub use tables::{TableDef, TableList};
pub use transfer::{copy, LoadOptions, LoadSink, UnloadSource};
