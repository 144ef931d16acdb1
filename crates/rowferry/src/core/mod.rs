//! Core abstractions for database-agnostic transfer.
//!
//! - [`value`]: SQL value representation and the canonical type set
//! - [`convert`]: coercion between types and canonical text forms
//! - [`schema`]: column, dataset and table metadata
//! - [`traits`]: the row transfer contract and the database capability surface
//! - [`counters`]: per-operation row accounting
//! - [`catalog`]: driver registry for dependency injection
//!
//! Drivers (`drivers/sqlite`, `drivers/postgres`), codecs and the transfer
//! engines are all expressed in terms of these types.

pub mod catalog;
pub mod convert;
pub mod counters;
pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

pub use catalog::DriverCatalog;
pub use counters::TransferCounters;
pub use schema::{
    ColumnDescriptor, DatasetMetadata, ExportedKey, Nullability, TableFilter, TableInfo, TableName,
};
pub use traits::{Connection, Cursor, Dialect, RowFailure, RowOutcome, Sink, Source};
pub use value::{RowKind, SqlType, SqlValue};
