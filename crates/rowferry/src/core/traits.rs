//! Core traits: the row transfer contract and the database capability surface.
//!
//! - [`Source`] / [`Sink`]: a tabular producer and consumer of tagged rows
//! - [`Connection`] / [`Cursor`]: what the engines need from a database client
//! - [`Dialect`]: identifier quoting and parameter placeholders

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::convert::coerce;
use super::counters::TransferCounters;
use super::identifier::validate_identifier;
use super::schema::{ColumnDescriptor, DatasetMetadata, ExportedKey, TableFilter, TableInfo, TableName};
use super::value::{RowKind, SqlType, SqlValue};
use crate::error::{ErrorKind, Result, TransferError};

/// A tabular producer of rows.
///
/// Exactly one row is current at a time. Columns are addressed by 0-based
/// index (`ordinal - 1`). A NULL is always reported as [`SqlValue::Null`],
/// never as empty text.
pub trait Source {
    /// Open the source and describe its columns.
    fn open(&mut self) -> Result<DatasetMetadata>;

    /// Move to the next row. Returns `false` at end of data.
    fn advance(&mut self) -> Result<bool>;

    /// Tag of the current row.
    fn row_kind(&self) -> RowKind;

    /// Raw value of a column in the current row, in the source's own type.
    fn value(&self, column: usize) -> Result<SqlValue<'_>>;

    /// Value of a column converted to the requested type.
    fn get(&self, column: usize, ty: SqlType) -> Result<SqlValue<'_>> {
        Ok(coerce(self.value(column)?, ty)?)
    }

    /// For `Update` rows, whether the column is part of the update.
    fn is_updated(&self, _column: usize) -> bool {
        true
    }

    /// Number of rows produced so far.
    fn rows_seen(&self) -> u64;

    /// Release the source. Must be safe to call after a failure.
    fn close(&mut self) -> Result<()>;

    fn get_string(&self, column: usize) -> Result<Option<String>> {
        Ok(match self.get(column, SqlType::Text)? {
            SqlValue::Text(s) => Some(s.into_owned()),
            _ => None,
        })
    }

    fn get_bool(&self, column: usize) -> Result<Option<bool>> {
        Ok(match self.get(column, SqlType::Bool)? {
            SqlValue::Bool(v) => Some(v),
            _ => None,
        })
    }

    fn get_i16(&self, column: usize) -> Result<Option<i16>> {
        Ok(match self.get(column, SqlType::I16)? {
            SqlValue::I16(v) => Some(v),
            _ => None,
        })
    }

    fn get_i32(&self, column: usize) -> Result<Option<i32>> {
        Ok(match self.get(column, SqlType::I32)? {
            SqlValue::I32(v) => Some(v),
            _ => None,
        })
    }

    fn get_i64(&self, column: usize) -> Result<Option<i64>> {
        Ok(match self.get(column, SqlType::I64)? {
            SqlValue::I64(v) => Some(v),
            _ => None,
        })
    }

    fn get_f32(&self, column: usize) -> Result<Option<f32>> {
        Ok(match self.get(column, SqlType::F32)? {
            SqlValue::F32(v) => Some(v),
            _ => None,
        })
    }

    fn get_f64(&self, column: usize) -> Result<Option<f64>> {
        Ok(match self.get(column, SqlType::F64)? {
            SqlValue::F64(v) => Some(v),
            _ => None,
        })
    }

    fn get_decimal(&self, column: usize) -> Result<Option<Decimal>> {
        Ok(match self.get(column, SqlType::Decimal)? {
            SqlValue::Decimal(v) => Some(v),
            _ => None,
        })
    }

    fn get_date(&self, column: usize) -> Result<Option<NaiveDate>> {
        Ok(match self.get(column, SqlType::Date)? {
            SqlValue::Date(v) => Some(v),
            _ => None,
        })
    }

    fn get_time(&self, column: usize) -> Result<Option<NaiveTime>> {
        Ok(match self.get(column, SqlType::Time)? {
            SqlValue::Time(v) => Some(v),
            _ => None,
        })
    }

    fn get_timestamp(&self, column: usize) -> Result<Option<NaiveDateTime>> {
        Ok(match self.get(column, SqlType::DateTime)? {
            SqlValue::DateTime(v) => Some(v),
            _ => None,
        })
    }

    fn get_timestamp_tz(&self, column: usize) -> Result<Option<DateTime<FixedOffset>>> {
        Ok(match self.get(column, SqlType::DateTimeOffset)? {
            SqlValue::DateTimeOffset(v) => Some(v),
            _ => None,
        })
    }

    fn get_bytes(&self, column: usize) -> Result<Option<Vec<u8>>> {
        Ok(match self.get(column, SqlType::Bytes)? {
            SqlValue::Bytes(b) => Some(b.into_owned()),
            _ => None,
        })
    }

    fn get_uuid(&self, column: usize) -> Result<Option<Uuid>> {
        Ok(match self.get(column, SqlType::Uuid)? {
            SqlValue::Uuid(v) => Some(v),
            _ => None,
        })
    }
}

/// A tabular consumer of rows.
pub trait Sink {
    /// Prepare for rows shaped like `metadata`.
    fn open(&mut self, metadata: &DatasetMetadata) -> Result<()>;

    fn begin_row(&mut self, kind: RowKind) -> Result<()>;

    /// Pull column `column` of the source's current row.
    ///
    /// The sink decides which typed getter to use from its own view of the
    /// column's declared type.
    fn set_column(&mut self, column: usize, source: &dyn Source) -> Result<()>;

    fn end_row(&mut self) -> Result<()>;

    /// Finish and report final counters.
    fn close(&mut self) -> Result<TransferCounters>;

    /// Release resources after a failure (discard output, roll back).
    fn abort(&mut self) {}

    /// Human-readable per-row failure lines collected so far.
    fn failures(&self) -> &[String] {
        &[]
    }
}

/// Why one row of a batch failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFailure {
    pub kind: ErrorKind,
    pub cause: String,
}

impl From<&TransferError> for RowFailure {
    fn from(err: &TransferError) -> Self {
        Self {
            kind: err.kind(),
            cause: err.to_string(),
        }
    }
}

impl From<TransferError> for RowFailure {
    fn from(err: TransferError) -> Self {
        RowFailure::from(&err)
    }
}

/// Outcome of one parameter set in a batch: affected rows, or why it failed.
pub type RowOutcome = std::result::Result<u64, RowFailure>;

/// Forward-only result set.
pub trait Cursor {
    fn columns(&self) -> &[ColumnDescriptor];

    /// Fetch the next row, one value per column.
    fn next_row(&mut self) -> Result<Option<Vec<SqlValue<'static>>>>;
}

/// SQL dialect: just enough to build the engines' statements.
pub trait Dialect: Send + Sync {
    fn name(&self) -> &str;

    /// Quote an identifier.
    fn quote_ident(&self, name: &str) -> Result<String> {
        validate_identifier(name)?;
        Ok(format!("\"{}\"", name.replace('"', "\"\"")))
    }

    /// Placeholder for the parameter at 1-based `index`.
    fn param_placeholder(&self, index: usize) -> String;

    /// Schema an unqualified table name resolves to.
    fn default_schema(&self) -> Option<&str> {
        None
    }

    /// Quote every part of a qualified table name.
    fn qualify(&self, table: &TableName) -> Result<String> {
        let mut parts = Vec::with_capacity(3);
        if let Some(c) = &table.catalog {
            parts.push(self.quote_ident(c)?);
        }
        if let Some(s) = &table.schema {
            parts.push(self.quote_ident(s)?);
        }
        parts.push(self.quote_ident(&table.name)?);
        Ok(parts.join("."))
    }
}

/// Capability surface of a database client.
///
/// Connections are single-owner: one statement at a time. Transactions are
/// manual and begin implicitly with the first write after a commit or
/// rollback.
pub trait Connection: Send {
    /// Driver id this connection was created by.
    fn driver(&self) -> &str;

    /// Identifier of the database (path, host/database).
    fn data_source(&self) -> String;

    fn dialect(&self) -> &dyn Dialect;

    /// Run a query and return its rows.
    fn query<'a>(
        &'a mut self,
        sql: &str,
        params: &[SqlValue<'_>],
    ) -> Result<Box<dyn Cursor + 'a>>;

    /// Execute a statement and return the number of affected rows.
    fn execute(&mut self, sql: &str, params: &[SqlValue<'_>]) -> Result<u64>;

    /// Validate a statement and keep it ready for execution.
    fn prepare(&mut self, sql: &str) -> Result<()>;

    /// Execute one statement for each parameter set.
    ///
    /// A failing row does not prevent the remaining rows from executing. The
    /// returned vector has exactly one outcome per parameter set.
    fn execute_batch(
        &mut self,
        sql: &str,
        rows: &[Vec<SqlValue<'static>>],
    ) -> Result<Vec<RowOutcome>>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;

    fn list_tables(&mut self, filter: &TableFilter) -> Result<Vec<TableInfo>>;

    /// Columns of a table in ordinal order. Empty if the table does not exist.
    fn list_columns(&mut self, table: &TableName) -> Result<Vec<ColumnDescriptor>>;

    /// Primary key column names in key order.
    fn primary_keys(&mut self, table: &TableName) -> Result<Vec<String>>;

    /// Foreign keys in other tables that reference `table`.
    fn exported_keys(&mut self, table: &TableName) -> Result<Vec<ExportedKey>>;
}
