//! Structured document codec.
//!
//! One JSON document per file:
//!
//! ```json
//! {
//!   "table": "items",
//!   "key_columns": ["id"],
//!   "columns": [{"ordinal": 1, "name": "id", "sql_type": "i64", ...}],
//!   "rows": [
//!     {"kind": "current", "values": [1]},
//!     {"kind": "update", "values": [2], "updated": [false]}
//!   ]
//! }
//! ```
//!
//! Column types travel in the header, so values keep their type on the way
//! back. Exact decimals and temporal values are strings in canonical form,
//! bytes are base64.

use std::borrow::Cow;
use std::io::{BufReader, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use super::encoding::{parse_text, to_text};
use super::RowEncoder;
use crate::core::convert::coerce;
use crate::core::{ColumnDescriptor, DatasetMetadata, RowKind, Source, SqlType, SqlValue};
use crate::error::{Result, TransferError, ValueError};

#[derive(Serialize)]
struct RowRef<'a> {
    kind: RowKind,
    values: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated: Option<&'a [bool]>,
}

#[derive(Deserialize)]
struct Row {
    #[serde(default)]
    kind: RowKind,
    values: Vec<Value>,
    #[serde(default)]
    updated: Option<Vec<bool>>,
}

#[derive(Deserialize)]
struct Document {
    #[serde(default)]
    table: Option<String>,
    #[serde(default)]
    key_columns: Vec<String>,
    columns: Vec<ColumnDescriptor>,
    #[serde(default)]
    rows: Vec<Row>,
}

/// JSON representation of a value.
pub fn to_json(value: &SqlValue<'_>) -> Value {
    match value {
        SqlValue::Null(_) => Value::Null,
        SqlValue::Bool(v) => Value::Bool(*v),
        SqlValue::I16(v) => Value::from(*v),
        SqlValue::I32(v) => Value::from(*v),
        SqlValue::I64(v) => Value::from(*v),
        SqlValue::F32(v) => float(f64::from(*v)),
        SqlValue::F64(v) => float(*v),
        SqlValue::Text(s) => Value::String(s.to_string()),
        other => to_text(other).map_or(Value::Null, |t| Value::String(t.into_owned())),
    }
}

/// Non-finite floats have no JSON number form.
fn float(v: f64) -> Value {
    Number::from_f64(v).map_or_else(|| Value::String(v.to_string()), Value::Number)
}

/// Value of a JSON element for a column of type `ty`.
pub fn from_json(value: &Value, ty: SqlType) -> std::result::Result<SqlValue<'_>, ValueError> {
    match value {
        Value::Null => Ok(SqlValue::Null(ty)),
        Value::Bool(b) => coerce(SqlValue::Bool(*b), ty),
        Value::Number(n) => match n.as_i64() {
            Some(i) => coerce(SqlValue::I64(i), ty),
            None => match ty {
                // Keep the digits as written
                SqlType::Decimal | SqlType::Text => parse_text(&n.to_string(), ty),
                _ => coerce(SqlValue::F64(n.as_f64().unwrap_or(f64::NAN)), ty),
            },
        },
        Value::String(s) if ty == SqlType::Text => Ok(SqlValue::Text(Cow::Borrowed(s))),
        Value::String(s) => parse_text(s, ty),
        nested => parse_text(&nested.to_string(), ty),
    }
}

pub struct JsonEncoder<W: Write> {
    writer: W,
    rows: u64,
}

impl<W: Write> JsonEncoder<W> {
    /// Create the encoder and write the document header.
    pub fn new(mut writer: W, metadata: &DatasetMetadata) -> Result<Self> {
        let table = metadata.columns.first().and_then(|c| {
            c.table.as_ref().map(|name| {
                [c.catalog.as_deref(), c.schema.as_deref(), Some(name.as_str())]
                    .iter()
                    .flatten()
                    .copied()
                    .collect::<Vec<_>>()
                    .join(".")
            })
        });

        writer.write_all(b"{\"table\":")?;
        serde_json::to_writer(&mut writer, &table)?;
        writer.write_all(b",\"key_columns\":")?;
        serde_json::to_writer(&mut writer, &metadata.key_columns)?;
        writer.write_all(b",\"columns\":")?;
        serde_json::to_writer(&mut writer, &metadata.columns)?;
        writer.write_all(b",\"rows\":[")?;
        Ok(Self { writer, rows: 0 })
    }
}

impl<W: Write> RowEncoder for JsonEncoder<W> {
    fn write_row(&mut self, kind: RowKind, values: &[SqlValue<'_>], updated: &[bool]) -> Result<()> {
        if self.rows > 0 {
            self.writer.write_all(b",")?;
        }
        self.writer.write_all(b"\n")?;
        let row = RowRef {
            kind,
            values: values.iter().map(to_json).collect(),
            updated: (kind == RowKind::Update).then_some(updated),
        };
        serde_json::to_writer(&mut self.writer, &row)?;
        self.rows += 1;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        self.writer.write_all(b"\n]}\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Rows of a JSON document. The document is read whole on `open`.
pub struct JsonSource {
    path: PathBuf,
    columns: Vec<SqlType>,
    rows: Vec<Row>,
    /// 1-based index of the current row; 0 before the first.
    position: usize,
}

impl JsonSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            columns: Vec::new(),
            rows: Vec::new(),
            position: 0,
        }
    }

    fn current(&self) -> Result<&Row> {
        self.position
            .checked_sub(1)
            .and_then(|i| self.rows.get(i))
            .ok_or_else(|| TransferError::Internal("json source has no current row".into()))
    }
}

impl Source for JsonSource {
    fn open(&mut self) -> Result<DatasetMetadata> {
        let file = std::fs::File::open(&self.path)?;
        let document: Document = serde_json::from_reader(BufReader::new(file))?;

        let width = document.columns.len();
        if let Some(i) = document.rows.iter().position(|r| r.values.len() != width) {
            return Err(TransferError::table(
                self.path.display().to_string(),
                format!(
                    "row {} has {} values, expected {}",
                    i + 1,
                    document.rows[i].values.len(),
                    width
                ),
            ));
        }

        self.columns = document.columns.iter().map(|c| c.sql_type).collect();
        self.rows = document.rows;
        self.position = 0;

        let mut metadata = DatasetMetadata::new(document.columns);
        metadata.data_source = Some(
            document
                .table
                .unwrap_or_else(|| self.path.display().to_string()),
        );
        metadata.key_columns = document.key_columns;
        Ok(metadata)
    }

    fn advance(&mut self) -> Result<bool> {
        if self.position < self.rows.len() {
            self.position += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn row_kind(&self) -> RowKind {
        self.current().map_or(RowKind::Current, |r| r.kind)
    }

    fn value(&self, column: usize) -> Result<SqlValue<'_>> {
        let row = self.current()?;
        let ty = self.columns.get(column).copied().ok_or_else(|| {
            TransferError::Internal(format!("column {} is out of range", column))
        })?;
        Ok(from_json(&row.values[column], ty)?)
    }

    fn is_updated(&self, column: usize) -> bool {
        self.current()
            .ok()
            .and_then(|r| r.updated.as_ref())
            .and_then(|u| u.get(column).copied())
            .unwrap_or(true)
    }

    fn rows_seen(&self) -> u64 {
        self.position as u64
    }

    fn close(&mut self) -> Result<()> {
        self.rows.clear();
        Ok(())
    }
}
