//! Delimited text codec.
//!
//! A header row names the columns. When the first header is `@kind`, that
//! column carries the row kind (`C`, `I`, `U`, `D`) and is not part of the
//! data. Every field is text; the loader converts it to the target type.

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::PathBuf;

use csv::{ReaderBuilder, StringRecord, WriterBuilder};

use super::encoding::{decode_field, encode_field};
use super::RowEncoder;
use crate::config::CsvOptions;
use crate::core::{ColumnDescriptor, DatasetMetadata, RowKind, Source, SqlType, SqlValue};
use crate::error::{Result, TransferError, ValueError};

/// Header of the row kind column.
pub const KIND_COLUMN: &str = "@kind";

pub struct CsvEncoder<W: Write> {
    writer: csv::Writer<W>,
    null_token: String,
    kind_column: bool,
    record: Vec<String>,
}

impl<W: Write> CsvEncoder<W> {
    /// Create the encoder and write the header row.
    pub fn new(writer: W, options: &CsvOptions, metadata: &DatasetMetadata) -> Result<Self> {
        let mut writer = WriterBuilder::new()
            .delimiter(options.delimiter_byte())
            .from_writer(writer);

        let mut header: Vec<&str> = Vec::with_capacity(metadata.column_count() + 1);
        if options.row_kind_column {
            header.push(KIND_COLUMN);
        }
        header.extend(metadata.columns.iter().map(|c| c.name.as_str()));
        writer.write_record(&header)?;

        Ok(Self {
            writer,
            null_token: options.null_token.clone(),
            kind_column: options.row_kind_column,
            record: Vec::with_capacity(header.len()),
        })
    }
}

impl<W: Write> RowEncoder for CsvEncoder<W> {
    fn write_row(&mut self, kind: RowKind, values: &[SqlValue<'_>], _updated: &[bool]) -> Result<()> {
        self.record.clear();
        if self.kind_column {
            self.record.push(kind.code().to_string());
        }
        for value in values {
            self.record
                .push(encode_field(value, &self.null_token).into_owned());
        }
        self.writer.write_record(&self.record)?;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<()> {
        let mut inner = self
            .writer
            .into_inner()
            .map_err(|e| TransferError::Io(e.into_error()))?;
        inner.flush()?;
        Ok(())
    }
}

/// Rows of a delimited text file.
pub struct CsvSource {
    path: PathBuf,
    options: CsvOptions,
    reader: Option<csv::Reader<BufReader<File>>>,
    record: StringRecord,
    kind_column: bool,
    kind: RowKind,
    rows_seen: u64,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>, options: &CsvOptions) -> Self {
        Self {
            path: path.into(),
            options: options.clone(),
            reader: None,
            record: StringRecord::new(),
            kind_column: false,
            kind: RowKind::Current,
            rows_seen: 0,
        }
    }

    fn offset(&self) -> usize {
        usize::from(self.kind_column)
    }
}

impl Source for CsvSource {
    fn open(&mut self) -> Result<DatasetMetadata> {
        let file = File::open(&self.path)?;
        let mut reader = ReaderBuilder::new()
            .delimiter(self.options.delimiter_byte())
            .has_headers(true)
            .from_reader(BufReader::new(file));

        let headers = reader.headers()?.clone();
        self.kind_column = headers.get(0) == Some(KIND_COLUMN);
        let columns = headers
            .iter()
            .skip(self.offset())
            .enumerate()
            .map(|(i, name)| ColumnDescriptor::new(i + 1, name.trim(), SqlType::Text))
            .collect();
        self.reader = Some(reader);

        let mut metadata = DatasetMetadata::new(columns);
        metadata.data_source = Some(self.path.display().to_string());
        Ok(metadata)
    }

    fn advance(&mut self) -> Result<bool> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| TransferError::Internal("csv source is not open".into()))?;
        if !reader.read_record(&mut self.record)? {
            return Ok(false);
        }
        self.rows_seen += 1;
        self.kind = if self.kind_column {
            let code = self.record.get(0).unwrap_or_default();
            RowKind::parse(code).ok_or_else(|| {
                ValueError::conversion(format!(
                    "{}: row {} has unknown kind {:?}",
                    self.path.display(),
                    self.rows_seen,
                    code
                ))
            })?
        } else {
            RowKind::Current
        };
        Ok(true)
    }

    fn row_kind(&self) -> RowKind {
        self.kind
    }

    fn value(&self, column: usize) -> Result<SqlValue<'_>> {
        let field = self.record.get(column + self.offset()).ok_or_else(|| {
            TransferError::Internal(format!("column {} is out of range", column))
        })?;
        Ok(match decode_field(field, &self.options.null_token) {
            None => SqlValue::Null(SqlType::Text),
            Some(text) => SqlValue::Text(Cow::Borrowed(text)),
        })
    }

    fn rows_seen(&self) -> u64 {
        self.rows_seen
    }

    fn close(&mut self) -> Result<()> {
        self.reader = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> DatasetMetadata {
        DatasetMetadata::new(vec![
            ColumnDescriptor::new(1, "id", SqlType::I64),
            ColumnDescriptor::new(2, "note", SqlType::Text),
        ])
    }

    fn encode(options: &CsvOptions, rows: &[(RowKind, Vec<SqlValue<'static>>)]) -> String {
        let mut out = Vec::new();
        let mut encoder = Box::new(CsvEncoder::new(&mut out, options, &metadata()).unwrap());
        for (kind, values) in rows {
            encoder.write_row(*kind, values, &[]).unwrap();
        }
        encoder.finish().unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_header_nulls_and_quoting() {
        let text = encode(
            &CsvOptions::default(),
            &[
                (RowKind::Current, vec![SqlValue::I64(1), SqlValue::from("a, b")]),
                (RowKind::Current, vec![SqlValue::I64(2), SqlValue::Null(SqlType::Text)]),
                (RowKind::Current, vec![SqlValue::I64(3), SqlValue::from("")]),
            ],
        );
        assert_eq!(text, "id,note\n1,\"a, b\"\n2,\\N\n3,\n");
    }

    #[test]
    fn test_kind_column_roundtrip() {
        let options = CsvOptions {
            delimiter: ";".into(),
            row_kind_column: true,
            ..Default::default()
        };
        let text = encode(
            &options,
            &[
                (RowKind::Update, vec![SqlValue::I64(7), SqlValue::from("\\path")]),
                (RowKind::Delete, vec![SqlValue::I64(8), SqlValue::Null(SqlType::Text)]),
            ],
        );
        assert!(text.starts_with("@kind;id;note\nU;7;"));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        std::fs::write(&path, text).unwrap();

        let mut source = CsvSource::new(&path, &options);
        let meta = source.open().unwrap();
        assert_eq!(meta.column_count(), 2);
        assert_eq!(meta.columns[0].name, "id");

        assert!(source.advance().unwrap());
        assert_eq!(source.row_kind(), RowKind::Update);
        assert_eq!(source.get_i64(0).unwrap(), Some(7));
        assert_eq!(source.get_string(1).unwrap().as_deref(), Some("\\path"));

        assert!(source.advance().unwrap());
        assert_eq!(source.row_kind(), RowKind::Delete);
        assert!(source.value(1).unwrap().is_null());
        assert!(!source.advance().unwrap());
        assert_eq!(source.rows_seen(), 2);
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        std::fs::write(&path, "@kind,id\nX,1\n").unwrap();
        let mut source = CsvSource::new(&path, &CsvOptions::default());
        source.open().unwrap();
        let err = source.advance().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Conversion);
    }
}
