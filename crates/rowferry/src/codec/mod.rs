//! File codecs.
//!
//! - [`csv`]: delimited text with a header row
//! - [`json`]: one structured document per table
//! - [`encoding`]: text forms shared by both
//!
//! [`FileSink`] handles the file lifecycle for every format and delegates
//! the bytes to a [`RowEncoder`]. [`open_source`] picks the reader.

pub mod csv;
pub mod encoding;
pub mod json;

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

pub use crate::config::{CsvOptions, FileFormat};
use crate::core::{DatasetMetadata, RowKind, Sink, Source, SqlValue, TransferCounters};
use crate::error::{Result, TransferError};

/// Writes rows in one file format.
pub trait RowEncoder {
    /// Encode one row. `updated` has one flag per column.
    fn write_row(&mut self, kind: RowKind, values: &[SqlValue<'_>], updated: &[bool]) -> Result<()>;

    /// Write any trailer and flush.
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Reader for a data file.
pub fn open_source(path: &Path, format: FileFormat, options: &CsvOptions) -> Box<dyn Source> {
    match format {
        FileFormat::Csv => Box::new(csv::CsvSource::new(path, options)),
        FileFormat::Json => Box::new(json::JsonSource::new(path)),
    }
}

/// Path written while a file is incomplete.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// A [`Sink`] that writes a data file.
///
/// Rows go to `<file>.tmp`, which is renamed to the final name on close and
/// removed on abort, so a failed export never leaves a partial file behind.
pub struct FileSink {
    path: PathBuf,
    format: FileFormat,
    options: CsvOptions,
    encoder: Option<Box<dyn RowEncoder>>,
    kind: RowKind,
    values: Vec<SqlValue<'static>>,
    updated: Vec<bool>,
    counters: TransferCounters,
}

impl FileSink {
    pub fn create(path: impl Into<PathBuf>, format: FileFormat, options: &CsvOptions) -> Self {
        Self {
            path: path.into(),
            format,
            options: options.clone(),
            encoder: None,
            kind: RowKind::Current,
            values: Vec::new(),
            updated: Vec::new(),
            counters: TransferCounters::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Sink for FileSink {
    fn open(&mut self, metadata: &DatasetMetadata) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = temp_path(&self.path);
        debug!("Writing {}", tmp.display());
        let writer = BufWriter::new(File::create(&tmp)?);

        let encoder: Box<dyn RowEncoder> = match self.format {
            FileFormat::Csv => Box::new(csv::CsvEncoder::new(writer, &self.options, metadata)?),
            FileFormat::Json => Box::new(json::JsonEncoder::new(writer, metadata)?),
        };
        self.encoder = Some(encoder);

        let width = metadata.column_count();
        self.values = metadata
            .columns
            .iter()
            .map(|c| SqlValue::Null(c.sql_type))
            .collect();
        self.updated = vec![true; width];
        Ok(())
    }

    fn begin_row(&mut self, kind: RowKind) -> Result<()> {
        self.counters.seen += 1;
        self.kind = kind;
        Ok(())
    }

    fn set_column(&mut self, column: usize, source: &dyn Source) -> Result<()> {
        let slot = self.values.get_mut(column).ok_or_else(|| {
            TransferError::Internal(format!("column {} is out of range", column))
        })?;
        *slot = source.value(column)?.into_owned();
        self.updated[column] = source.is_updated(column);
        Ok(())
    }

    fn end_row(&mut self) -> Result<()> {
        let kind = self.kind;
        let encoder = self
            .encoder
            .as_mut()
            .ok_or_else(|| TransferError::Internal("file sink is not open".into()))?;
        encoder.write_row(kind, &self.values, &self.updated)?;
        self.counters.written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<TransferCounters> {
        let encoder = self
            .encoder
            .take()
            .ok_or_else(|| TransferError::Internal(format!("{} is not open", self.path.display())))?;
        encoder.finish()?;

        let tmp = temp_path(&self.path);
        std::fs::rename(&tmp, &self.path).map_err(|source| TransferError::Finalize {
            path: self.path.clone(),
            source,
        })?;
        debug!("Wrote {} row(s) to {}", self.counters.written, self.path.display());
        Ok(self.counters)
    }

    fn abort(&mut self) {
        // Drop the writer before removing its file
        self.encoder = None;
        let tmp = temp_path(&self.path);
        if tmp.exists() {
            if let Err(e) = std::fs::remove_file(&tmp) {
                warn!("Could not remove {}: {}", tmp.display(), e);
            }
        }
    }
}
