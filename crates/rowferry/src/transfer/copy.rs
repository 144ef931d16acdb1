//! Generic source-to-sink copy.

use tracing::{debug, error};

use crate::core::{Sink, Source, TransferCounters};
use crate::error::{Result, TransferError};

/// Pump every row of `source` into `sink`.
///
/// Both sides are released on every path: on failure the sink is aborted
/// and the source closed before the error is returned. On success the sink's
/// counters must account for every row the source produced.
pub fn copy(source: &mut dyn Source, sink: &mut dyn Sink) -> Result<TransferCounters> {
    let metadata = match source.open() {
        Ok(metadata) => metadata,
        Err(e) => {
            let _ = source.close();
            return Err(e);
        }
    };
    let dataset = metadata.label();

    if let Err(e) = sink.open(&metadata) {
        sink.abort();
        let _ = source.close();
        return Err(e);
    }

    let columns = metadata.column_count();
    if let Err(e) = pump(source, sink, columns) {
        error!("Copy of {} failed: {}", dataset, e);
        sink.abort();
        let _ = source.close();
        return Err(e);
    }

    let counters = match sink.close() {
        Ok(counters) => counters,
        Err(e) => {
            sink.abort();
            let _ = source.close();
            return Err(e);
        }
    };
    source.close()?;

    let seen = source.rows_seen();
    debug!(
        "Copied {}: seen={} written={} failed={} ignored={}",
        dataset, seen, counters.written, counters.failed, counters.ignored
    );
    if seen != counters.accounted() {
        return Err(TransferError::RowCountMismatch {
            dataset,
            seen,
            accounted: counters.accounted(),
        });
    }
    Ok(TransferCounters { seen, ..counters })
}

fn pump(source: &mut dyn Source, sink: &mut dyn Sink, columns: usize) -> Result<()> {
    while source.advance()? {
        sink.begin_row(source.row_kind())?;
        for column in 0..columns {
            sink.set_column(column, &*source)?;
        }
        sink.end_row()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ColumnDescriptor, DatasetMetadata, RowKind, SqlType, SqlValue};

    struct Numbers {
        rows: Vec<i64>,
        pos: usize,
        closed: bool,
    }

    impl Source for Numbers {
        fn open(&mut self) -> Result<DatasetMetadata> {
            Ok(DatasetMetadata::new(vec![ColumnDescriptor::new(1, "n", SqlType::I64)]))
        }
        fn advance(&mut self) -> Result<bool> {
            if self.pos < self.rows.len() {
                self.pos += 1;
                Ok(true)
            } else {
                Ok(false)
            }
        }
        fn row_kind(&self) -> RowKind {
            RowKind::Current
        }
        fn value(&self, _column: usize) -> Result<SqlValue<'_>> {
            Ok(SqlValue::I64(self.rows[self.pos - 1]))
        }
        fn rows_seen(&self) -> u64 {
            self.pos as u64
        }
        fn close(&mut self) -> Result<()> {
            self.closed = true;
            Ok(())
        }
    }

    /// Keeps even numbers, ignores odd ones, optionally miscounts.
    #[derive(Default)]
    struct Evens {
        kept: Vec<i64>,
        counters: TransferCounters,
        drop_last: bool,
        fail_on: Option<i64>,
        aborted: bool,
    }

    impl Sink for Evens {
        fn open(&mut self, _metadata: &DatasetMetadata) -> Result<()> {
            Ok(())
        }
        fn begin_row(&mut self, _kind: RowKind) -> Result<()> {
            Ok(())
        }
        fn set_column(&mut self, column: usize, source: &dyn Source) -> Result<()> {
            let n = source.get_i64(column)?.unwrap_or_default();
            if Some(n) == self.fail_on {
                return Err(TransferError::Internal("boom".into()));
            }
            if n % 2 == 0 {
                self.kept.push(n);
                self.counters.written += 1;
            } else {
                self.counters.ignored += 1;
            }
            Ok(())
        }
        fn end_row(&mut self) -> Result<()> {
            Ok(())
        }
        fn close(&mut self) -> Result<TransferCounters> {
            let mut counters = self.counters;
            if self.drop_last {
                counters.written -= 1;
            }
            Ok(counters)
        }
        fn abort(&mut self) {
            self.aborted = true;
        }
    }

    fn numbers(n: i64) -> Numbers {
        Numbers {
            rows: (1..=n).collect(),
            pos: 0,
            closed: false,
        }
    }

    #[test]
    fn test_copy_accounts_for_every_row() {
        let mut source = numbers(5);
        let mut sink = Evens::default();
        let counters = copy(&mut source, &mut sink).unwrap();
        assert_eq!(counters.seen, 5);
        assert_eq!(counters.written, 2);
        assert_eq!(counters.ignored, 3);
        assert_eq!(counters.unknown(), 0);
        assert_eq!(sink.kept, vec![2, 4]);
        assert!(source.closed);
    }

    #[test]
    fn test_copy_detects_lost_rows() {
        let mut source = numbers(4);
        let mut sink = Evens {
            drop_last: true,
            ..Default::default()
        };
        let err = copy(&mut source, &mut sink).unwrap_err();
        assert!(matches!(err, TransferError::RowCountMismatch { seen: 4, accounted: 3, .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_copy_releases_both_sides_on_failure() {
        let mut source = numbers(5);
        let mut sink = Evens {
            fail_on: Some(3),
            ..Default::default()
        };
        assert!(copy(&mut source, &mut sink).is_err());
        assert!(sink.aborted);
        assert!(source.closed);
    }
}
