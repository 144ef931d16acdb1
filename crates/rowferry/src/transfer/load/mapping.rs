//! Incoming-to-target column mapping.

use crate::config::ColumnMapping;
use crate::core::{ColumnDescriptor, DatasetMetadata};
use crate::error::{Result, TransferError};

/// For each incoming column, the index of its target column, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    targets: Vec<Option<usize>>,
}

impl ColumnMap {
    /// Target index of an incoming column.
    pub fn target(&self, incoming: usize) -> Option<usize> {
        self.targets.get(incoming).copied().flatten()
    }

    /// `(incoming, target)` pairs in incoming order.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.targets
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.map(|t| (i, t)))
    }

    /// Incoming column mapped to a target column.
    pub fn incoming_for(&self, target: usize) -> Option<usize> {
        self.pairs().find(|&(_, t)| t == target).map(|(i, _)| i)
    }

    pub fn mapped_count(&self) -> usize {
        self.pairs().count()
    }

    pub fn incoming_count(&self) -> usize {
        self.targets.len()
    }
}

/// Map incoming columns onto `target` columns of `table`.
///
/// By name, columns match case-insensitively. By ordinal, the first
/// `min(incoming, target)` columns pair up. Incoming columns left without a
/// target are an error unless `skip_unmatched` is set.
pub fn build(
    table: &str,
    incoming: &DatasetMetadata,
    target: &[ColumnDescriptor],
    mapping: ColumnMapping,
    skip_unmatched: bool,
) -> Result<ColumnMap> {
    let targets: Vec<Option<usize>> = match mapping {
        ColumnMapping::ByName => {
            let mut targets = Vec::with_capacity(incoming.column_count());
            for column in &incoming.columns {
                let found = target
                    .iter()
                    .position(|t| t.name.eq_ignore_ascii_case(&column.name));
                if found.is_some() && targets.contains(&found) {
                    return Err(TransferError::config(format!(
                        "Column {} appears more than once in the input for table {}",
                        column.name, table
                    )));
                }
                if found.is_none() && !skip_unmatched {
                    return Err(TransferError::config(format!(
                        "Column {} does not exist in table {}",
                        column.name, table
                    )));
                }
                targets.push(found);
            }
            targets
        }
        ColumnMapping::ByOrdinal => {
            let n_in = incoming.column_count();
            if n_in > target.len() && !skip_unmatched {
                return Err(TransferError::config(format!(
                    "Input has {} columns but table {} has only {}",
                    n_in,
                    table,
                    target.len()
                )));
            }
            (0..n_in).map(|i| (i < target.len()).then_some(i)).collect()
        }
    };
    Ok(ColumnMap { targets })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SqlType;

    fn columns(names: &[&str]) -> Vec<ColumnDescriptor> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| ColumnDescriptor::new(i + 1, *n, SqlType::Text))
            .collect()
    }

    fn incoming(names: &[&str]) -> DatasetMetadata {
        DatasetMetadata::new(columns(names))
    }

    #[test]
    fn test_by_name_ignores_case_and_order() {
        let map = build(
            "t",
            &incoming(&["NAME", "Id"]),
            &columns(&["id", "name", "extra"]),
            ColumnMapping::ByName,
            false,
        )
        .unwrap();
        assert_eq!(map.target(0), Some(1));
        assert_eq!(map.target(1), Some(0));
        assert_eq!(map.incoming_for(2), None);
        assert_eq!(map.mapped_count(), 2);
    }

    #[test]
    fn test_by_name_unmatched() {
        let target = columns(&["id"]);
        let err = build("t", &incoming(&["id", "ghost"]), &target, ColumnMapping::ByName, false)
            .unwrap_err();
        assert!(err.to_string().contains("ghost"));

        let map = build("t", &incoming(&["id", "ghost"]), &target, ColumnMapping::ByName, true)
            .unwrap();
        assert_eq!(map.target(1), None);
        assert_eq!(map.pairs().collect::<Vec<_>>(), vec![(0, 0)]);
    }

    #[test]
    fn test_by_name_rejects_duplicate_input() {
        let target = columns(&["id"]);
        assert!(build("t", &incoming(&["id", "ID"]), &target, ColumnMapping::ByName, true).is_err());
    }

    #[test]
    fn test_by_ordinal() {
        let map = build(
            "t",
            &incoming(&["a", "b"]),
            &columns(&["x", "y", "z"]),
            ColumnMapping::ByOrdinal,
            false,
        )
        .unwrap();
        assert_eq!(map.pairs().collect::<Vec<_>>(), vec![(0, 0), (1, 1)]);

        let target = columns(&["x"]);
        assert!(build("t", &incoming(&["a", "b"]), &target, ColumnMapping::ByOrdinal, false).is_err());
        let map = build("t", &incoming(&["a", "b"]), &target, ColumnMapping::ByOrdinal, true).unwrap();
        assert_eq!(map.target(1), None);
    }
}
