//! Manifest files: one table per line.
//!
//! ```text
//! # name [, file [, filter]]
//! sales.customers
//! sales.orders, orders-2024.csv, placed_at >= '2024-01-01'
//! sales.items;;qty > 0
//! ```
//!
//! Fields are separated by `,`, `;` or a tab. Blank optional fields take
//! their defaults. The filter is everything after the second separator, so
//! it may contain separators itself.

use std::path::Path;

use super::{TableDef, TableList};
use crate::config::TransferConfig;
use crate::core::TableName;
use crate::error::{Result, TransferError};

const SEPARATORS: [char; 3] = [',', ';', '\t'];

/// One parsed manifest line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// 1-based line number.
    pub line: usize,
    pub name: String,
    pub file: Option<String>,
    pub filter: Option<String>,
}

/// Split a line into at most three fields.
fn split_line(line: &str) -> (&str, Option<&str>, Option<&str>) {
    let Some(first) = line.find(SEPARATORS) else {
        return (line, None, None);
    };
    let name = &line[..first];
    let rest = &line[first + 1..];
    match rest.find(SEPARATORS) {
        Some(second) => (name, Some(&rest[..second]), Some(&rest[second + 1..])),
        None => (name, Some(rest), None),
    }
}

fn non_blank(field: Option<&str>) -> Option<String> {
    field.map(str::trim).filter(|f| !f.is_empty()).map(String::from)
}

/// Parse manifest text. Blank lines and `#` comments are skipped.
pub fn parse(content: &str) -> Result<Vec<ManifestEntry>> {
    let mut entries = Vec::new();
    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (name, file, filter) = split_line(line);
        let name = name.trim();
        if name.is_empty() {
            return Err(TransferError::config(format!(
                "Manifest line {}: missing table name",
                idx + 1
            )));
        }
        entries.push(ManifestEntry {
            line: idx + 1,
            name: name.to_string(),
            file: non_blank(file),
            filter: non_blank(filter),
        });
    }
    Ok(entries)
}

impl TableList {
    /// Build a list from manifest entries.
    pub fn from_entries(entries: Vec<ManifestEntry>, transfer: &TransferConfig) -> Result<Self> {
        let mut list = TableList::new();
        for entry in entries {
            let name = TableName::parse(&entry.name).map_err(|e| {
                TransferError::config(format!("Manifest line {}: {}", entry.line, e))
            })?;
            let file = match entry.file {
                Some(file) => transfer.resolve(Path::new(&file)),
                None => TableDef::default_file(&transfer.directory, &name, transfer.format.extension()),
            };
            let mut table = TableDef::new(name, file);
            table.filter = entry.filter;
            list.push(table).map_err(|e| {
                TransferError::config(format!("Manifest line {}: {}", entry.line, e))
            })?;
        }
        Ok(list)
    }

    /// Read a manifest file.
    pub fn from_manifest(path: &Path, transfer: &TransferConfig) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_entries(parse(&content)?, transfer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_fields_and_separators() {
        let entries = parse(
            "# tables\n\
             \n\
             sales.customers\n\
             sales.orders, orders.csv, placed_at >= '2024-01-01'\n\
             sales.items;;qty > 0\n\
             hr.staff\tstaff.json\n",
        )
        .unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].name, "sales.customers");
        assert_eq!(entries[0].file, None);
        assert_eq!(entries[1].file.as_deref(), Some("orders.csv"));
        assert_eq!(entries[1].filter.as_deref(), Some("placed_at >= '2024-01-01'"));
        assert_eq!(entries[1].line, 4);
        assert_eq!(entries[2].file, None);
        assert_eq!(entries[2].filter.as_deref(), Some("qty > 0"));
        assert_eq!(entries[3].file.as_deref(), Some("staff.json"));
    }

    #[test]
    fn test_filter_keeps_separators() {
        let entries = parse("t, , a IN (1, 2); b = 'x'").unwrap();
        assert_eq!(entries[0].file, None);
        assert_eq!(entries[0].filter.as_deref(), Some("a IN (1, 2); b = 'x'"));
    }

    #[test]
    fn test_paths_resolve_against_directory() {
        let transfer = TransferConfig {
            directory: PathBuf::from("/data"),
            ..Default::default()
        };
        let list = TableList::from_entries(
            parse("a\nb, sub/b.csv\nc, /abs/c.csv").unwrap(),
            &transfer,
        )
        .unwrap();
        let files: Vec<_> = list.iter().map(|t| t.file.clone()).collect();
        assert_eq!(
            files,
            vec![
                PathBuf::from("/data/a.csv"),
                PathBuf::from("/data/sub/b.csv"),
                PathBuf::from("/abs/c.csv"),
            ]
        );
    }

    #[test]
    fn test_duplicate_names_the_line() {
        let err = TableList::from_entries(
            parse("orders\nitems\nORDERS").unwrap(),
            &TransferConfig::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn test_missing_name() {
        assert!(parse(", file.csv").is_err());
    }
}
