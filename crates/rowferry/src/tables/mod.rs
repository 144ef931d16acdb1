//! Table resolution: which tables take part in a transfer, where their data
//! files live and in which order they are processed.

mod discover;
pub mod manifest;
mod sort;

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::Config;
use crate::core::{Connection, TableName};
use crate::error::{Result, TransferError};

/// One table taking part in a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    pub name: TableName,
    /// `TABLE`, `VIEW`, ...
    pub table_type: String,
    pub comment: Option<String>,
    /// Data file read on import and written on export.
    pub file: PathBuf,
    /// Optional row filter (SQL condition without `WHERE`).
    pub filter: Option<String>,
    /// Keys of the tables this one references.
    pub parents: BTreeSet<String>,
}

impl TableDef {
    pub fn new(name: TableName, file: PathBuf) -> Self {
        Self {
            name,
            table_type: "TABLE".to_string(),
            comment: None,
            file,
            filter: None,
            parents: BTreeSet::new(),
        }
    }

    /// Default data file: `<directory>/<qualified name>.<extension>`.
    pub fn default_file(directory: &Path, name: &TableName, extension: &str) -> PathBuf {
        directory.join(format!("{}.{}", name.qualified(), extension))
    }

    /// Identity key (lowercased qualified name).
    pub fn key(&self) -> String {
        self.name.key()
    }
}

/// Ordered tables without duplicate names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableList {
    tables: Vec<TableDef>,
}

impl TableList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a table. Names are compared case-insensitively.
    pub fn push(&mut self, table: TableDef) -> Result<()> {
        let key = table.key();
        if self.tables.iter().any(|t| t.key() == key) {
            return Err(TransferError::config(format!(
                "Table {} is listed more than once",
                table.name
            )));
        }
        self.tables.push(table);
        Ok(())
    }

    /// Resolve the configured tables: from the manifest when one is set,
    /// otherwise by pattern, then sorted parent-first if enabled.
    pub fn resolve(conn: &mut dyn Connection, config: &Config) -> Result<Self> {
        let mut list = match &config.tables.manifest {
            Some(path) => Self::from_manifest(&config.transfer.resolve(path), &config.transfer)?,
            None => Self::discover(conn, config)?,
        };
        if config.transfer.sort_tables {
            list.sort_database_sequence(conn)?;
        }
        info!("Resolved {} table(s)", list.len());
        Ok(list)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TableDef> {
        self.tables.iter()
    }

    pub fn get(&self, index: usize) -> Option<&TableDef> {
        self.tables.get(index)
    }

    /// Find a table by qualified name, ignoring case.
    pub fn find(&self, qualified: &str) -> Option<&TableDef> {
        let key = qualified.to_lowercase();
        self.tables.iter().find(|t| t.key() == key)
    }

    /// Qualified names in list order.
    pub fn names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.name.qualified()).collect()
    }

    /// The same tables in reverse order (delete order after sorting).
    pub fn reversed(&self) -> Self {
        Self {
            tables: self.tables.iter().rev().cloned().collect(),
        }
    }

    /// Render the list in manifest format.
    pub fn to_manifest(&self, directory: &Path) -> String {
        let mut out = String::new();
        for table in &self.tables {
            let file = table
                .file
                .strip_prefix(directory)
                .unwrap_or(&table.file)
                .display()
                .to_string();
            let _ = write!(out, "{}, {}", table.name.qualified(), file);
            if let Some(filter) = &table.filter {
                let _ = write!(out, ", {}", filter);
            }
            out.push('\n');
        }
        out
    }

    /// Write the list to a manifest file.
    pub fn write_manifest(&self, path: &Path, directory: &Path) -> Result<()> {
        std::fs::write(path, self.to_manifest(directory))?;
        Ok(())
    }
}

impl<'a> IntoIterator for &'a TableList {
    type Item = &'a TableDef;
    type IntoIter = std::slice::Iter<'a, TableDef>;

    fn into_iter(self) -> Self::IntoIter {
        self.tables.iter()
    }
}
