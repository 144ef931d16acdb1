//! Dataset, column and table metadata.

use std::fmt;

use globset::{GlobBuilder, GlobMatcher};
use serde::{Deserialize, Serialize};

use super::value::SqlType;
use crate::error::{Result, TransferError};

/// Whether a column admits NULL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Nullability {
    NoNulls,
    Nullable,
    #[default]
    Unknown,
}

/// Static shape of one column.
///
/// Captured once by whoever first observes the column (catalog lookup on
/// load, live result description on unload) and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// 1-based position within the dataset.
    pub ordinal: usize,
    pub name: String,
    /// Display label, usually the same as `name`.
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    pub sql_type: SqlType,
    /// Native type name as reported by the database.
    #[serde(default)]
    pub type_name: String,
    #[serde(default)]
    pub precision: u32,
    #[serde(default)]
    pub scale: u32,
    #[serde(default)]
    pub nullability: Nullability,
    #[serde(default)]
    pub signed: bool,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub currency: bool,
    #[serde(default)]
    pub auto_increment: bool,
    #[serde(default = "default_true")]
    pub searchable: bool,
    #[serde(default)]
    pub display_size: u32,
}

fn default_true() -> bool {
    true
}

impl ColumnDescriptor {
    /// Create a descriptor with defaults derived from the type.
    pub fn new(ordinal: usize, name: impl Into<String>, sql_type: SqlType) -> Self {
        let name = name.into();
        Self {
            ordinal,
            label: name.clone(),
            name,
            catalog: None,
            schema: None,
            table: None,
            sql_type,
            type_name: String::new(),
            precision: 0,
            scale: 0,
            nullability: Nullability::Unknown,
            signed: sql_type.is_signed(),
            case_sensitive: sql_type == SqlType::Text,
            currency: false,
            auto_increment: false,
            searchable: true,
            display_size: 0,
        }
    }

    pub fn with_type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = type_name.into();
        self
    }

    pub fn with_nullability(mut self, nullability: Nullability) -> Self {
        self.nullability = nullability;
        self
    }

    pub fn with_origin(mut self, table: &TableName) -> Self {
        self.catalog = table.catalog.clone();
        self.schema = table.schema.clone();
        self.table = Some(table.name.clone());
        self
    }
}

/// Description of a whole dataset: its columns plus dataset-level properties.
///
/// `columns[i].ordinal == i + 1` always holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub columns: Vec<ColumnDescriptor>,
    /// Statement text that produced the dataset, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Identifier of the database or file the data came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isolation_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_size: Option<usize>,
    /// Declared key column names (primary key of the origin table).
    #[serde(default)]
    pub key_columns: Vec<String>,
}

impl DatasetMetadata {
    /// Build metadata from columns, renumbering ordinals to positions.
    pub fn new(columns: Vec<ColumnDescriptor>) -> Self {
        let columns = columns
            .into_iter()
            .enumerate()
            .map(|(i, mut c)| {
                c.ordinal = i + 1;
                c
            })
            .collect();
        Self {
            columns,
            ..Default::default()
        }
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Find a column by name, ignoring case.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Short label used in logs and error messages.
    pub fn label(&self) -> String {
        self.command
            .clone()
            .or_else(|| self.data_source.clone())
            .unwrap_or_else(|| "dataset".to_string())
    }
}

/// A possibly qualified table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableName {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub name: String,
}

impl TableName {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            catalog: None,
            schema: None,
            name: name.into(),
        }
    }

    pub fn with_schema(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            catalog: None,
            schema: Some(schema.into()),
            name: name.into(),
        }
    }

    /// Parse `name`, `schema.name` or `catalog.schema.name`.
    pub fn parse(qualified: &str) -> Result<Self> {
        let parts: Vec<&str> = qualified.trim().split('.').map(str::trim).collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(TransferError::config(format!(
                "Invalid table name '{}'",
                qualified
            )));
        }
        let owned = |s: &str| Some(s.to_string());
        match parts.as_slice() {
            [name] => Ok(Self::new(*name)),
            [schema, name] => Ok(Self::with_schema(*schema, *name)),
            [catalog, schema, name] => Ok(Self {
                catalog: owned(catalog),
                schema: owned(schema),
                name: name.to_string(),
            }),
            _ => Err(TransferError::config(format!(
                "Table name '{}' has too many parts",
                qualified
            ))),
        }
    }

    /// Dotted fully-qualified name.
    pub fn qualified(&self) -> String {
        let mut parts = Vec::with_capacity(3);
        if let Some(c) = &self.catalog {
            parts.push(c.as_str());
        }
        if let Some(s) = &self.schema {
            parts.push(s.as_str());
        }
        parts.push(&self.name);
        parts.join(".")
    }

    /// Identity key: the qualified name, lowercased.
    pub fn key(&self) -> String {
        self.qualified().to_lowercase()
    }

    /// Key of the relation this name resolves to, with a missing schema
    /// taken as `default_schema`. The catalog is ignored.
    pub fn resolved_key(&self, default_schema: Option<&str>) -> String {
        match self.schema.as_deref().or(default_schema) {
            Some(schema) => format!("{}.{}", schema, self.name).to_lowercase(),
            None => self.name.to_lowercase(),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified())
    }
}

/// One entry from a catalog table listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub name: TableName,
    /// `TABLE`, `VIEW`, `SYNONYM`, `ALIAS`, ...
    pub table_type: String,
    pub comment: Option<String>,
}

/// A foreign key in another table that references this one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedKey {
    /// Referencing (child) table.
    pub child: TableName,
    pub child_columns: Vec<String>,
    pub parent_columns: Vec<String>,
    pub constraint: Option<String>,
}

/// Catalog/schema/table glob patterns plus accepted table types.
///
/// Patterns use `*` and `?` and match case-insensitively. A missing pattern
/// matches everything, as does an empty type list.
#[derive(Debug, Clone)]
pub struct TableFilter {
    catalog: Option<GlobMatcher>,
    schema: Option<GlobMatcher>,
    table: Option<GlobMatcher>,
    types: Vec<String>,
}

impl TableFilter {
    pub fn new(
        catalog: Option<&str>,
        schema: Option<&str>,
        table: Option<&str>,
        types: &[String],
    ) -> Result<Self> {
        Ok(Self {
            catalog: compile(catalog)?,
            schema: compile(schema)?,
            table: compile(table)?,
            types: types.iter().map(|t| t.to_uppercase()).collect(),
        })
    }

    /// Filter that accepts every table and view.
    pub fn any() -> Self {
        Self {
            catalog: None,
            schema: None,
            table: None,
            types: Vec::new(),
        }
    }

    pub fn matches(&self, info: &TableInfo) -> bool {
        self.accepts_type(&info.table_type)
            && part_matches(&self.catalog, info.name.catalog.as_deref())
            && part_matches(&self.schema, info.name.schema.as_deref())
            && part_matches(&self.table, Some(&info.name.name))
    }

    pub fn accepts_type(&self, table_type: &str) -> bool {
        self.types.is_empty() || self.types.iter().any(|t| t.eq_ignore_ascii_case(table_type))
    }
}

fn compile(pattern: Option<&str>) -> Result<Option<GlobMatcher>> {
    match pattern.map(str::trim) {
        None | Some("") | Some("*") => Ok(None),
        Some(p) => Ok(Some(
            GlobBuilder::new(p)
                .case_insensitive(true)
                .literal_separator(false)
                .build()?
                .compile_matcher(),
        )),
    }
}

fn part_matches(matcher: &Option<GlobMatcher>, value: Option<&str>) -> bool {
    match (matcher, value) {
        (None, _) => true,
        (Some(m), Some(v)) => m.is_match(v),
        // Databases without catalogs or schemas
        (Some(_), None) => true,
    }
}
