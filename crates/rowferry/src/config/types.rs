//! Configuration type definitions.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database connection.
    pub connection: ConnectionConfig,

    /// Transfer behavior.
    #[serde(default)]
    pub transfer: TransferConfig,

    /// Which tables to transfer.
    #[serde(default)]
    pub tables: TablesConfig,
}

/// Database connection configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Driver id registered in the driver catalog ("sqlite", "postgres").
    pub driver: String,

    /// Database file (sqlite). `:memory:` opens a private in-memory database.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Database host (postgres).
    #[serde(default)]
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    #[serde(default)]
    pub database: String,

    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub password: String,

    /// SSL mode: disable, require, verify-ca, verify-full.
    #[serde(default = "default_ssl_mode")]
    pub ssl_mode: String,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("driver", &self.driver)
            .field("path", &self.path)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

impl ConnectionConfig {
    /// SQLite connection for a file path.
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            driver: "sqlite".to_string(),
            path: Some(path.into()),
            host: String::new(),
            port: default_pg_port(),
            database: String::new(),
            user: String::new(),
            password: String::new(),
            ssl_mode: default_ssl_mode(),
        }
    }
}

/// File format of exported/imported data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    /// Delimited text with a header row.
    #[default]
    Csv,
    /// One JSON document per table.
    Json,
}

impl FileFormat {
    pub fn extension(self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Json => "json",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" | "text" | "delimited" => Some(FileFormat::Csv),
            "json" => Some(FileFormat::Json),
            _ => None,
        }
    }
}

/// How incoming columns are matched to target columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnMapping {
    /// Case-insensitive name match.
    #[default]
    ByName,
    /// Position match over the shorter column list.
    ByOrdinal,
}

impl ColumnMapping {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "by_name" | "name" => Some(ColumnMapping::ByName),
            "by_ordinal" | "ordinal" | "position" => Some(ColumnMapping::ByOrdinal),
            _ => None,
        }
    }
}

/// Options for the delimited-text codec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvOptions {
    /// Field delimiter (single ASCII character).
    #[serde(default = "default_delimiter")]
    pub delimiter: String,

    /// Text written for NULL values.
    #[serde(default = "default_null_token")]
    pub null_token: String,

    /// Write a leading `@kind` column carrying the row kind.
    #[serde(default)]
    pub row_kind_column: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            null_token: default_null_token(),
            row_kind_column: false,
        }
    }
}

impl CsvOptions {
    /// Delimiter as a byte. Validation guarantees a single ASCII character.
    pub fn delimiter_byte(&self) -> u8 {
        self.delimiter.bytes().next().unwrap_or(b',')
    }
}

/// Transfer behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    #[serde(default)]
    pub format: FileFormat,

    /// Directory for data files and relative manifest paths.
    #[serde(default = "default_directory")]
    pub directory: PathBuf,

    /// Rows queued before a batch is executed.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Successful rows between commits. 0 commits only at end of table.
    #[serde(default = "default_commit_interval")]
    pub commit_interval: usize,

    #[serde(default)]
    pub mapping: ColumnMapping,

    /// Skip incoming columns with no target instead of failing the table.
    #[serde(default)]
    pub skip_unmatched: bool,

    /// Delete existing rows (in reverse dependency order) before loading.
    #[serde(default)]
    pub delete_before_load: bool,

    /// Apply CURRENT/INSERT rows as inserts.
    #[serde(default = "default_true")]
    pub apply_import: bool,

    /// Apply UPDATE/DELETE rows (and INSERT rows) by primary key.
    #[serde(default)]
    pub apply_sync: bool,

    /// Order tables parent-first by foreign keys.
    #[serde(default = "default_true")]
    pub sort_tables: bool,

    /// Share of the progress range reserved for the delete phase.
    #[serde(default = "default_delete_progress_fraction")]
    pub delete_progress_fraction: f64,

    #[serde(default)]
    pub csv: CsvOptions,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            format: FileFormat::default(),
            directory: default_directory(),
            batch_size: default_batch_size(),
            commit_interval: default_commit_interval(),
            mapping: ColumnMapping::default(),
            skip_unmatched: false,
            delete_before_load: false,
            apply_import: true,
            apply_sync: false,
            sort_tables: true,
            delete_progress_fraction: default_delete_progress_fraction(),
            csv: CsvOptions::default(),
        }
    }
}

/// Table selection: glob patterns or an explicit manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TablesConfig {
    #[serde(default)]
    pub catalog: Option<String>,

    #[serde(default)]
    pub schema: Option<String>,

    /// Table name pattern (`*` and `?`).
    #[serde(default = "default_table_pattern")]
    pub table: String,

    /// Accepted table types.
    #[serde(default = "default_table_types")]
    pub types: Vec<String>,

    /// Manifest file. Overrides the patterns when set.
    #[serde(default)]
    pub manifest: Option<PathBuf>,
}

impl Default for TablesConfig {
    fn default() -> Self {
        Self {
            catalog: None,
            schema: None,
            table: default_table_pattern(),
            types: default_table_types(),
            manifest: None,
        }
    }
}

fn default_pg_port() -> u16 {
    5432
}

fn default_ssl_mode() -> String {
    "disable".to_string()
}

fn default_delimiter() -> String {
    ",".to_string()
}

fn default_null_token() -> String {
    "\\N".to_string()
}

fn default_directory() -> PathBuf {
    PathBuf::from(".")
}

fn default_batch_size() -> usize {
    100
}

fn default_commit_interval() -> usize {
    1000
}

fn default_true() -> bool {
    true
}

fn default_delete_progress_fraction() -> f64 {
    0.1
}

fn default_table_pattern() -> String {
    "*".to_string()
}

fn default_table_types() -> Vec<String> {
    vec!["TABLE".to_string(), "VIEW".to_string()]
}
