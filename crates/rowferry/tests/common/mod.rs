//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::path::Path;

use rowferry::config::{ConnectionConfig, TablesConfig};
use rowferry::core::convert::to_text;
use rowferry::drivers::SqliteConnection;
use rowferry::{Config, Connection, FileFormat, TransferConfig};

/// Config for a SQLite database in `dir`, with data files under `dir/data`.
pub fn config(dir: &Path, format: FileFormat) -> Config {
    Config {
        connection: ConnectionConfig::sqlite(dir.join("app.db")),
        transfer: TransferConfig {
            format,
            directory: dir.join("data"),
            ..Default::default()
        },
        tables: TablesConfig::default(),
    }
}

/// Open a database file in `dir` and run `script` on it.
pub fn sqlite(dir: &Path, name: &str, script: &str) -> SqliteConnection {
    let mut conn = SqliteConnection::open(dir.join(name)).unwrap();
    conn.execute_script(script).unwrap();
    conn
}

/// Every row of a query, rendered as text (`None` for NULL).
pub fn dump(conn: &mut dyn Connection, sql: &str) -> Vec<Vec<Option<String>>> {
    let mut cursor = conn.query(sql, &[]).unwrap();
    let mut rows = Vec::new();
    while let Some(row) = cursor.next_row().unwrap() {
        rows.push(
            row.iter()
                .map(|v| to_text(v).map(|t| t.into_owned()))
                .collect(),
        );
    }
    rows
}

/// Shorthand for an expected row.
pub fn row(values: &[Option<&str>]) -> Vec<Option<String>> {
    values.iter().map(|v| v.map(String::from)).collect()
}

pub fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join("data").join(name);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, content).unwrap();
    path
}
