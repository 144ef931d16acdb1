//! Unload engine: a [`Source`] backed by a live query.

use tracing::debug;

use crate::core::{
    ColumnDescriptor, Connection, Cursor, DatasetMetadata, RowKind, Source, SqlValue, TableName,
};
use crate::error::{Result, TransferError};

enum Statement {
    Table {
        name: TableName,
        filter: Option<String>,
    },
    Query {
        sql: String,
        params: Vec<SqlValue<'static>>,
    },
}

/// Rows of one table or one query.
///
/// The connection is borrowed for the lifetime of the source and handed to
/// the cursor on `open`. `close` drops the cursor; the connection stays with
/// the caller.
pub struct UnloadSource<'c> {
    conn: Option<&'c mut dyn Connection>,
    statement: Statement,
    cursor: Option<Box<dyn Cursor + 'c>>,
    row: Vec<SqlValue<'static>>,
    rows_seen: u64,
}

impl<'c> UnloadSource<'c> {
    /// Unload `SELECT * FROM table [WHERE filter]`.
    pub fn table(conn: &'c mut dyn Connection, name: TableName, filter: Option<String>) -> Self {
        Self::with_statement(conn, Statement::Table { name, filter })
    }

    /// Unload the result of an arbitrary query.
    pub fn query(
        conn: &'c mut dyn Connection,
        sql: impl Into<String>,
        params: Vec<SqlValue<'static>>,
    ) -> Self {
        Self::with_statement(
            conn,
            Statement::Query {
                sql: sql.into(),
                params,
            },
        )
    }

    fn with_statement(conn: &'c mut dyn Connection, statement: Statement) -> Self {
        Self {
            conn: Some(conn),
            statement,
            cursor: None,
            row: Vec::new(),
            rows_seen: 0,
        }
    }
}

/// Fill in what a result description cannot know from the table catalog.
fn merge_catalog(live: &mut ColumnDescriptor, table: &TableName, catalog: &[ColumnDescriptor]) {
    if let Some(declared) = catalog.iter().find(|c| c.name.eq_ignore_ascii_case(&live.name)) {
        live.nullability = declared.nullability;
        live.precision = declared.precision;
        live.scale = declared.scale;
        live.auto_increment = declared.auto_increment;
        live.currency = declared.currency;
        live.display_size = declared.display_size;
        if live.type_name.is_empty() {
            live.type_name = declared.type_name.clone();
        }
        live.catalog = table.catalog.clone();
        live.schema = table.schema.clone();
        live.table = Some(table.name.clone());
    }
}

impl<'c> Source for UnloadSource<'c> {
    fn open(&mut self) -> Result<DatasetMetadata> {
        let conn = self
            .conn
            .take()
            .ok_or_else(|| TransferError::Internal("unload source opened twice".into()))?;
        let data_source = conn.data_source();

        let (sql, params, table, key_columns, catalog) = match &self.statement {
            Statement::Table { name, filter } => {
                let mut sql = format!("SELECT * FROM {}", conn.dialect().qualify(name)?);
                if let Some(filter) = filter {
                    sql.push_str(" WHERE ");
                    sql.push_str(filter);
                }
                let catalog = conn.list_columns(name)?;
                if catalog.is_empty() {
                    return Err(TransferError::table(name.qualified(), "table not found"));
                }
                let keys = conn.primary_keys(name)?;
                (sql, Vec::new(), Some(name.clone()), keys, catalog)
            }
            Statement::Query { sql, params } => {
                (sql.clone(), params.clone(), None, Vec::new(), Vec::new())
            }
        };

        debug!("Unloading: {}", sql);
        let cursor = conn.query(&sql, &params)?;
        let mut columns = cursor.columns().to_vec();
        if let Some(table) = &table {
            for column in &mut columns {
                merge_catalog(column, table, &catalog);
            }
        }
        self.cursor = Some(cursor);

        let mut metadata = DatasetMetadata::new(columns);
        metadata.command = Some(sql);
        metadata.data_source = Some(data_source);
        metadata.key_columns = key_columns;
        Ok(metadata)
    }

    fn advance(&mut self) -> Result<bool> {
        let cursor = self
            .cursor
            .as_mut()
            .ok_or_else(|| TransferError::Internal("unload source is not open".into()))?;
        match cursor.next_row()? {
            Some(row) => {
                self.row = row;
                self.rows_seen += 1;
                Ok(true)
            }
            None => {
                self.row.clear();
                Ok(false)
            }
        }
    }

    fn row_kind(&self) -> RowKind {
        RowKind::Current
    }

    fn value(&self, column: usize) -> Result<SqlValue<'_>> {
        self.row
            .get(column)
            .map(SqlValue::reborrow)
            .ok_or_else(|| TransferError::Internal(format!("column {} is out of range", column)))
    }

    fn rows_seen(&self) -> u64 {
        self.rows_seen
    }

    fn close(&mut self) -> Result<()> {
        self.cursor = None;
        self.row.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SqlType;
    use crate::drivers::SqliteConnection;

    fn db() -> SqliteConnection {
        let mut conn = SqliteConnection::open_in_memory().unwrap();
        conn.execute_script(
            "CREATE TABLE items (id INTEGER PRIMARY KEY, name VARCHAR(20) NOT NULL, price DECIMAL(8,2));
             INSERT INTO items VALUES (1, 'bolt', 0.25), (2, 'nut', NULL), (3, 'gear', 12.50);",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_table_unload() {
        let mut conn = db();
        let mut source = UnloadSource::table(&mut conn, TableName::new("items"), None);
        let meta = source.open().unwrap();
        assert_eq!(meta.key_columns, vec!["id"]);
        assert_eq!(meta.columns[1].nullability, crate::core::Nullability::NoNulls);
        assert_eq!(meta.columns[2].precision, 8);
        assert_eq!(meta.columns[2].table.as_deref(), Some("items"));
        assert!(meta.command.unwrap().starts_with("SELECT * FROM"));

        let mut names = Vec::new();
        while source.advance().unwrap() {
            assert_eq!(source.row_kind(), RowKind::Current);
            names.push(source.get_string(1).unwrap().unwrap());
        }
        assert_eq!(names, vec!["bolt", "nut", "gear"]);
        assert_eq!(source.rows_seen(), 3);
        source.close().unwrap();
    }

    #[test]
    fn test_filter_and_nulls() {
        let mut conn = db();
        let mut source =
            UnloadSource::table(&mut conn, TableName::new("items"), Some("id = 2".into()));
        source.open().unwrap();
        assert!(source.advance().unwrap());
        assert_eq!(source.value(2).unwrap(), SqlValue::Null(SqlType::Decimal));
        assert_eq!(source.get_decimal(2).unwrap(), None);
        assert!(!source.advance().unwrap());
    }

    #[test]
    fn test_query_unload_with_params() {
        let mut conn = db();
        let mut source = UnloadSource::query(
            &mut conn,
            "SELECT id, name FROM items WHERE id > ?1 ORDER BY id",
            vec![SqlValue::I64(1)],
        );
        let meta = source.open().unwrap();
        assert_eq!(meta.column_count(), 2);
        assert!(meta.key_columns.is_empty());
        let mut ids = Vec::new();
        while source.advance().unwrap() {
            ids.push(source.get_i64(0).unwrap().unwrap());
        }
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn test_missing_table() {
        let mut conn = db();
        let mut source = UnloadSource::table(&mut conn, TableName::new("nope"), None);
        let err = source.open().err().unwrap();
        assert_eq!(err.kind(), crate::error::ErrorKind::Table);
    }
}
