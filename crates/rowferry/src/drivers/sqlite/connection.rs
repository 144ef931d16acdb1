//! SQLite connection built on rusqlite.

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};

use rusqlite::{params_from_iter, Connection as RusqliteConnection, OptionalExtension};
use tracing::debug;

use super::dialect::SqliteDialect;
use super::types::{from_sqlite, precision_scale, sql_type_for, to_sqlite};
use crate::config::ConnectionConfig;
use crate::core::{
    ColumnDescriptor, Connection, Cursor, Dialect, ExportedKey, Nullability, RowFailure,
    RowOutcome, SqlValue, TableFilter, TableInfo, TableName,
};
use crate::error::{Result, TransferError};

/// A single SQLite database handle.
///
/// Transactions begin lazily with the first write and end with
/// [`Connection::commit`] or [`Connection::rollback`].
pub struct SqliteConnection {
    conn: RusqliteConnection,
    path: PathBuf,
    dialect: SqliteDialect,
}

impl SqliteConnection {
    /// Open (or create) a database file. `:memory:` opens a private
    /// in-memory database.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = if path == Path::new(":memory:") {
            RusqliteConnection::open_in_memory()?
        } else {
            RusqliteConnection::open(path).map_err(|e| {
                TransferError::connection(e.to_string(), format!("opening {:?}", path))
            })?
        };

        conn.pragma_update(None, "foreign_keys", "ON")?;
        debug!("Opened SQLite database {:?}", path);

        Ok(Self {
            conn,
            path: path.to_path_buf(),
            dialect: SqliteDialect,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    /// Driver catalog constructor.
    pub fn connect(config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
        let path = config
            .path
            .as_ref()
            .ok_or_else(|| TransferError::config("connection.path is required for sqlite"))?;
        Ok(Box::new(Self::open(path)?))
    }

    /// Run a script of semicolon-separated statements outside any transaction.
    pub fn execute_script(&mut self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    /// Count rows in a table.
    pub fn count_rows(&mut self, table: &TableName) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.dialect.qualify(table)?);
        Ok(self.conn.query_row(&sql, [], |row| row.get(0))?)
    }

    fn begin_if_needed(&mut self) -> Result<()> {
        if self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN")?;
        }
        Ok(())
    }
}

struct SqliteCursor {
    columns: Vec<ColumnDescriptor>,
    rows: VecDeque<Vec<SqlValue<'static>>>,
}

impl Cursor for SqliteCursor {
    fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    fn next_row(&mut self) -> Result<Option<Vec<SqlValue<'static>>>> {
        Ok(self.rows.pop_front())
    }
}

impl Connection for SqliteConnection {
    fn driver(&self) -> &str {
        "sqlite"
    }

    fn data_source(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }

    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn query<'a>(
        &'a mut self,
        sql: &str,
        params: &[SqlValue<'_>],
    ) -> Result<Box<dyn Cursor + 'a>> {
        debug!("query: {}", sql);
        let values: Vec<_> = params.iter().map(to_sqlite).collect();
        let mut stmt = self.conn.prepare(sql)?;

        let columns: Vec<ColumnDescriptor> = stmt
            .columns()
            .iter()
            .enumerate()
            .map(|(i, col)| {
                let decl = col.decl_type().unwrap_or_default();
                let (precision, scale) = precision_scale(decl);
                let mut desc = ColumnDescriptor::new(i + 1, col.name(), sql_type_for(col.decl_type()))
                    .with_type_name(decl);
                desc.precision = precision;
                desc.scale = scale;
                desc
            })
            .collect();

        // Rows borrow the statement, so the result is fetched up front
        let mut rows = VecDeque::new();
        let mut result = stmt.query(params_from_iter(values.iter()))?;
        while let Some(row) = result.next()? {
            let mut fetched = Vec::with_capacity(columns.len());
            for (i, col) in columns.iter().enumerate() {
                fetched.push(from_sqlite(row.get_ref(i)?, col.sql_type));
            }
            rows.push_back(fetched);
        }

        Ok(Box::new(SqliteCursor { columns, rows }))
    }

    fn execute(&mut self, sql: &str, params: &[SqlValue<'_>]) -> Result<u64> {
        debug!("execute: {}", sql);
        self.begin_if_needed()?;
        let values: Vec<_> = params.iter().map(to_sqlite).collect();
        let affected = self.conn.execute(sql, params_from_iter(values.iter()))?;
        Ok(affected as u64)
    }

    fn prepare(&mut self, sql: &str) -> Result<()> {
        self.conn.prepare_cached(sql)?;
        Ok(())
    }

    fn execute_batch(
        &mut self,
        sql: &str,
        rows: &[Vec<SqlValue<'static>>],
    ) -> Result<Vec<RowOutcome>> {
        self.begin_if_needed()?;
        let mut stmt = self.conn.prepare_cached(sql)?;

        // A failing statement only aborts itself; the transaction stays open
        let outcomes = rows
            .iter()
            .map(|row| {
                let values: Vec<_> = row.iter().map(to_sqlite).collect();
                stmt.execute(params_from_iter(values.iter()))
                    .map(|n| n as u64)
                    .map_err(|e| RowFailure::from(TransferError::from(e)))
            })
            .collect();
        Ok(outcomes)
    }

    fn commit(&mut self) -> Result<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    fn list_tables(&mut self, filter: &TableFilter) -> Result<Vec<TableInfo>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, type FROM sqlite_master \
             WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
        )?;
        let tables = stmt
            .query_map([], |row| {
                Ok(TableInfo {
                    name: TableName::new(row.get::<_, String>(0)?),
                    table_type: row.get::<_, String>(1)?.to_uppercase(),
                    comment: None,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(tables.into_iter().filter(|t| filter.matches(t)).collect())
    }

    fn list_columns(&mut self, table: &TableName) -> Result<Vec<ColumnDescriptor>> {
        let mut stmt = self.conn.prepare(
            "SELECT cid, name, type, \"notnull\", pk FROM pragma_table_info(?1) ORDER BY cid",
        )?;
        let rows = stmt
            .query_map([&table.name], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, bool>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let pk_count = rows.iter().filter(|r| r.4 > 0).count();
        let columns = rows
            .into_iter()
            .map(|(cid, name, decl, not_null, pk)| {
                let sql_type = sql_type_for(Some(&decl));
                let (precision, scale) = precision_scale(&decl);
                let mut desc = ColumnDescriptor::new(cid as usize + 1, name, sql_type)
                    .with_type_name(decl.clone())
                    .with_origin(table)
                    .with_nullability(if not_null || pk > 0 {
                        Nullability::NoNulls
                    } else {
                        Nullability::Nullable
                    });
                desc.precision = precision;
                desc.scale = scale;
                // INTEGER PRIMARY KEY aliases the rowid
                desc.auto_increment =
                    pk > 0 && pk_count == 1 && decl.eq_ignore_ascii_case("INTEGER");
                desc
            })
            .collect();
        Ok(columns)
    }

    fn primary_keys(&mut self, table: &TableName) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM pragma_table_info(?1) WHERE pk > 0 ORDER BY pk")?;
        let keys = stmt
            .query_map([&table.name], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    fn exported_keys(&mut self, table: &TableName) -> Result<Vec<ExportedKey>> {
        let exists: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
                [&table.name],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(
            "SELECT m.name, f.id, f.\"from\", f.\"to\" \
             FROM sqlite_master m JOIN pragma_foreign_key_list(m.name) f \
             WHERE m.type = 'table' AND f.\"table\" = ?1 COLLATE NOCASE \
             ORDER BY m.name, f.id, f.seq",
        )?;
        let rows = stmt
            .query_map([&table.name], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut keys: BTreeMap<(String, i64), ExportedKey> = BTreeMap::new();
        for (child, id, from, to) in rows {
            let key = keys.entry((child.clone(), id)).or_insert_with(|| ExportedKey {
                child: TableName::new(child),
                child_columns: Vec::new(),
                parent_columns: Vec::new(),
                constraint: None,
            });
            key.child_columns.push(from);
            if let Some(to) = to {
                key.parent_columns.push(to);
            }
        }
        Ok(keys.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SqlType;

    fn db() -> SqliteConnection {
        let mut conn = SqliteConnection::open_in_memory().unwrap();
        conn.execute_script(
            "CREATE TABLE parent (id INTEGER PRIMARY KEY, name VARCHAR(20) NOT NULL);
             CREATE TABLE child (
                 id INTEGER PRIMARY KEY,
                 parent_id INTEGER REFERENCES parent(id),
                 amount DECIMAL(10,2),
                 born DATE
             );
             CREATE VIEW child_names AS SELECT c.id, p.name FROM child c JOIN parent p ON p.id = c.parent_id;",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_list_tables_and_filter() {
        let mut conn = db();
        let all = conn.list_tables(&TableFilter::any()).unwrap();
        let names: Vec<_> = all.iter().map(|t| t.name.name.as_str()).collect();
        assert_eq!(names, vec!["child", "child_names", "parent"]);
        assert_eq!(all[1].table_type, "VIEW");

        let filter = TableFilter::new(None, None, Some("CH*"), &["TABLE".into()]).unwrap();
        let tables = conn.list_tables(&filter).unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].name.name, "child");
    }

    #[test]
    fn test_list_columns_and_keys() {
        let mut conn = db();
        let columns = conn.list_columns(&TableName::new("child")).unwrap();
        assert_eq!(columns.len(), 4);
        assert_eq!(columns[0].ordinal, 1);
        assert!(columns[0].auto_increment);
        assert_eq!(columns[2].sql_type, SqlType::Decimal);
        assert_eq!((columns[2].precision, columns[2].scale), (10, 2));
        assert_eq!(columns[3].sql_type, SqlType::Date);
        assert_eq!(columns[3].nullability, Nullability::Nullable);

        assert_eq!(conn.primary_keys(&TableName::new("child")).unwrap(), vec!["id"]);
        assert!(conn.list_columns(&TableName::new("missing")).unwrap().is_empty());
    }

    #[test]
    fn test_exported_keys() {
        let mut conn = db();
        let keys = conn.exported_keys(&TableName::new("parent")).unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].child.name, "child");
        assert_eq!(keys[0].child_columns, vec!["parent_id"]);
        assert!(conn.exported_keys(&TableName::new("child")).unwrap().is_empty());
    }

    #[test]
    fn test_batch_outcomes_are_independent() {
        let mut conn = db();
        let rows: Vec<Vec<SqlValue<'static>>> = vec![
            vec![SqlValue::I64(1), SqlValue::from("a".to_string())],
            vec![SqlValue::I64(1), SqlValue::from("dup".to_string())],
            vec![SqlValue::I64(2), SqlValue::Null(SqlType::Text)],
            vec![SqlValue::I64(3), SqlValue::from("c".to_string())],
        ];
        let outcomes = conn
            .execute_batch("INSERT INTO parent (id, name) VALUES (?1, ?2)", &rows)
            .unwrap();
        assert_eq!(outcomes.len(), 4);
        assert!(outcomes[0].is_ok());
        assert_eq!(
            outcomes[1].as_ref().unwrap_err().kind,
            crate::error::ErrorKind::ConstraintViolation
        );
        assert!(outcomes[2].is_err());
        assert!(outcomes[3].is_ok());
        conn.commit().unwrap();
        assert_eq!(conn.count_rows(&TableName::new("parent")).unwrap(), 2);
    }

    #[test]
    fn test_rollback_discards_writes() {
        let mut conn = db();
        conn.execute(
            "INSERT INTO parent (id, name) VALUES (?1, ?2)",
            &[SqlValue::I64(9), SqlValue::from("x")],
        )
        .unwrap();
        conn.rollback().unwrap();
        assert_eq!(conn.count_rows(&TableName::new("parent")).unwrap(), 0);
    }

    #[test]
    fn test_query_presents_declared_types() {
        let mut conn = db();
        conn.execute_script(
            "INSERT INTO parent VALUES (1, 'p');
             INSERT INTO child VALUES (1, 1, '12.50', '2001-02-03');",
        )
        .unwrap();
        let mut cursor = conn.query("SELECT * FROM child", &[]).unwrap();
        assert_eq!(cursor.columns().len(), 4);
        let row = cursor.next_row().unwrap().unwrap();
        assert_eq!(row[0], SqlValue::I64(1));
        assert_eq!(row[2].sql_type(), SqlType::Decimal);
        assert_eq!(row[3].sql_type(), SqlType::Date);
        assert!(cursor.next_row().unwrap().is_none());
    }
}
