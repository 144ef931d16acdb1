//! PostgreSQL connection.
//!
//! tokio-postgres is async; the engines are not. Each connection owns a
//! current-thread runtime and drives every call to completion on it, so the
//! connection task only runs while a call is in flight.

use std::collections::HashMap;
use std::pin::Pin;

use futures::StreamExt;
use tokio::runtime::{Builder, Runtime};
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, NoTls, RowStream, Statement};
use tracing::{debug, warn};

use super::dialect::PostgresDialect;
use super::types::{from_row, sql_type_for, sql_type_for_udt, to_param, Param};
use crate::config::ConnectionConfig;
use crate::core::{
    ColumnDescriptor, Connection, Cursor, Dialect, ExportedKey, Nullability, RowFailure,
    RowOutcome, SqlValue, TableFilter, TableInfo, TableName,
};
use crate::drivers::common::TlsBuilder;
use crate::error::{Result, TransferError};

const ROW_SAVEPOINT: &str = "rowferry_row";
const DEFAULT_SCHEMA: &str = "public";

pub struct PostgresConnection {
    runtime: Runtime,
    client: Client,
    statements: HashMap<String, Statement>,
    in_transaction: bool,
    data_source: String,
    dialect: PostgresDialect,
}

impl PostgresConnection {
    /// Connect using the configured host, database and credentials.
    pub fn open(config: &ConnectionConfig) -> Result<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| TransferError::connection(e.to_string(), "starting runtime"))?;

        let conn_str = config.connection_string();
        let tls = TlsBuilder::parse(&config.ssl_mode)?.build()?;
        let data_source = format!(
            "postgres://{}@{}:{}/{}",
            config.user, config.host, config.port, config.database
        );

        let client = runtime.block_on(async {
            let context = format!("connecting to {}", data_source);
            match tls {
                Some(tls) => {
                    let (client, connection) = tokio_postgres::connect(&conn_str, tls)
                        .await
                        .map_err(|e| TransferError::connection(e.to_string(), context))?;
                    tokio::spawn(async move {
                        if let Err(e) = connection.await {
                            warn!("PostgreSQL connection error: {}", e);
                        }
                    });
                    Ok::<_, TransferError>(client)
                }
                None => {
                    let (client, connection) = tokio_postgres::connect(&conn_str, NoTls)
                        .await
                        .map_err(|e| TransferError::connection(e.to_string(), context))?;
                    tokio::spawn(async move {
                        if let Err(e) = connection.await {
                            warn!("PostgreSQL connection error: {}", e);
                        }
                    });
                    Ok(client)
                }
            }
        })?;

        debug!("Connected to {}", data_source);
        Ok(Self {
            runtime,
            client,
            statements: HashMap::new(),
            in_transaction: false,
            data_source,
            dialect: PostgresDialect,
        })
    }

    /// Driver catalog constructor.
    pub fn connect(config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
        Ok(Box::new(Self::open(config)?))
    }

    fn statement(&mut self, sql: &str) -> Result<Statement> {
        if let Some(stmt) = self.statements.get(sql) {
            return Ok(stmt.clone());
        }
        let stmt = self.runtime.block_on(self.client.prepare(sql))?;
        self.statements.insert(sql.to_string(), stmt.clone());
        Ok(stmt)
    }

    fn begin_if_needed(&mut self) -> Result<()> {
        if !self.in_transaction {
            self.runtime.block_on(self.client.batch_execute("BEGIN"))?;
            self.in_transaction = true;
        }
        Ok(())
    }

    fn simple(&self, sql: &str) -> Result<()> {
        self.runtime.block_on(self.client.batch_execute(sql))?;
        Ok(())
    }

    fn bind(stmt: &Statement, values: &[SqlValue<'_>]) -> Result<Vec<Param>> {
        if stmt.params().len() != values.len() {
            return Err(TransferError::Internal(format!(
                "statement expects {} parameters, got {}",
                stmt.params().len(),
                values.len()
            )));
        }
        stmt.params()
            .iter()
            .zip(values)
            .map(|(ty, v)| to_param(v, ty).map_err(TransferError::from))
            .collect()
    }

    fn query_rows(
        &mut self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<tokio_postgres::Row>> {
        Ok(self.runtime.block_on(self.client.query(sql, params))?)
    }
}

fn refs(params: &[Param]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|p| p.as_ref() as &(dyn ToSql + Sync)).collect()
}

struct PostgresCursor<'a> {
    runtime: &'a Runtime,
    stream: Pin<Box<RowStream>>,
    columns: Vec<ColumnDescriptor>,
    types: Vec<Type>,
}

impl Cursor for PostgresCursor<'_> {
    fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    fn next_row(&mut self) -> Result<Option<Vec<SqlValue<'static>>>> {
        let next = self.runtime.block_on(self.stream.next());
        let row = match next {
            None => return Ok(None),
            Some(row) => row?,
        };
        let values = self
            .types
            .iter()
            .enumerate()
            .map(|(i, ty)| from_row(&row, i, ty))
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(values))
    }
}

impl Connection for PostgresConnection {
    fn driver(&self) -> &str {
        "postgres"
    }

    fn data_source(&self) -> String {
        self.data_source.clone()
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
        let stmt = self.statement(sql)?;
        let bound = Self::bind(&stmt, params)?;

        let columns = stmt
            .columns()
            .iter()
            .enumerate()
            .map(|(i, col)| {
                ColumnDescriptor::new(i + 1, col.name(), sql_type_for(col.type_()))
                    .with_type_name(col.type_().name())
            })
            .collect();
        let types = stmt.columns().iter().map(|c| c.type_().clone()).collect();

        let stream = self.runtime.block_on(
            self.client
                .query_raw(&stmt, bound.iter().map(|p| p.as_ref() as &dyn ToSql)),
        )?;

        Ok(Box::new(PostgresCursor {
            runtime: &self.runtime,
            stream: Box::pin(stream),
            columns,
            types,
        }))
    }

    fn execute(&mut self, sql: &str, params: &[SqlValue<'_>]) -> Result<u64> {
        debug!("execute: {}", sql);
        self.begin_if_needed()?;
        let stmt = self.statement(sql)?;
        let bound = Self::bind(&stmt, params)?;
        let refs = refs(&bound);
        Ok(self.runtime.block_on(self.client.execute(&stmt, &refs))?)
    }

    fn prepare(&mut self, sql: &str) -> Result<()> {
        self.statement(sql).map(|_| ())
    }

    fn execute_batch(
        &mut self,
        sql: &str,
        rows: &[Vec<SqlValue<'static>>],
    ) -> Result<Vec<RowOutcome>> {
        self.begin_if_needed()?;
        let stmt = self.statement(sql)?;
        let mut outcomes = Vec::with_capacity(rows.len());

        for row in rows {
            let bound = match Self::bind(&stmt, row) {
                Ok(bound) => bound,
                Err(e) => {
                    outcomes.push(Err(RowFailure::from(e)));
                    continue;
                }
            };
            let refs = refs(&bound);

            // A failed statement aborts the whole transaction unless it ran
            // inside its own savepoint
            self.simple(&format!("SAVEPOINT {}", ROW_SAVEPOINT))?;
            match self.runtime.block_on(self.client.execute(&stmt, &refs)) {
                Ok(n) => {
                    self.simple(&format!("RELEASE SAVEPOINT {}", ROW_SAVEPOINT))?;
                    outcomes.push(Ok(n));
                }
                Err(e) => {
                    self.simple(&format!("ROLLBACK TO SAVEPOINT {}", ROW_SAVEPOINT))?;
                    outcomes.push(Err(RowFailure::from(TransferError::from(e))));
                }
            }
        }
        Ok(outcomes)
    }

    fn commit(&mut self) -> Result<()> {
        if self.in_transaction {
            // The server ends the transaction even when COMMIT fails
            self.in_transaction = false;
            self.simple("COMMIT")?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if self.in_transaction {
            self.in_transaction = false;
            self.simple("ROLLBACK")?;
        }
        Ok(())
    }

    fn list_tables(&mut self, filter: &TableFilter) -> Result<Vec<TableInfo>> {
        let query = r#"
            SELECT
                t.table_schema::text,
                t.table_name::text,
                t.table_type::text,
                obj_description(c.oid, 'pg_class')
            FROM information_schema.tables t
            LEFT JOIN pg_catalog.pg_namespace n ON n.nspname = t.table_schema
            LEFT JOIN pg_catalog.pg_class c ON c.relnamespace = n.oid AND c.relname = t.table_name
            WHERE t.table_schema NOT IN ('pg_catalog', 'information_schema')
            ORDER BY t.table_schema, t.table_name
        "#;
        let rows = self.query_rows(query, &[])?;

        let tables = rows
            .iter()
            .map(|row| {
                let table_type: String = row.get(2);
                TableInfo {
                    name: TableName::with_schema(row.get::<_, String>(0), row.get::<_, String>(1)),
                    table_type: match table_type.as_str() {
                        "BASE TABLE" => "TABLE".to_string(),
                        other => other.to_string(),
                    },
                    comment: row.get(3),
                }
            })
            .filter(|t| filter.matches(t))
            .collect();
        Ok(tables)
    }

    fn list_columns(&mut self, table: &TableName) -> Result<Vec<ColumnDescriptor>> {
        let query = r#"
            SELECT
                column_name::text,
                udt_name::text,
                COALESCE(character_maximum_length, 0)::int4,
                COALESCE(numeric_precision, 0)::int4,
                COALESCE(numeric_scale, 0)::int4,
                CASE WHEN is_nullable = 'YES' THEN true ELSE false END,
                (is_identity = 'YES' OR COALESCE(column_default, '') LIKE 'nextval(%') AS is_auto
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position
        "#;
        let schema = table.schema.as_deref().unwrap_or(DEFAULT_SCHEMA);
        let rows = self.query_rows(query, &[&schema, &table.name])?;

        let columns = rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let udt: String = row.get(1);
                let max_length: i32 = row.get(2);
                let precision: i32 = row.get(3);
                let mut desc = ColumnDescriptor::new(i + 1, row.get::<_, String>(0), sql_type_for_udt(&udt))
                    .with_type_name(udt)
                    .with_origin(table)
                    .with_nullability(if row.get::<_, bool>(5) {
                        Nullability::Nullable
                    } else {
                        Nullability::NoNulls
                    });
                desc.precision = precision.max(max_length).max(0) as u32;
                desc.scale = row.get::<_, i32>(4).max(0) as u32;
                desc.display_size = max_length.max(0) as u32;
                desc.auto_increment = row.get(6);
                desc.currency = desc.type_name == "money";
                desc
            })
            .collect();
        Ok(columns)
    }

    fn primary_keys(&mut self, table: &TableName) -> Result<Vec<String>> {
        let query = r#"
            SELECT a.attname::text
            FROM pg_catalog.pg_constraint c
            JOIN pg_catalog.pg_class t ON t.oid = c.conrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
            JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid
            WHERE n.nspname = $1
              AND t.relname = $2
              AND c.contype = 'p'
              AND a.attnum = ANY(c.conkey)
            ORDER BY array_position(c.conkey, a.attnum)
        "#;
        let schema = table.schema.as_deref().unwrap_or(DEFAULT_SCHEMA);
        let rows = self.query_rows(query, &[&schema, &table.name])?;
        Ok(rows.iter().map(|r| r.get(0)).collect())
    }

    fn exported_keys(&mut self, table: &TableName) -> Result<Vec<ExportedKey>> {
        let query = r#"
            SELECT
                c.conname::text,
                n.nspname::text,
                t.relname::text,
                array_agg(a.attname::text ORDER BY k.seq),
                array_agg(ra.attname::text ORDER BY k.seq)
            FROM pg_catalog.pg_constraint c
            JOIN pg_catalog.pg_class t ON t.oid = c.conrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
            JOIN pg_catalog.pg_class rt ON rt.oid = c.confrelid
            JOIN pg_catalog.pg_namespace rn ON rn.oid = rt.relnamespace
            CROSS JOIN LATERAL unnest(c.conkey, c.confkey)
                WITH ORDINALITY AS k(child_att, parent_att, seq)
            JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.child_att
            JOIN pg_catalog.pg_attribute ra ON ra.attrelid = rt.oid AND ra.attnum = k.parent_att
            WHERE rn.nspname = $1
              AND rt.relname = $2
              AND c.contype = 'f'
            GROUP BY c.conname, n.nspname, t.relname
            ORDER BY n.nspname, t.relname, c.conname
        "#;
        let schema = table.schema.as_deref().unwrap_or(DEFAULT_SCHEMA);
        let rows = self.query_rows(query, &[&schema, &table.name])?;
        Ok(rows
            .iter()
            .map(|row| ExportedKey {
                constraint: Some(row.get(0)),
                child: TableName::with_schema(row.get::<_, String>(1), row.get::<_, String>(2)),
                child_columns: row.get(3),
                parent_columns: row.get(4),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> ConnectionConfig {
        ConnectionConfig {
            driver: "postgres".to_string(),
            path: None,
            host: "localhost".to_string(),
            port: 5432,
            database: "postgres".to_string(),
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            ssl_mode: "disable".to_string(),
        }
    }

    #[test]
    #[ignore] // Needs a local PostgreSQL server
    fn test_composite_foreign_key_columns_pair_up() {
        let mut conn = PostgresConnection::open(&local_config()).unwrap();
        for sql in [
            "DROP SCHEMA IF EXISTS rowferry_fk CASCADE",
            "CREATE SCHEMA rowferry_fk",
            "CREATE TABLE rowferry_fk.parent (a INT, b INT, PRIMARY KEY (a, b))",
            "CREATE TABLE rowferry_fk.child (
                id INT PRIMARY KEY, pb INT, pa INT,
                FOREIGN KEY (pa, pb) REFERENCES rowferry_fk.parent (a, b))",
        ] {
            conn.execute(sql, &[]).unwrap();
        }
        conn.commit().unwrap();

        let keys = conn
            .exported_keys(&TableName::with_schema("rowferry_fk", "parent"))
            .unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].child, TableName::with_schema("rowferry_fk", "child"));
        assert_eq!(keys[0].child_columns, vec!["pa", "pb"]);
        assert_eq!(keys[0].parent_columns, vec!["a", "b"]);

        conn.execute("DROP SCHEMA rowferry_fk CASCADE", &[]).unwrap();
        conn.commit().unwrap();
    }
}
