//! Statement text for the load engine.
//!
//! Every statement records, for each of its parameters, the incoming column
//! whose value is bound there.

use super::mapping::ColumnMap;
use crate::config::ColumnMapping;
use crate::core::{ColumnDescriptor, Dialect, TableName};
use crate::error::Result;

/// The three row operations a load can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
        })
    }
}

/// A statement ready to run, or the reason it cannot be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prepared {
    Ready {
        sql: String,
        /// Incoming column index bound to each parameter, in order.
        params: Vec<usize>,
    },
    Disabled(String),
}

impl Prepared {
    pub fn sql(&self) -> Option<&str> {
        match self {
            Prepared::Ready { sql, .. } => Some(sql),
            Prepared::Disabled(_) => None,
        }
    }
}

/// Insert, update and delete statements for one target table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statements {
    pub insert: Prepared,
    pub update: Prepared,
    pub delete: Prepared,
}

impl Statements {
    pub fn get(&self, op: Operation) -> &Prepared {
        match op {
            Operation::Insert => &self.insert,
            Operation::Update => &self.update,
            Operation::Delete => &self.delete,
        }
    }

    pub fn get_mut(&mut self, op: Operation) -> &mut Prepared {
        match op {
            Operation::Insert => &mut self.insert,
            Operation::Update => &mut self.update,
            Operation::Delete => &mut self.delete,
        }
    }
}

/// What the statements are derived from.
pub struct Target<'a> {
    pub table: &'a TableName,
    pub columns: &'a [ColumnDescriptor],
    pub primary_key: &'a [String],
    pub map: &'a ColumnMap,
    pub mapping: ColumnMapping,
    /// Derive update and delete statements.
    pub sync: bool,
}

impl Target<'_> {
    /// Target indexes of the primary key columns, in key order.
    fn key_targets(&self) -> Vec<Option<usize>> {
        self.primary_key
            .iter()
            .map(|k| self.columns.iter().position(|c| c.name.eq_ignore_ascii_case(k)))
            .collect()
    }
}

/// Build all three statements.
pub fn derive(dialect: &dyn Dialect, target: &Target<'_>) -> Result<Statements> {
    let insert = insert(dialect, target)?;
    let (update, delete) = if target.sync {
        match sync_precondition(target) {
            Some(cause) => (Prepared::Disabled(cause.clone()), Prepared::Disabled(cause)),
            None => (update(dialect, target)?, delete(dialect, target)?),
        }
    } else {
        let off = "synchronize mode is off".to_string();
        (Prepared::Disabled(off.clone()), Prepared::Disabled(off))
    };
    Ok(Statements {
        insert,
        update,
        delete,
    })
}

/// Why update/delete cannot be derived, if they cannot.
fn sync_precondition(target: &Target<'_>) -> Option<String> {
    if target.mapping != ColumnMapping::ByName {
        return Some("synchronize requires by-name column mapping".to_string());
    }
    if target.primary_key.is_empty() {
        return Some(format!("table {} has no primary key", target.table));
    }
    let missing: Vec<&str> = target
        .primary_key
        .iter()
        .zip(target.key_targets())
        .filter(|(_, t)| t.and_then(|t| target.map.incoming_for(t)).is_none())
        .map(|(k, _)| k.as_str())
        .collect();
    if !missing.is_empty() {
        return Some(format!(
            "primary key column(s) {} missing from input",
            missing.join(", ")
        ));
    }
    None
}

fn insert(dialect: &dyn Dialect, target: &Target<'_>) -> Result<Prepared> {
    let pairs: Vec<(usize, usize)> = target.map.pairs().collect();
    if pairs.is_empty() {
        return Ok(Prepared::Disabled(format!(
            "no input columns match table {}",
            target.table
        )));
    }
    let mut names = Vec::with_capacity(pairs.len());
    let mut placeholders = Vec::with_capacity(pairs.len());
    for (n, &(_, t)) in pairs.iter().enumerate() {
        names.push(dialect.quote_ident(&target.columns[t].name)?);
        placeholders.push(dialect.param_placeholder(n + 1));
    }
    Ok(Prepared::Ready {
        sql: format!(
            "INSERT INTO {} ({}) VALUES ({})",
            dialect.qualify(target.table)?,
            names.join(", "),
            placeholders.join(", ")
        ),
        params: pairs.into_iter().map(|(i, _)| i).collect(),
    })
}

/// `col = ?` terms over `(incoming, target)` pairs, numbering from `first`.
fn assignments(
    dialect: &dyn Dialect,
    columns: &[ColumnDescriptor],
    pairs: &[(usize, usize)],
    first: usize,
) -> Result<Vec<String>> {
    pairs
        .iter()
        .enumerate()
        .map(|(n, &(_, t))| {
            Ok(format!(
                "{} = {}",
                dialect.quote_ident(&columns[t].name)?,
                dialect.param_placeholder(first + n)
            ))
        })
        .collect()
}

/// `(incoming, target)` pairs of the key columns. Preconditions hold.
fn key_pairs(target: &Target<'_>) -> Vec<(usize, usize)> {
    target
        .key_targets()
        .into_iter()
        .flatten()
        .filter_map(|t| target.map.incoming_for(t).map(|i| (i, t)))
        .collect()
}

fn delete(dialect: &dyn Dialect, target: &Target<'_>) -> Result<Prepared> {
    let keys = key_pairs(target);
    let conditions = assignments(dialect, target.columns, &keys, 1)?;
    Ok(Prepared::Ready {
        sql: format!(
            "DELETE FROM {} WHERE {}",
            dialect.qualify(target.table)?,
            conditions.join(" AND ")
        ),
        params: keys.into_iter().map(|(i, _)| i).collect(),
    })
}

fn update(dialect: &dyn Dialect, target: &Target<'_>) -> Result<Prepared> {
    let keys = key_pairs(target);
    let values: Vec<(usize, usize)> = target
        .map
        .pairs()
        .filter(|&(_, t)| !keys.iter().any(|&(_, k)| k == t))
        .collect();
    if values.is_empty() {
        return Ok(Prepared::Disabled(format!(
            "table {} has no non-key columns to update",
            target.table
        )));
    }

    // Non-key values first, then the key
    let set = assignments(dialect, target.columns, &values, 1)?;
    let conditions = assignments(dialect, target.columns, &keys, values.len() + 1)?;
    Ok(Prepared::Ready {
        sql: format!(
            "UPDATE {} SET {} WHERE {}",
            dialect.qualify(target.table)?,
            set.join(", "),
            conditions.join(" AND ")
        ),
        params: values.iter().chain(keys.iter()).map(|&(i, _)| i).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DatasetMetadata, SqlType};
    use crate::drivers::{PostgresDialect, SqliteDialect};
    use crate::transfer::load::mapping;

    fn cols(names: &[&str]) -> Vec<ColumnDescriptor> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| ColumnDescriptor::new(i + 1, *n, SqlType::Text))
            .collect()
    }

    fn statements(incoming: &[&str], keys: &[&str], mapping: ColumnMapping) -> Statements {
        let table = TableName::new("items");
        let columns = cols(&["id", "name", "qty"]);
        let meta = DatasetMetadata::new(cols(incoming));
        let map = mapping::build("items", &meta, &columns, mapping, true).unwrap();
        let primary_key: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        derive(
            &SqliteDialect,
            &Target {
                table: &table,
                columns: &columns,
                primary_key: &primary_key,
                map: &map,
                mapping,
                sync: true,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_insert_uses_mapped_columns_only() {
        let s = statements(&["qty", "ID"], &["id"], ColumnMapping::ByName);
        assert_eq!(
            s.insert,
            Prepared::Ready {
                sql: r#"INSERT INTO "items" ("qty", "id") VALUES (?1, ?2)"#.to_string(),
                params: vec![0, 1],
            }
        );
    }

    #[test]
    fn test_update_binds_values_before_key() {
        let s = statements(&["id", "name", "qty"], &["id"], ColumnMapping::ByName);
        assert_eq!(
            s.update,
            Prepared::Ready {
                sql: r#"UPDATE "items" SET "name" = ?1, "qty" = ?2 WHERE "id" = ?3"#.to_string(),
                params: vec![1, 2, 0],
            }
        );
        assert_eq!(
            s.delete,
            Prepared::Ready {
                sql: r#"DELETE FROM "items" WHERE "id" = ?1"#.to_string(),
                params: vec![0],
            }
        );
    }

    #[test]
    fn test_sync_disabled_without_full_key() {
        let s = statements(&["name", "qty"], &["id"], ColumnMapping::ByName);
        assert!(matches!(s.update, Prepared::Disabled(ref c) if c.contains("id")));
        assert!(matches!(s.delete, Prepared::Disabled(_)));
        assert!(s.insert.sql().is_some());

        let s = statements(&["id", "name"], &[], ColumnMapping::ByName);
        assert!(matches!(s.update, Prepared::Disabled(ref c) if c.contains("no primary key")));

        let s = statements(&["id", "name"], &["id"], ColumnMapping::ByOrdinal);
        assert!(matches!(s.delete, Prepared::Disabled(ref c) if c.contains("by-name")));
    }

    #[test]
    fn test_update_without_value_columns() {
        let s = statements(&["id"], &["id"], ColumnMapping::ByName);
        assert!(matches!(s.update, Prepared::Disabled(_)));
        assert!(s.delete.sql().is_some());
    }

    #[test]
    fn test_composite_key_with_postgres_placeholders() {
        let table = TableName::with_schema("public", "lines");
        let columns = cols(&["order_id", "line", "sku"]);
        let meta = DatasetMetadata::new(cols(&["sku", "line", "order_id"]));
        let map = mapping::build("lines", &meta, &columns, ColumnMapping::ByName, false).unwrap();
        let key = vec!["order_id".to_string(), "line".to_string()];
        let s = derive(
            &PostgresDialect,
            &Target {
                table: &table,
                columns: &columns,
                primary_key: &key,
                map: &map,
                mapping: ColumnMapping::ByName,
                sync: true,
            },
        )
        .unwrap();
        assert_eq!(
            s.update,
            Prepared::Ready {
                sql: r#"UPDATE "public"."lines" SET "sku" = $1 WHERE "order_id" = $2 AND "line" = $3"#
                    .to_string(),
                params: vec![0, 2, 1],
            }
        );
    }
}
