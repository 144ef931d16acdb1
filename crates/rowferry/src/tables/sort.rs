//! Parent-first ordering by foreign keys.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, warn};

use super::{TableDef, TableList};
use crate::core::Connection;
use crate::error::Result;

impl TableList {
    /// Reorder the list so referenced tables come before referencing ones.
    ///
    /// Parents are recorded from each table's exported keys, limited to
    /// tables in the list. Tables with no parents keep their relative order
    /// and come first; each following pass emits every table whose parents
    /// have all been emitted. Whatever is left (cycles) is appended in
    /// original order with a warning.
    ///
    /// Names are matched with the dialect's default schema filled in, so
    /// `orders` and `public.orders` are the same table on PostgreSQL.
    pub fn sort_database_sequence(&mut self, conn: &mut dyn Connection) -> Result<()> {
        let default_schema = conn.dialect().default_schema().map(str::to_string);
        let default_schema = default_schema.as_deref();
        let index: HashMap<String, usize> = self
            .tables
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.resolved_key(default_schema), i))
            .collect();

        for table in &mut self.tables {
            table.parents.clear();
        }
        for i in 0..self.tables.len() {
            let parent_key = self.tables[i].key();
            let parent = self.tables[i].name.resolved_key(default_schema);
            let keys = conn.exported_keys(&self.tables[i].name)?;
            for key in keys {
                let child_key = key.child.resolved_key(default_schema);
                if child_key == parent {
                    continue;
                }
                if let Some(&child) = index.get(&child_key) {
                    self.tables[child].parents.insert(parent_key.clone());
                }
            }
        }

        let (order, leftovers) = sequence(&self.tables);
        if !leftovers.is_empty() {
            let names: Vec<String> = leftovers
                .iter()
                .map(|&i| self.tables[i].name.qualified())
                .collect();
            warn!(
                "Could not order {} table(s) by dependency, keeping original order: {}",
                names.len(),
                names.join(", ")
            );
        }

        let mut slots: Vec<Option<TableDef>> = self.tables.drain(..).map(Some).collect();
        self.tables = order
            .into_iter()
            .chain(leftovers)
            .filter_map(|i| slots[i].take())
            .collect();
        debug!("Table order: {}", self.names().join(", "));
        Ok(())
    }
}

/// Emission order of table indexes, plus the indexes that could not be
/// placed.
fn sequence(tables: &[TableDef]) -> (Vec<usize>, Vec<usize>) {
    let mut emitted: BTreeSet<String> = BTreeSet::new();
    let mut order = Vec::with_capacity(tables.len());
    let mut remaining = Vec::new();

    for (i, table) in tables.iter().enumerate() {
        if table.parents.is_empty() {
            emitted.insert(table.key());
            order.push(i);
        } else {
            remaining.push(i);
        }
    }

    loop {
        let before = remaining.len();
        remaining.retain(|&i| {
            let table = &tables[i];
            if table.parents.iter().all(|p| emitted.contains(p)) {
                emitted.insert(table.key());
                order.push(i);
                false
            } else {
                true
            }
        });
        if remaining.is_empty() || remaining.len() == before {
            break;
        }
    }
    (order, remaining)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TableName;
    use std::path::PathBuf;

    fn table(name: &str, parents: &[&str]) -> TableDef {
        let mut t = TableDef::new(TableName::new(name), PathBuf::new());
        t.parents = parents.iter().map(|p| p.to_string()).collect();
        t
    }

    fn names(tables: &[TableDef], idx: &[usize]) -> Vec<String> {
        idx.iter().map(|&i| tables[i].name.name.clone()).collect()
    }

    #[test]
    fn test_parents_first() {
        let tables = vec![
            table("items", &["orders", "products"]),
            table("orders", &["customers"]),
            table("customers", &[]),
            table("products", &[]),
        ];
        let (order, leftovers) = sequence(&tables);
        assert_eq!(
            names(&tables, &order),
            vec!["customers", "products", "orders", "items"]
        );
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_independent_tables_keep_order() {
        let tables = vec![table("z", &[]), table("a", &[]), table("m", &[])];
        let (order, _) = sequence(&tables);
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_cycle_is_appended_in_original_order() {
        let tables = vec![
            table("a", &["b"]),
            table("root", &[]),
            table("b", &["a"]),
            table("leaf", &["root"]),
        ];
        let (order, leftovers) = sequence(&tables);
        assert_eq!(names(&tables, &order), vec!["root", "leaf"]);
        assert_eq!(names(&tables, &leftovers), vec!["a", "b"]);
    }
}
