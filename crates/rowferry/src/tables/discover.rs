//! Pattern-based table discovery.

use tracing::{debug, warn};

use super::{TableDef, TableList};
use crate::config::{Config, TablesConfig};
use crate::core::{Connection, TableFilter};
use crate::error::Result;

/// Table types that only make sense when they resolve to real columns.
const INDIRECT_TYPES: [&str; 2] = ["SYNONYM", "ALIAS"];

impl TablesConfig {
    /// Compile the configured patterns into a filter.
    pub fn filter(&self) -> Result<TableFilter> {
        TableFilter::new(
            self.catalog.as_deref(),
            self.schema.as_deref(),
            Some(&self.table),
            &self.types,
        )
    }
}

impl TableList {
    /// List the tables matching the configured patterns.
    pub fn discover(conn: &mut dyn Connection, config: &Config) -> Result<Self> {
        let filter = config.tables.filter()?;
        let transfer = &config.transfer;
        let mut list = TableList::new();

        for info in conn.list_tables(&filter)? {
            let indirect = INDIRECT_TYPES
                .iter()
                .any(|t| t.eq_ignore_ascii_case(&info.table_type));
            if indirect && !has_columns(conn, &info.name) {
                debug!("Skipping {} {}: no columns", info.table_type, info.name);
                continue;
            }

            let file =
                TableDef::default_file(&transfer.directory, &info.name, transfer.format.extension());
            let mut table = TableDef::new(info.name, file);
            table.table_type = info.table_type;
            table.comment = info.comment;
            list.push(table)?;
        }
        Ok(list)
    }
}

fn has_columns(conn: &mut dyn Connection, name: &crate::core::TableName) -> bool {
    match conn.list_columns(name) {
        Ok(columns) => !columns.is_empty(),
        Err(e) => {
            warn!("Column lookup for {} failed: {}", name, e);
            false
        }
    }
}
