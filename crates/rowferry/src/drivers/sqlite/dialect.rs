//! SQLite dialect.

use crate::core::Dialect;

/// SQLite quotes identifiers with double quotes and numbers its parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn param_placeholder(&self, index: usize) -> String {
        format!("?{}", index)
    }

    fn default_schema(&self) -> Option<&str> {
        Some("main")
    }
}
