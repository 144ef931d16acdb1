//! PostgreSQL dialect.

use crate::core::Dialect;

/// Double-quoted identifiers, `$n` parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &str {
        "postgres"
    }

    fn param_placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn default_schema(&self) -> Option<&str> {
        Some("public")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TableName;

    #[test]
    fn test_placeholders_and_quoting() {
        let d = PostgresDialect;
        assert_eq!(d.param_placeholder(1), "$1");
        let t = TableName::with_schema("public", "Order\"s");
        assert_eq!(d.qualify(&t).unwrap(), "\"public\".\"Order\"\"s\"");
    }
}
