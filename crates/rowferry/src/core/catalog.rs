//! Driver catalog for explicit dependency injection.
//!
//! The [`DriverCatalog`] maps a configured driver id to a constructor. It is
//! constructed explicitly and handed to whoever opens connections, so there
//! is no process-wide registry and tests can register fakes.

use std::collections::BTreeMap;

use crate::config::ConnectionConfig;
use crate::error::{Result, TransferError};

use super::traits::Connection;

/// Opens a connection from its configuration.
pub type ConnectFn = fn(&ConnectionConfig) -> Result<Box<dyn Connection>>;

/// Registry of database drivers by id.
///
/// # Example
///
/// ```rust,ignore
/// let catalog = DriverCatalog::with_builtins();
/// catalog.require(&config.connection.driver)?;
/// let conn = catalog.connect(&config.connection)?;
/// ```
#[derive(Default, Clone)]
pub struct DriverCatalog {
    drivers: BTreeMap<String, ConnectFn>,
}

impl DriverCatalog {
    /// Create a new empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog with the built-in SQLite and PostgreSQL drivers.
    pub fn with_builtins() -> Self {
        use crate::drivers::{PostgresConnection, SqliteConnection};

        let mut catalog = Self::new();
        catalog.register("sqlite", SqliteConnection::connect);
        catalog.register("postgres", PostgresConnection::connect);
        catalog.register("postgresql", PostgresConnection::connect);
        catalog.register("pg", PostgresConnection::connect);
        catalog
    }

    /// Register a driver. Ids are case-insensitive.
    pub fn register(&mut self, id: impl Into<String>, connect: ConnectFn) {
        self.drivers.insert(id.into().to_lowercase(), connect);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.drivers.contains_key(&id.to_lowercase())
    }

    /// Look up a driver, failing if it is not registered.
    pub fn require(&self, id: &str) -> Result<ConnectFn> {
        self.drivers.get(&id.to_lowercase()).copied().ok_or_else(|| {
            TransferError::Config(format!(
                "Unknown database driver '{}'. Registered drivers: {}",
                id,
                self.driver_ids().join(", ")
            ))
        })
    }

    /// Open a connection with the configured driver.
    pub fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
        let connect = self.require(&config.driver)?;
        connect(config)
    }

    /// Registered driver ids, sorted.
    pub fn driver_ids(&self) -> Vec<&str> {
        self.drivers.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_registered() {
        let catalog = DriverCatalog::with_builtins();
        assert!(catalog.contains("sqlite"));
        assert!(catalog.contains("POSTGRES"));
        assert!(catalog.contains("pg"));
    }

    #[test]
    fn test_require_unknown_fails_fast() {
        let catalog = DriverCatalog::with_builtins();
        let err = catalog.require("oracle").err().unwrap();
        let message = err.to_string();
        assert!(message.contains("Unknown database driver 'oracle'"));
        assert!(message.contains("sqlite"));
    }

    #[test]
    fn test_empty_catalog() {
        let catalog = DriverCatalog::new();
        assert!(catalog.driver_ids().is_empty());
        assert!(catalog.require("sqlite").is_err());
    }
}
