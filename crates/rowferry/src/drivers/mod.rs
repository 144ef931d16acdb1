//! Database drivers.
//!
//! Each driver implements [`Connection`](crate::core::Connection) and is
//! registered in [`DriverCatalog::with_builtins`](crate::core::DriverCatalog::with_builtins).

pub mod common;
pub mod postgres;
pub mod sqlite;

pub use postgres::{PostgresConnection, PostgresDialect};
pub use sqlite::{SqliteConnection, SqliteDialect};
