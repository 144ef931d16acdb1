//! SQLite driver.

mod connection;
mod dialect;
mod types;

pub use connection::SqliteConnection;
pub use dialect::SqliteDialect;
pub use types::sql_type_for;
