//! PostgreSQL driver built on tokio-postgres.

mod connection;
mod dialect;
mod types;

pub use connection::PostgresConnection;
pub use dialect::PostgresDialect;
