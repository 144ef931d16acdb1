//! Configuration validation.

use super::Config;
use crate::error::{Result, TransferError};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    let conn = &config.connection;
    if conn.driver.trim().is_empty() {
        return Err(TransferError::config("connection.driver is required"));
    }

    match conn.driver.to_lowercase().as_str() {
        "sqlite" => {
            if conn.path.is_none() {
                return Err(TransferError::config(
                    "connection.path is required for the sqlite driver",
                ));
            }
        }
        "postgres" | "postgresql" | "pg" => {
            if conn.host.is_empty() {
                return Err(TransferError::config("connection.host is required"));
            }
            if conn.database.is_empty() {
                return Err(TransferError::config("connection.database is required"));
            }
            if conn.user.is_empty() {
                return Err(TransferError::config("connection.user is required"));
            }
        }
        // Other drivers are checked against the driver catalog at startup
        _ => {}
    }

    let transfer = &config.transfer;
    if transfer.batch_size == 0 {
        return Err(TransferError::config(
            "transfer.batch_size must be at least 1",
        ));
    }
    if !(0.0..1.0).contains(&transfer.delete_progress_fraction) {
        return Err(TransferError::Config(format!(
            "transfer.delete_progress_fraction must be in [0, 1), got {}",
            transfer.delete_progress_fraction
        )));
    }
    if !transfer.apply_import && !transfer.apply_sync {
        return Err(TransferError::config(
            "at least one of transfer.apply_import and transfer.apply_sync must be enabled",
        ));
    }

    let csv = &transfer.csv;
    if csv.delimiter.len() != 1 || !csv.delimiter.is_ascii() {
        return Err(TransferError::Config(format!(
            "transfer.csv.delimiter must be a single ASCII character, got {:?}",
            csv.delimiter
        )));
    }
    if csv.null_token.is_empty() {
        return Err(TransferError::config(
            "transfer.csv.null_token cannot be empty",
        ));
    }
    if csv.null_token.contains(csv.delimiter.as_str()) {
        return Err(TransferError::config(
            "transfer.csv.null_token cannot contain the delimiter",
        ));
    }

    if config.tables.manifest.is_none() && config.tables.table.trim().is_empty() {
        return Err(TransferError::config(
            "tables.table pattern cannot be empty (use \"*\" for all tables)",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionConfig, TablesConfig, TransferConfig};

    fn valid_config() -> Config {
        Config {
            connection: ConnectionConfig::sqlite("app.db"),
            transfer: TransferConfig::default(),
            tables: TablesConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_sqlite_requires_path() {
        let mut config = valid_config();
        config.connection.path = None;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("connection.path"));
    }

    #[test]
    fn test_postgres_requires_host_database_user() {
        let mut config = valid_config();
        config.connection.driver = "postgres".into();
        config.connection.path = None;
        assert!(validate(&config).unwrap_err().to_string().contains("host"));
        config.connection.host = "localhost".into();
        assert!(validate(&config).unwrap_err().to_string().contains("database"));
        config.connection.database = "app".into();
        assert!(validate(&config).unwrap_err().to_string().contains("user"));
        config.connection.user = "app".into();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_zero_batch_size() {
        let mut config = valid_config();
        config.transfer.batch_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_commit_interval_zero_is_allowed() {
        let mut config = valid_config();
        config.transfer.commit_interval = 0;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_delete_fraction_range() {
        let mut config = valid_config();
        config.transfer.delete_progress_fraction = 1.0;
        assert!(validate(&config).is_err());
        config.transfer.delete_progress_fraction = 0.0;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_delimiter_must_be_single_ascii() {
        let mut config = valid_config();
        config.transfer.csv.delimiter = "||".into();
        assert!(validate(&config).is_err());
        config.transfer.csv.delimiter = "\t".into();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_both_modes_disabled() {
        let mut config = valid_config();
        config.transfer.apply_import = false;
        assert!(validate(&config).is_err());
        config.transfer.apply_sync = true;
        assert!(validate(&config).is_ok());
    }
}
