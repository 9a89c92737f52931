//! Error types for rcsel store access

use thiserror::Error;
use tracing::error;

/// Result type alias using rcsel Error
pub type Result<T> = std::result::Result<T, Error>;

/// rcsel store error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("MySQL error: {0}")]
    MySql(#[from] sqlx::Error),

    #[error("Unsupported database URL: {0}")]
    UnsupportedUrl(String),

    #[error("Invalid log timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid record scope: {0}")]
    InvalidScope(String),

    #[error("Store is closed")]
    Closed,
}

impl Error {
    /// SQLSTATE reported by the database vendor, when there is one.
    pub fn sql_state(&self) -> Option<String> {
        match self {
            Error::MySql(sqlx::Error::Database(db)) => db.code().map(|c| c.into_owned()),
            _ => None,
        }
    }

    /// Vendor-specific error number.
    pub fn vendor_code(&self) -> Option<i64> {
        match self {
            Error::Database(rusqlite::Error::SqliteFailure(e, _)) => Some(e.extended_code as i64),
            Error::MySql(sqlx::Error::Database(db)) => db
                .try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>()
                .map(|e| e.number() as i64),
            _ => None,
        }
    }

    /// Log this error with the vendor diagnostics attached.
    ///
    /// Store helpers that absorb failures call this before returning
    /// their empty result.
    pub fn log_diagnostics(&self, operation: &str) {
        error!(
            operation,
            sql_state = self.sql_state().as_deref().unwrap_or("-"),
            vendor_code = self.vendor_code().unwrap_or_default(),
            "{}",
            self
        );
    }
}
