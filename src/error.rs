//! Error types for dialect detection, locking and schema history DDL

use thiserror::Error;

/// Error reported by the host's SQL execution facade
///
/// The adapter never opens connections itself, so this is the only shape
/// a driver failure takes once it crosses into the crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SqlError {
    /// The connection was lost or could not be used
    #[error("Connection error: {0}")]
    Connection(String),
    /// The server rejected the statement
    #[error("Query error{}: {message}", .code.map(|c| format!(" ({c})")).unwrap_or_default())]
    Query {
        /// Server error number, when the driver reports one
        code: Option<u16>,
        message: String,
    },
}

impl SqlError {
    /// Create a `Query` error without a server error number
    pub fn query(message: impl Into<String>) -> Self {
        SqlError::Query {
            code: None,
            message: message.into(),
        }
    }

    /// Create a `Query` error carrying the server error number
    pub fn with_code(code: u16, message: impl Into<String>) -> Self {
        SqlError::Query {
            code: Some(code),
            message: message.into(),
        }
    }
}

/// Migration-level errors surfaced by this crate
///
/// Capability probe failures never appear here: they are absorbed and
/// mapped to default capability values. Lock release failures are logged,
/// not returned.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Database execution error outside of lock acquisition
    #[error("Database error: {0}")]
    Database(#[from] SqlError),

    /// The version comment did not contain a recognisable version number
    #[error("Unable to determine version from '{0}'")]
    VersionParse(String),

    /// The connected server is not one of the supported products
    #[error("Unsupported database product '{product}' (version comment: '{comment}')")]
    UnsupportedProduct { product: String, comment: String },

    /// The server version is older than the minimum supported release
    #[error("Unsupported database version {found}: OceanBase {minimum} or newer is required")]
    UnsupportedVersion { found: String, minimum: String },

    /// The try-lock call itself failed
    #[error("Unable to acquire named lock: {name}")]
    LockAcquisition {
        name: String,
        #[source]
        source: SqlError,
    },

    /// Acquisition was cancelled while waiting between attempts
    #[error("Interrupted while attempting to acquire named lock: {name}")]
    LockInterrupted { name: String },

    /// This coordinator already holds the lock for the discriminator
    #[error(
        "Named lock {name} is already held on this connection\n\
         Nested acquisition would re-enter the server lock and release it early."
    )]
    LockAlreadyHeld { name: String },

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl MigrationError {
    /// Returns `true` for the lock acquisition failures (`LockAcquisition`,
    /// `LockInterrupted`, `LockAlreadyHeld`)
    pub fn is_lock_error(&self) -> bool {
        matches!(
            self,
            MigrationError::LockAcquisition { .. }
                | MigrationError::LockInterrupted { .. }
                | MigrationError::LockAlreadyHeld { .. }
        )
    }
}
