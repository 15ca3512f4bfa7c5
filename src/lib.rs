//! # Lifeguard OceanBase
//!
//! OceanBase (MySQL mode) dialect for Flyway-compatible schema migrations.
//!
//! OceanBase answers the MySQL handshake, so it is told apart from MySQL and
//! MariaDB by its `version_comment`. Once identified, the crate resolves the
//! server version, probes per-connection capabilities, serialises migration
//! runs across processes with server-side named locks and renders the schema
//! history table DDL.
//!
//! The host application owns the connection and lends it through
//! [`SqlExecutor`].

pub mod config;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod migration;

mod metrics;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use config::DialectConfig;
pub use dialect::{
    identify_variant, resolve_version, DialectCapabilities, DialectIdentity, DialectRegistry, OceanBaseDatabase,
    ResolvedVersion, Variant,
};
pub use error::{MigrationError, SqlError};
pub use executor::SqlExecutor;
pub use migration::{
    build_create_statement, cancellation, ensure_schema_history, BaselineRow, CancelToken, Canceller, CreateScript,
    LockOptions, NamedLockCoordinator, NamedLockGuard, SchemaHistoryTable, TableRef,
};

/// Version of this crate, reported alongside the dialect
pub const EXTENSION_VERSION: &str = env!("CARGO_PKG_VERSION");

/// One-line description shown when the dialect is loaded
pub fn description() -> String {
    format!("OceanBase database support {EXTENSION_VERSION} by lifeguard")
}
