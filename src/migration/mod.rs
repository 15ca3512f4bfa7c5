//! Migration infrastructure for OceanBase
//!
//! - Named-lock coordination across concurrently starting runners
//! - Schema history table DDL and operations
//! - Startup bootstrap of the history table
//!
//! # Example
//!
//! ```rust,no_run
//! use lifeguard_oceanbase::migration::NamedLockCoordinator;
//! use lifeguard_oceanbase::{MigrationError, SqlExecutor};
//!
//! fn migrate(conn: &dyn SqlExecutor) -> Result<(), MigrationError> {
//!     let coordinator = NamedLockCoordinator::new(conn);
//!     coordinator.with_lock(42, || {
//!         conn.execute("CREATE TABLE `t` (`id` INT)")?;
//!         Ok(())
//!     })
//! }
//! ```

pub mod lock;
pub mod startup;
pub mod state_table;
pub mod table;

pub use lock::{cancellation, CancelToken, Canceller, LockOptions, NamedLockCoordinator, NamedLockGuard};
pub use startup::ensure_schema_history;
pub use state_table::{baseline_insert_statement, build_create_statement, BaselineRow, CreateScript, TableRef};
pub use table::SchemaHistoryTable;
