//! Schema history bootstrap
//!
//! Called before any migration runs. Several instances may start together
//! (e.g. a Kubernetes rollout), so creation happens under the named lock and
//! the existence check is repeated once the lock is held.

use crate::dialect::database::OceanBaseDatabase;
use crate::error::MigrationError;
use crate::executor::SqlExecutor;
use crate::migration::table::SchemaHistoryTable;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Create the schema history table unless it already exists
///
/// With `baseline`, the new table also receives the baseline row, installed
/// by [`OceanBaseDatabase::current_user`]. Returns `true` when this call
/// created the table.
///
/// # Errors
///
/// Lock acquisition errors and SQL errors from the existence check or the
/// create script. The lock is released in every case.
///
/// # Example
///
/// ```rust,no_run
/// use lifeguard_oceanbase::{ensure_schema_history, DialectConfig, OceanBaseDatabase, SqlExecutor};
///
/// fn bootstrap(conn: &dyn SqlExecutor) -> Result<(), Box<dyn std::error::Error>> {
///     let db = OceanBaseDatabase::open(conn, "MySQL", DialectConfig::load()?)?;
///     ensure_schema_history(&db, conn, true)?;
///     Ok(())
/// }
/// ```
pub fn ensure_schema_history(
    db: &OceanBaseDatabase,
    executor: &dyn SqlExecutor,
    baseline: bool,
) -> Result<bool, MigrationError> {
    let history = SchemaHistoryTable::new(db.history_table());

    #[cfg(feature = "tracing")]
    let _span = tracing_helpers::history_span(&history.table().to_string()).entered();

    if history.exists(executor)? {
        log::debug!("Schema history table {} exists", history.table());
        return Ok(false);
    }

    let coordinator = db.lock_coordinator(executor);
    coordinator.with_lock(history.lock_discriminator(), || {
        // another instance may have won the race while we waited
        if history.exists(executor)? {
            log::debug!("Schema history table {} was created concurrently", history.table());
            return Ok(false);
        }

        let row = baseline.then(|| db.baseline_row(db.current_user(executor)));
        let script = db.create_script(history.table(), row.as_ref());
        history.create(executor, &script)?;
        log::info!("Created Schema History table {}", history.table());
        Ok(true)
    })
}
