//! `OceanBaseDatabase` - an opened connection's dialect
//!
//! Ties detection, version resolution and capability probing together and
//! exposes the toggles a migration runner needs to drive the connection.

use crate::config::DialectConfig;
use crate::dialect::capabilities::DialectCapabilities;
use crate::dialect::identity::DialectIdentity;
use crate::dialect::probe;
use crate::dialect::quoting;
use crate::dialect::registry::{DialectRegistry, DEFAULT_REGISTRY};
use crate::dialect::version::{resolve_version, ResolvedVersion};
use crate::error::MigrationError;
use crate::executor::SqlExecutor;
use crate::migration::lock::NamedLockCoordinator;
use crate::migration::state_table::{build_create_statement, BaselineRow, CreateScript, TableRef};
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Oldest supported release, `(major, minor)`
pub const MINIMUM_VERSION: (u32, u32) = (1, 4);

/// Newest release this adapter has been verified against
pub const NEWEST_VERIFIED_VERSION: (u32, u32) = (5, 0);

/// Dialect state for one OceanBase connection
///
/// Built once by [`OceanBaseDatabase::open`]; nothing is re-probed afterwards.
#[derive(Debug, Clone)]
pub struct OceanBaseDatabase {
    identity: DialectIdentity,
    version: ResolvedVersion,
    capabilities: DialectCapabilities,
    config: DialectConfig,
}

impl OceanBaseDatabase {
    /// Open the dialect for the server behind `executor`
    ///
    /// `product_name` is what the driver reported at handshake, normally
    /// `MySQL` for OceanBase.
    ///
    /// # Errors
    ///
    /// - `UnsupportedProduct` when the server is not OceanBase
    /// - `VersionParse` when the version comment carries no version
    /// - `UnsupportedVersion` when the server is older than [`MINIMUM_VERSION`]
    pub fn open(
        executor: &dyn SqlExecutor,
        product_name: &str,
        config: DialectConfig,
    ) -> Result<Self, MigrationError> {
        Self::open_with(&DEFAULT_REGISTRY, executor, product_name, config)
    }

    /// [`OceanBaseDatabase::open`] against a custom registry
    pub fn open_with(
        registry: &DialectRegistry,
        executor: &dyn SqlExecutor,
        product_name: &str,
        config: DialectConfig,
    ) -> Result<Self, MigrationError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::open_span(product_name).entered();

        let detection = registry.detect(executor, product_name)?;
        let comment = detection.version_comment.unwrap_or_default();
        if !detection.identity.is_target_variant() {
            return Err(MigrationError::UnsupportedProduct {
                product: product_name.to_string(),
                comment,
            });
        }

        let version = resolve_version(&comment)?;
        let mut capabilities = DialectCapabilities::probe(executor, detection.identity);
        if let Some(atomic) = config.atomic_baseline_insert {
            capabilities = capabilities.with_atomic_baseline_insert(atomic);
        }

        let database = Self {
            identity: detection.identity,
            version,
            capabilities,
            config,
        };
        database.ensure_supported()?;

        log::info!("Database: {} {}", database.identity.variant(), database.version);
        Ok(database)
    }

    /// Reject releases older than [`MINIMUM_VERSION`]; warn on unverified newer ones
    pub fn ensure_supported(&self) -> Result<(), MigrationError> {
        let (major, minor) = MINIMUM_VERSION;
        if !self.version.is_at_least(major, minor) {
            return Err(MigrationError::UnsupportedVersion {
                found: self.version.to_string(),
                minimum: format!("{major}.{minor}"),
            });
        }

        let (major, minor) = NEWEST_VERIFIED_VERSION;
        if self.version.is_newer_than(major, minor) {
            log::warn!(
                "OceanBase {} is newer than this adapter supports. The latest verified version is {major}.{minor}",
                self.version
            );
        }
        Ok(())
    }

    pub fn identity(&self) -> DialectIdentity {
        self.identity
    }

    pub fn version(&self) -> &ResolvedVersion {
        &self.version
    }

    pub fn capabilities(&self) -> DialectCapabilities {
        self.capabilities
    }

    pub fn config(&self) -> &DialectConfig {
        &self.config
    }

    /// DDL commits implicitly
    pub fn supports_ddl_transactions(&self) -> bool {
        false
    }

    pub fn supports_changing_current_schema(&self) -> bool {
        true
    }

    /// Databases and schemas are the same thing
    pub fn catalog_is_schema(&self) -> bool {
        true
    }

    /// Run everything, including the history table lock, on the main connection
    pub fn use_single_connection(&self) -> bool {
        self.capabilities.use_single_connection()
    }

    pub fn open_quote(&self) -> &'static str {
        "`"
    }

    pub fn close_quote(&self) -> &'static str {
        "`"
    }

    pub fn boolean_true(&self) -> &'static str {
        "1"
    }

    pub fn boolean_false(&self) -> &'static str {
        "0"
    }

    pub fn quote(&self, identifier: &str) -> String {
        quoting::quote_identifier(identifier)
    }

    pub fn quote_qualified(&self, parts: &[&str]) -> String {
        quoting::quote_qualified(parts)
    }

    /// User to record as `installed_by`
    ///
    /// The configured override wins; otherwise the session user, or an empty
    /// string when it cannot be read.
    pub fn current_user(&self, executor: &dyn SqlExecutor) -> String {
        self.config
            .installed_by
            .clone()
            .or_else(|| probe::current_user(executor))
            .unwrap_or_default()
    }

    /// The configured schema history table
    pub fn history_table(&self) -> TableRef {
        TableRef {
            schema: self.config.schema.clone(),
            name: self.config.table.clone(),
        }
    }

    /// The configured baseline row, installed by `installed_by`
    pub fn baseline_row(&self, installed_by: impl Into<String>) -> BaselineRow {
        BaselineRow::new(
            self.config.baseline_version.clone(),
            self.config.baseline_description.clone(),
            installed_by,
        )
    }

    /// Statements creating `table`, with the baseline row when given
    pub fn create_script(&self, table: &TableRef, baseline: Option<&BaselineRow>) -> CreateScript {
        build_create_statement(table, baseline, &self.capabilities, self.config.tablespace.as_deref())
    }

    /// Named-lock coordinator for `executor`, using the configured lock options
    ///
    /// Every coordinator on the same executor sees the same held locks, so a
    /// fresh one per call cannot re-enter a lock the connection already holds.
    pub fn lock_coordinator<'e>(&self, executor: &'e dyn SqlExecutor) -> NamedLockCoordinator<'e> {
        NamedLockCoordinator::with_options(executor, self.config.lock_options())
    }
}
