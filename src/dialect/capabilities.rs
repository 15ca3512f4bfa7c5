//! Per-connection dialect capabilities

use crate::dialect::identity::DialectIdentity;
use crate::dialect::probe;
use crate::executor::SqlExecutor;

/// Capability flags computed once when a connection is opened
///
/// The value is `Copy` and never re-probed: a session is assumed not to change
/// cluster mode while it is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialectCapabilities {
    /// Percona XtraDB Cluster with `pxc_strict_mode` ENFORCING or MASTER
    pub cluster_strict_mode: bool,
    /// `ENFORCE_GTID_CONSISTENCY = ON`; rules out `CREATE TABLE ... SELECT` on MySQL
    pub gtid_consistency_enforced: bool,
    /// `information_schema.events` can be read
    pub event_catalog_queryable: bool,
    /// The history table and its baseline row can be created in one statement
    pub supports_atomic_baseline_insert: bool,
}

impl Default for DialectCapabilities {
    /// What a server that answered none of the probes looks like
    fn default() -> Self {
        Self {
            cluster_strict_mode: false,
            gtid_consistency_enforced: false,
            event_catalog_queryable: false,
            supports_atomic_baseline_insert: true,
        }
    }
}

impl DialectCapabilities {
    /// Probe the server behind `executor`
    ///
    /// Strict-mode and GTID probes only run for the MySQL family; the fork has
    /// neither. The event catalog is always readable on the MySQL family and is
    /// only probed on the fork, where a disabled scheduler makes it fail.
    /// Any probe failure reads as `false`.
    pub fn probe(executor: &dyn SqlExecutor, identity: DialectIdentity) -> Self {
        let mysql_family = identity.variant().is_mysql_family();

        let capabilities = Self {
            cluster_strict_mode: mysql_family && probe::is_cluster_strict_mode(executor),
            gtid_consistency_enforced: mysql_family && probe::is_gtid_consistency_enforced(executor),
            event_catalog_queryable: mysql_family || probe::is_event_catalog_queryable(executor),
            supports_atomic_baseline_insert: true,
        };
        log::debug!("Probed {} capabilities: {capabilities:?}", identity.variant());
        capabilities
    }

    /// Override whether the baseline row may be inserted with `CREATE TABLE ... AS SELECT`
    #[must_use]
    pub fn with_atomic_baseline_insert(mut self, supported: bool) -> Self {
        self.supports_atomic_baseline_insert = supported;
        self
    }

    /// Strict cluster mode forbids the schema history lock on a second connection
    pub fn use_single_connection(&self) -> bool {
        !self.cluster_strict_mode
    }
}
