//! Best-effort server variable probes
//!
//! Detection must never abort startup: a probe that fails for any reason
//! (feature disabled, table missing, permission denied, lost connection) reads
//! as "unknown" and the caller falls back to a default.

use crate::executor::SqlExecutor;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Product marker and version, e.g. `OceanBase 4.2.1 community`
pub const VERSION_COMMENT_QUERY: &str = "SELECT @@version_comment";

/// Percona XtraDB Cluster strict mode
pub const CLUSTER_STRICT_MODE_QUERY: &str = "select VARIABLE_VALUE from performance_schema.global_variables \
     where variable_name = 'pxc_strict_mode'";

/// GTID consistency enforcement
pub const GTID_CONSISTENCY_QUERY: &str = "SELECT @@GLOBAL.ENFORCE_GTID_CONSISTENCY";

/// Event scheduler catalog; fails when the scheduler is OFF or DISABLED on forks
pub const EVENT_CATALOG_QUERY: &str = "SELECT event_name FROM information_schema.events LIMIT 1";

/// Login name without the host part
pub const CURRENT_USER_QUERY: &str = "SELECT SUBSTRING_INDEX(USER(),'@',1)";

/// Outcome of a probe whose failure must be distinguishable from an empty result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The query ran; the scalar may be absent
    Answered(Option<String>),
    /// The query failed and was absorbed
    Failed,
}

impl ProbeOutcome {
    /// The scalar value, if the query ran and returned one
    pub fn value(&self) -> Option<&str> {
        match self {
            ProbeOutcome::Answered(value) => value.as_deref(),
            ProbeOutcome::Failed => None,
        }
    }

    /// Whether the query ran at all
    pub fn succeeded(&self) -> bool {
        matches!(self, ProbeOutcome::Answered(_))
    }
}

/// Run a diagnostic query, absorbing any failure
pub fn probe(executor: &dyn SqlExecutor, query: &str) -> ProbeOutcome {
    #[cfg(feature = "tracing")]
    let _span = tracing_helpers::probe_span(query).entered();

    match executor.query_scalar(query, &[]) {
        Ok(value) => ProbeOutcome::Answered(value),
        Err(e) => {
            log::debug!("Probe '{query}' failed, treating as unknown: {e}");
            ProbeOutcome::Failed
        }
    }
}

/// Run a scalar diagnostic query; failures and missing rows both read as `None`
pub fn probe_scalar(executor: &dyn SqlExecutor, query: &str) -> Option<String> {
    match probe(executor, query) {
        ProbeOutcome::Answered(value) => value,
        ProbeOutcome::Failed => None,
    }
}

/// The server's `version_comment`, if readable
pub fn version_comment(executor: &dyn SqlExecutor) -> Option<String> {
    probe_scalar(executor, VERSION_COMMENT_QUERY)
}

/// Whether the server runs in a Percona XtraDB Cluster in strict mode
///
/// `ENFORCING` and `MASTER` count as strict; anything else, or no answer, does not.
pub fn is_cluster_strict_mode(executor: &dyn SqlExecutor) -> bool {
    let strict = matches!(
        probe_scalar(executor, CLUSTER_STRICT_MODE_QUERY).as_deref(),
        Some("ENFORCING") | Some("MASTER")
    );
    if strict {
        log::debug!("Detected Percona XtraDB Cluster in strict mode");
    }
    strict
}

/// Whether GTID consistency is globally enforced (`ON`)
pub fn is_gtid_consistency_enforced(executor: &dyn SqlExecutor) -> bool {
    let enforced = probe_scalar(executor, GTID_CONSISTENCY_QUERY).as_deref() == Some("ON");
    if enforced {
        log::debug!("Detected GTID consistency being enforced");
    }
    enforced
}

/// Whether `information_schema.events` can be read
///
/// An empty result still counts as queryable; only a failed query does not.
pub fn is_event_catalog_queryable(executor: &dyn SqlExecutor) -> bool {
    let queryable = probe(executor, EVENT_CATALOG_QUERY).succeeded();
    if !queryable {
        log::debug!("Detected unqueryable event scheduler, most likely due to it being OFF or DISABLED");
    }
    queryable
}

/// The connected user's login name
pub fn current_user(executor: &dyn SqlExecutor) -> Option<String> {
    probe_scalar(executor, CURRENT_USER_QUERY)
}
