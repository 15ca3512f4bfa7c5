//! Dialect registry tried in priority order against a live connection

use crate::dialect::identity::{
    is_target_variant, DialectIdentity, Variant, MARIADB_MARKER, MYSQL_MARKER, OCEANBASE_MARKER,
};
use crate::dialect::probe;
use crate::error::MigrationError;
use crate::executor::SqlExecutor;
use once_cell::sync::Lazy;

/// Registry used by `OceanBaseDatabase::open`
pub static DEFAULT_REGISTRY: Lazy<DialectRegistry> = Lazy::new(DialectRegistry::with_defaults);

/// A dialect the registry can hand a connection to
///
/// Candidates are plain data; how each variant recognises a connection is
/// decided by its `Variant`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialectCandidate {
    pub variant: Variant,
    /// Higher priorities are tried first
    pub priority: i32,
    /// Connection URL prefixes this dialect accepts
    pub url_prefixes: Vec<&'static str>,
}

impl DialectCandidate {
    /// OceanBase must outrank MySQL: it answers the handshake as MySQL and
    /// would otherwise be classified as the reference dialect.
    pub fn oceanbase() -> Self {
        Self {
            variant: Variant::OceanBase,
            priority: 1,
            url_prefixes: vec!["jdbc:oceanbase:", "oceanbase://", "jdbc:mysql:", "mysql://"],
        }
    }

    pub fn mariadb() -> Self {
        Self {
            variant: Variant::MariaDb,
            priority: 0,
            url_prefixes: vec!["jdbc:mariadb:", "mariadb://"],
        }
    }

    pub fn mysql() -> Self {
        Self {
            variant: Variant::MySql,
            priority: 0,
            url_prefixes: vec!["jdbc:mysql:", "mysql://"],
        }
    }

    /// Whether this dialect accepts the connection URL
    pub fn handles_url(&self, url: &str) -> bool {
        self.url_prefixes.iter().any(|prefix| url.starts_with(prefix))
    }

    /// Whether this dialect recognises the server
    ///
    /// `version_comment` is `None` when it could not be read; the target
    /// variant then never matches.
    pub fn handles(&self, product_name: &str, version_comment: Option<&str>) -> bool {
        match self.variant {
            Variant::OceanBase => version_comment.is_some_and(|comment| is_target_variant(product_name, comment)),
            Variant::MariaDb => {
                product_name.contains(MARIADB_MARKER) || version_comment.is_some_and(|c| c.contains(MARIADB_MARKER))
            }
            Variant::MySql => product_name.contains(MYSQL_MARKER),
        }
    }
}

/// Outcome of matching a connection against the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub identity: DialectIdentity,
    pub version_comment: Option<String>,
}

/// Ordered set of dialect candidates
#[derive(Debug, Clone, Default)]
pub struct DialectRegistry {
    candidates: Vec<DialectCandidate>,
}

impl DialectRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// OceanBase, MariaDB and MySQL with their standard priorities
    ///
    /// MariaDB is registered ahead of MySQL at the same priority so a fork
    /// reporting a MySQL product name is still recognised by its comment.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(DialectCandidate::mariadb());
        registry.register(DialectCandidate::mysql());
        registry.register(DialectCandidate::oceanbase());
        registry
    }

    /// Add a candidate, replacing any existing one for the same variant
    ///
    /// Returns the replaced candidate. Candidates with equal priority keep
    /// their registration order.
    pub fn register(&mut self, candidate: DialectCandidate) -> Option<DialectCandidate> {
        let previous = self
            .candidates
            .iter()
            .position(|c| c.variant == candidate.variant)
            .map(|index| self.candidates.remove(index));

        let index = self
            .candidates
            .iter()
            .position(|c| c.priority < candidate.priority)
            .unwrap_or(self.candidates.len());
        self.candidates.insert(index, candidate);
        previous
    }

    /// Candidates in the order they are tried
    pub fn candidates(&self) -> &[DialectCandidate] {
        &self.candidates
    }

    /// Highest-priority candidate accepting `url`
    pub fn for_url(&self, url: &str) -> Option<&DialectCandidate> {
        self.candidates.iter().find(|c| c.handles_url(url))
    }

    /// Match the server behind `executor`, reporting itself as `product_name`
    ///
    /// The version comment is probed at most once, and only when the product
    /// name carries one of the known markers.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::UnsupportedProduct` when no candidate matches.
    pub fn detect(&self, executor: &dyn SqlExecutor, product_name: &str) -> Result<Detection, MigrationError> {
        let known = [MYSQL_MARKER, MARIADB_MARKER, OCEANBASE_MARKER]
            .iter()
            .any(|marker| product_name.contains(marker));
        let version_comment = if known { probe::version_comment(executor) } else { None };

        self.candidates
            .iter()
            .find(|c| c.handles(product_name, version_comment.as_deref()))
            .map(|c| Detection {
                identity: DialectIdentity::new(c.variant),
                version_comment: version_comment.clone(),
            })
            .ok_or_else(|| MigrationError::UnsupportedProduct {
                product: product_name.to_string(),
                comment: version_comment.clone().unwrap_or_default(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::probe::VERSION_COMMENT_QUERY;
    use crate::error::SqlError;
    use crate::test_helpers::MockServer;

    #[test]
    fn test_default_order_puts_target_first() {
        let registry = DialectRegistry::with_defaults();
        let order: Vec<Variant> = registry.candidates().iter().map(|c| c.variant).collect();
        assert_eq!(order, vec![Variant::OceanBase, Variant::MariaDb, Variant::MySql]);
    }

    #[test]
    fn test_detects_target_behind_mysql_handshake() {
        let conn = MockServer::with_version_comment("OceanBase 4.2.1 community").connect();
        let detection = DEFAULT_REGISTRY.detect(&conn, "MySQL").unwrap();
        assert!(detection.identity.is_target_variant());
        assert_eq!(detection.version_comment.as_deref(), Some("OceanBase 4.2.1 community"));
    }

    #[test]
    fn test_unreadable_comment_falls_back_to_mysql() {
        let conn = MockServer::new()
            .with_failure(VERSION_COMMENT_QUERY, SqlError::Connection("reset".into()))
            .connect();
        let detection = DEFAULT_REGISTRY.detect(&conn, "MySQL").unwrap();
        assert!(detection.identity.is_primary_variant());
        assert_eq!(detection.version_comment, None);
    }

    #[test]
    fn test_priority_order_is_what_keeps_target_detectable() {
        let mut registry = DialectRegistry::new();
        registry.register(DialectCandidate::mysql());
        registry.register(DialectCandidate {
            priority: -1,
            ..DialectCandidate::oceanbase()
        });

        let conn = MockServer::with_version_comment("OceanBase 4.2.1 community").connect();
        let detection = registry.detect(&conn, "MySQL").unwrap();
        assert!(detection.identity.is_primary_variant());
    }

    #[test]
    fn test_register_replaces_same_variant() {
        let mut registry = DialectRegistry::with_defaults();
        let previous = registry.register(DialectCandidate {
            priority: 5,
            ..DialectCandidate::mariadb()
        });
        assert_eq!(previous.map(|c| c.priority), Some(0));
        assert_eq!(registry.candidates().len(), 3);
        assert_eq!(registry.candidates()[0].variant, Variant::MariaDb);
    }

    #[test]
    fn test_unknown_product_is_not_probed() {
        let conn = MockServer::with_version_comment("OceanBase 4.2.1").connect();
        let err = DEFAULT_REGISTRY.detect(&conn, "PostgreSQL").unwrap_err();
        assert!(matches!(err, MigrationError::UnsupportedProduct { .. }));
        assert!(conn.statements().is_empty());
    }

    #[test]
    fn test_url_routing() {
        let registry = DialectRegistry::with_defaults();
        assert_eq!(registry.for_url("jdbc:mysql://db:3306/app").map(|c| c.variant), Some(Variant::OceanBase));
        assert_eq!(registry.for_url("oceanbase://db:2881/app").map(|c| c.variant), Some(Variant::OceanBase));
        assert_eq!(registry.for_url("mariadb://db/app").map(|c| c.variant), Some(Variant::MariaDb));
        assert!(registry.for_url("postgres://db/app").is_none());
    }
}
