//! Product identity for MySQL-protocol servers

use crate::error::MigrationError;
use std::fmt;

/// Marker the reference dialect reports as its product name
pub const MYSQL_MARKER: &str = "MySQL";
/// Marker of the protocol-compatible fork
pub const MARIADB_MARKER: &str = "MariaDB";
/// Marker of the target product; it reports itself as MySQL during the handshake
pub const OCEANBASE_MARKER: &str = "OceanBase";

/// The concrete server family behind a MySQL-protocol connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    /// The reference dialect
    MySql,
    /// A drop-in compatible fork with its own quirks
    MariaDb,
    /// OceanBase in MySQL mode
    OceanBase,
}

impl Variant {
    pub fn name(self) -> &'static str {
        match self {
            Variant::MySql => MYSQL_MARKER,
            Variant::MariaDb => MARIADB_MARKER,
            Variant::OceanBase => OCEANBASE_MARKER,
        }
    }

    /// Whether the server speaks the reference dialect's behaviour, including
    /// products that mimic it
    pub fn is_mysql_family(self) -> bool {
        matches!(self, Variant::MySql | Variant::OceanBase)
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolved product identity; exactly one flag is set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DialectIdentity {
    variant: Variant,
}

impl DialectIdentity {
    pub fn new(variant: Variant) -> Self {
        Self { variant }
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn is_primary_variant(&self) -> bool {
        self.variant == Variant::MySql
    }

    pub fn is_compatible_fork(&self) -> bool {
        self.variant == Variant::MariaDb
    }

    pub fn is_target_variant(&self) -> bool {
        self.variant == Variant::OceanBase
    }
}

impl From<Variant> for DialectIdentity {
    fn from(variant: Variant) -> Self {
        Self::new(variant)
    }
}

/// Whether a connection is the target product
///
/// Requires both a MySQL or OceanBase product name and the OceanBase marker in
/// the version comment. The product name alone is never enough: OceanBase
/// answers the handshake as MySQL.
pub fn is_target_variant(product_name_hint: &str, version_comment: &str) -> bool {
    (product_name_hint.contains(MYSQL_MARKER) || product_name_hint.contains(OCEANBASE_MARKER))
        && version_comment.contains(OCEANBASE_MARKER)
}

/// Classify a connection from its product name and `version_comment`
///
/// The target is tested first, then the fork, then the reference dialect.
///
/// # Errors
///
/// Returns `MigrationError::UnsupportedProduct` when none of the markers match.
pub fn identify_variant(product_name_hint: &str, version_comment: &str) -> Result<DialectIdentity, MigrationError> {
    let variant = if is_target_variant(product_name_hint, version_comment) {
        Variant::OceanBase
    } else if product_name_hint.contains(MARIADB_MARKER) || version_comment.contains(MARIADB_MARKER) {
        Variant::MariaDb
    } else if product_name_hint.contains(MYSQL_MARKER) {
        Variant::MySql
    } else {
        return Err(MigrationError::UnsupportedProduct {
            product: product_name_hint.to_string(),
            comment: version_comment.to_string(),
        });
    };

    log::debug!("Identified '{product_name_hint}' ({version_comment}) as {variant}");
    Ok(DialectIdentity::new(variant))
}
