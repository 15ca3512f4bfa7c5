//! Version comment parsing

use crate::error::MigrationError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;

/// `major.minor` with an optional `.patch`; trailing build suffixes are ignored
static VERSION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)\.(\d+)(?:\.(\d+))?").expect("version pattern is a valid regex")
});

/// Server version derived from the `version_comment` variable
///
/// Ordering and equality consider the numeric parts only.
#[derive(Debug, Clone)]
pub struct ResolvedVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: Option<u32>,
    /// The version token as reported by the server, e.g. `4.2.1`
    pub raw: String,
}

impl ResolvedVersion {
    /// Build a version from its numeric parts
    pub fn new(major: u32, minor: u32) -> Self {
        Self {
            major,
            minor,
            patch: None,
            raw: format!("{major}.{minor}"),
        }
    }

    fn key(&self) -> (u32, u32, u32) {
        (self.major, self.minor, self.patch.unwrap_or(0))
    }

    /// `true` when this version is at least `major.minor`
    pub fn is_at_least(&self, major: u32, minor: u32) -> bool {
        (self.major, self.minor) >= (major, minor)
    }

    /// `true` when this version is strictly newer than `major.minor`
    pub fn is_newer_than(&self, major: u32, minor: u32) -> bool {
        (self.major, self.minor) > (major, minor)
    }
}

impl PartialEq for ResolvedVersion {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for ResolvedVersion {}

impl PartialOrd for ResolvedVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ResolvedVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for ResolvedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Parse a `version_comment` such as `OceanBase 4.2.1 community`
///
/// The first whitespace-delimited field is the product marker; the second is
/// the version token.
///
/// # Errors
///
/// Returns `MigrationError::VersionParse` when there is no second field or it
/// does not start with `major.minor`.
pub fn resolve_version(version_comment: &str) -> Result<ResolvedVersion, MigrationError> {
    let token = version_comment
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| MigrationError::VersionParse(version_comment.to_string()))?;

    let captures = VERSION_PATTERN
        .captures(token)
        .ok_or_else(|| MigrationError::VersionParse(version_comment.to_string()))?;

    let number = |index: usize| -> Result<Option<u32>, MigrationError> {
        captures
            .get(index)
            .map(|m| m.as_str().parse::<u32>())
            .transpose()
            .map_err(|_| MigrationError::VersionParse(version_comment.to_string()))
    };

    let major = number(1)?.ok_or_else(|| MigrationError::VersionParse(version_comment.to_string()))?;
    let minor = number(2)?.ok_or_else(|| MigrationError::VersionParse(version_comment.to_string()))?;
    let patch = number(3)?;

    Ok(ResolvedVersion {
        major,
        minor,
        patch,
        raw: token.to_string(),
    })
}
