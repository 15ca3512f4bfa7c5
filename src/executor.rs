//! `SqlExecutor` Module
//!
//! The SQL execution facade this crate runs on. The host application owns the
//! MySQL-protocol connection and implements this trait for it; every operation
//! in the crate borrows an executor for its duration and never stores it.

use crate::error::SqlError;

/// Trait for executing statements on a single MySQL-protocol connection
///
/// Implementations must run every call on the same underlying session: the
/// named lock is scoped to the connection that acquired it, so an executor that
/// spreads calls across a pool would release locks it never held.
///
/// # Examples
///
/// ```
/// use lifeguard_oceanbase::{SqlError, SqlExecutor};
///
/// struct Offline;
///
/// impl SqlExecutor for Offline {
///     fn execute(&self, _sql: &str) -> Result<(), SqlError> {
///         Err(SqlError::Connection("offline".into()))
///     }
///
///     fn query_scalar(&self, _sql: &str, _params: &[&str]) -> Result<Option<String>, SqlError> {
///         Err(SqlError::Connection("offline".into()))
///     }
/// }
///
/// assert!(Offline.execute("SELECT 1").is_err());
/// ```
pub trait SqlExecutor {
    /// Execute a statement, discarding any result set
    ///
    /// # Errors
    ///
    /// Returns `SqlError` if the statement fails.
    fn execute(&self, sql: &str) -> Result<(), SqlError>;

    /// Execute a query and return the first column of the first row
    ///
    /// `params` are bound positionally to `?` placeholders. Returns `Ok(None)`
    /// when the query produced no row or the value is SQL `NULL`.
    ///
    /// # Errors
    ///
    /// Returns `SqlError` if the query fails.
    fn query_scalar(&self, sql: &str, params: &[&str]) -> Result<Option<String>, SqlError>;

    /// Query a scalar and parse it as an integer
    ///
    /// `NULL`, no row and non-numeric values all read as `0`, the way JDBC's
    /// `queryForInt` treats them.
    ///
    /// # Errors
    ///
    /// Returns `SqlError` if the query fails.
    fn query_int(&self, sql: &str, params: &[&str]) -> Result<i64, SqlError> {
        Ok(self
            .query_scalar(sql, params)?
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(0))
    }
}

impl<T: SqlExecutor + ?Sized> SqlExecutor for &T {
    fn execute(&self, sql: &str) -> Result<(), SqlError> {
        (**self).execute(sql)
    }

    fn query_scalar(&self, sql: &str, params: &[&str]) -> Result<Option<String>, SqlError> {
        (**self).query_scalar(sql, params)
    }
}

impl<T: SqlExecutor + ?Sized> SqlExecutor for Box<T> {
    fn execute(&self, sql: &str) -> Result<(), SqlError> {
        (**self).execute(sql)
    }

    fn query_scalar(&self, sql: &str, params: &[&str]) -> Result<Option<String>, SqlError> {
        (**self).query_scalar(sql, params)
    }
}
