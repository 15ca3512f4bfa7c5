//! In-memory MySQL-protocol server for tests
//!
//! `MockServer` answers scalar queries from a canned table and keeps a
//! server-wide named-lock table shared by every `MockConnection` it hands out,
//! so several threads can race for the same lock the way separate processes
//! would against a real server. `GET_LOCK` never blocks: a lock held by another
//! connection reports `0` immediately, as if the per-attempt timeout had elapsed.

use crate::dialect::probe::VERSION_COMMENT_QUERY;
use crate::error::SqlError;
use crate::executor::SqlExecutor;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct ServerState {
    scalars: Mutex<HashMap<String, Result<Option<String>, SqlError>>>,
    failing_statements: Mutex<Vec<(String, SqlError)>>,
    locks: Mutex<HashMap<String, u64>>,
    tables: Mutex<HashSet<String>>,
    next_connection: AtomicU64,
}

/// Simulated server shared by any number of connections
#[derive(Clone, Default)]
pub struct MockServer {
    state: Arc<ServerState>,
}

impl MockServer {
    /// A server that answers nothing: every scalar query fails
    pub fn new() -> Self {
        Self::default()
    }

    /// A server whose `version_comment` is `comment`
    pub fn with_version_comment(comment: &str) -> Self {
        Self::new().with_scalar(VERSION_COMMENT_QUERY, comment)
    }

    /// Answer `sql` with `value`
    pub fn with_scalar(self, sql: &str, value: &str) -> Self {
        guard(&self.state.scalars).insert(sql.to_string(), Ok(Some(value.to_string())));
        self
    }

    /// Answer `sql` with no row
    pub fn with_null(self, sql: &str) -> Self {
        guard(&self.state.scalars).insert(sql.to_string(), Ok(None));
        self
    }

    /// Fail `sql` with `error`
    pub fn with_failure(self, sql: &str, error: SqlError) -> Self {
        guard(&self.state.scalars).insert(sql.to_string(), Err(error));
        self
    }

    /// Fail any executed statement starting with `prefix`
    pub fn with_failing_statement(self, prefix: &str, error: SqlError) -> Self {
        guard(&self.state.failing_statements).push((prefix.to_string(), error));
        self
    }

    /// Open a new connection (session) to this server
    pub fn connect(&self) -> MockConnection {
        let id = self.state.next_connection.fetch_add(1, Ordering::SeqCst) + 1;
        MockConnection {
            id,
            state: Arc::clone(&self.state),
            statements: Mutex::new(Vec::new()),
            get_lock_script: Mutex::new(VecDeque::new()),
            get_lock_attempts: AtomicU64::new(0),
            releases: AtomicU64::new(0),
        }
    }

    /// Connection id currently holding `name`, if any
    pub fn lock_holder(&self, name: &str) -> Option<u64> {
        guard(&self.state.locks).get(name).copied()
    }

    /// Whether a history table called `name` has been created
    pub fn has_table(&self, name: &str) -> bool {
        guard(&self.state.tables).contains(name)
    }
}

/// One session on a `MockServer`
pub struct MockConnection {
    id: u64,
    state: Arc<ServerState>,
    statements: Mutex<Vec<String>>,
    get_lock_script: Mutex<VecDeque<Result<Option<String>, SqlError>>>,
    get_lock_attempts: AtomicU64,
    releases: AtomicU64,
}

impl MockConnection {
    /// Session id, as `CONNECTION_ID()` would report it
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Queue canned answers for the next `GET_LOCK` calls, ahead of the lock table
    pub fn script_get_lock(&self, answers: impl IntoIterator<Item = Result<Option<String>, SqlError>>) {
        guard(&self.get_lock_script).extend(answers);
    }

    /// Every statement and query issued on this connection, in order
    pub fn statements(&self) -> Vec<String> {
        guard(&self.statements).clone()
    }

    /// Number of `GET_LOCK` calls issued
    pub fn get_lock_attempts(&self) -> u64 {
        self.get_lock_attempts.load(Ordering::SeqCst)
    }

    /// Number of `RELEASE_LOCK` calls issued, successful or not
    pub fn release_attempts(&self) -> u64 {
        self.releases.load(Ordering::SeqCst)
    }

    fn get_lock(&self, params: &[&str]) -> Result<Option<String>, SqlError> {
        self.get_lock_attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(answer) = guard(&self.get_lock_script).pop_front() {
            return answer;
        }

        let name = params
            .first()
            .ok_or_else(|| SqlError::with_code(1582, "Incorrect parameter count in the call to native function 'GET_LOCK'"))?;
        let mut locks = guard(&self.state.locks);
        match locks.get(*name) {
            Some(owner) if *owner != self.id => Ok(Some("0".to_string())),
            _ => {
                locks.insert((*name).to_string(), self.id);
                Ok(Some("1".to_string()))
            }
        }
    }

    fn release_lock(&self, sql: &str) -> Result<(), SqlError> {
        let name = sql
            .split_once("('")
            .and_then(|(_, rest)| rest.split_once("')"))
            .map(|(name, _)| name)
            .ok_or_else(|| SqlError::with_code(1064, format!("malformed RELEASE_LOCK: {sql}")))?;

        let mut locks = guard(&self.state.locks);
        if locks.get(name) == Some(&self.id) {
            locks.remove(name);
        }
        Ok(())
    }

    fn track_tables(&self, sql: &str) {
        let mut tables = guard(&self.state.tables);
        if let Some(rest) = sql.strip_prefix("CREATE TABLE ") {
            tables.insert(unqualified_name(rest));
        } else if let Some(rest) = sql.strip_prefix("DROP TABLE ") {
            tables.remove(&unqualified_name(rest));
        }
    }
}

fn unqualified_name(rest: &str) -> String {
    let qualified = rest.split([' ', '(', '\n']).next().unwrap_or_default();
    qualified.rsplit('.').next().unwrap_or_default().trim_matches('`').to_string()
}

impl SqlExecutor for MockConnection {
    fn execute(&self, sql: &str) -> Result<(), SqlError> {
        guard(&self.statements).push(sql.to_string());

        let releasing = sql.starts_with("SELECT RELEASE_LOCK(");
        if releasing {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
        if let Some((_, error)) = guard(&self.state.failing_statements)
            .iter()
            .find(|(prefix, _)| sql.starts_with(prefix.as_str()))
        {
            return Err(error.clone());
        }
        if releasing {
            return self.release_lock(sql);
        }
        self.track_tables(sql);
        Ok(())
    }

    fn query_scalar(&self, sql: &str, params: &[&str]) -> Result<Option<String>, SqlError> {
        guard(&self.statements).push(sql.to_string());

        if sql.starts_with("SELECT GET_LOCK(") {
            return self.get_lock(params);
        }
        if sql.contains("information_schema.tables") {
            let exists = params.last().is_some_and(|name| guard(&self.state.tables).contains(*name));
            return Ok(exists.then(|| "1".to_string()));
        }
        guard(&self.state.scalars)
            .get(sql)
            .cloned()
            .unwrap_or_else(|| Err(SqlError::with_code(1064, format!("mock server cannot answer: {sql}"))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_table_is_shared_between_connections() {
        let server = MockServer::new();
        let a = server.connect();
        let b = server.connect();

        assert_eq!(a.query_int("SELECT GET_LOCK(?,10)", &["Flyway-1"]).unwrap(), 1);
        assert_eq!(b.query_int("SELECT GET_LOCK(?,10)", &["Flyway-1"]).unwrap(), 0);
        assert_eq!(server.lock_holder("Flyway-1"), Some(a.id()));

        // releasing someone else's lock is a no-op
        b.execute("SELECT RELEASE_LOCK('Flyway-1')").unwrap();
        assert_eq!(server.lock_holder("Flyway-1"), Some(a.id()));

        a.execute("SELECT RELEASE_LOCK('Flyway-1')").unwrap();
        assert_eq!(server.lock_holder("Flyway-1"), None);
        assert_eq!(b.query_int("SELECT GET_LOCK(?,10)", &["Flyway-1"]).unwrap(), 1);
    }

    #[test]
    fn test_tables_tracked_by_unqualified_name() {
        let server = MockServer::new();
        let conn = server.connect();
        conn.execute("CREATE TABLE `app`.`flyway_schema_history` (\n `x` INT)").unwrap();
        assert!(server.has_table("flyway_schema_history"));
        conn.execute("DROP TABLE `app`.`flyway_schema_history`").unwrap();
        assert!(!server.has_table("flyway_schema_history"));
    }
}
