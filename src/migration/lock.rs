//! Flyway-style named-lock coordination
//!
//! Migration runs against a shared target are serialised with the server's
//! advisory lock (`GET_LOCK` / `RELEASE_LOCK`). The lock belongs to the
//! session that took it, so a coordinator is bound to one connection;
//! exclusivity between processes is whatever the server's lock provides.

use crate::dialect::quoting::string_literal;
use crate::error::MigrationError;
use crate::executor::SqlExecutor;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Lock name prefix shared with JVM Flyway runners on the same server
pub const DEFAULT_LOCK_PREFIX: &str = "Flyway";

/// Seconds the server waits inside a single `GET_LOCK` call
pub const DEFAULT_ATTEMPT_TIMEOUT_SECS: u32 = 10;

/// Pause between `GET_LOCK` attempts
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Named locks held by this process, per connection
///
/// The server lock is re-entrant for its session, so the check has to span
/// every coordinator borrowing the same connection.
static HELD_LOCKS: Lazy<Mutex<HashSet<HeldLock>>> = Lazy::new(|| Mutex::new(HashSet::new()));

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A connection is identified by the address of its executor, which cannot
/// move or drop while a guard borrows it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct HeldLock {
    connection: usize,
    name: String,
}

impl HeldLock {
    fn new(executor: &dyn SqlExecutor, name: String) -> Self {
        Self {
            connection: executor as *const dyn SqlExecutor as *const () as usize,
            name,
        }
    }
}

/// Create a linked cancellation pair
///
/// Cancelling closes the channel, which every clone of the token observes.
/// Dropping the last `Canceller` has the same effect.
pub fn cancellation() -> (Canceller, CancelToken) {
    let (tx, rx) = crossbeam_channel::bounded(0);
    (
        Canceller {
            tx: Arc::new(Mutex::new(Some(tx))),
        },
        CancelToken { rx },
    )
}

/// Interrupts lock acquisition waiting on the paired `CancelToken`
#[derive(Clone)]
pub struct Canceller {
    tx: Arc<Mutex<Option<Sender<()>>>>,
}

impl Canceller {
    pub fn cancel(&self) {
        guard(&self.tx).take();
    }
}

/// Interruptible sleep used between lock attempts
#[derive(Clone)]
pub struct CancelToken {
    rx: Receiver<()>,
}

impl CancelToken {
    /// A token that is never cancelled
    pub fn never() -> Self {
        Self {
            rx: crossbeam_channel::never(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Sleep for `duration`; returns `false` if cancelled first
    pub fn sleep(&self, duration: Duration) -> bool {
        matches!(self.rx.recv_timeout(duration), Err(RecvTimeoutError::Timeout))
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::never()
    }
}

/// Tunables for the acquisition loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOptions {
    pub prefix: String,
    pub attempt_timeout_secs: u32,
    pub poll_interval: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_LOCK_PREFIX.to_string(),
            attempt_timeout_secs: DEFAULT_ATTEMPT_TIMEOUT_SECS,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Acquires and releases named locks on one connection
///
/// Acquisition blocks the calling thread until the server grants the lock.
/// There is no overall deadline: each `GET_LOCK` call waits at most
/// `attempt_timeout_secs`, and the loop retries every `poll_interval` until it
/// succeeds, the try-lock call fails, or the `CancelToken` fires.
pub struct NamedLockCoordinator<'a> {
    executor: &'a dyn SqlExecutor,
    options: LockOptions,
    cancel: CancelToken,
}

impl<'a> NamedLockCoordinator<'a> {
    pub fn new(executor: &'a dyn SqlExecutor) -> Self {
        Self::with_options(executor, LockOptions::default())
    }

    pub fn with_options(executor: &'a dyn SqlExecutor, options: LockOptions) -> Self {
        Self {
            executor,
            options,
            cancel: CancelToken::never(),
        }
    }

    /// Make acquisition interruptible through `token`
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn options(&self) -> &LockOptions {
        &self.options
    }

    /// Server-side lock name for `discriminator`, e.g. `Flyway-42`
    pub fn lock_name(&self, discriminator: i32) -> String {
        format!("{}-{}", self.options.prefix, discriminator)
    }

    /// Whether this connection currently holds the lock for `discriminator`,
    /// through this coordinator or any other
    pub fn is_held(&self, discriminator: i32) -> bool {
        let key = HeldLock::new(self.executor, self.lock_name(discriminator));
        guard(&HELD_LOCKS).contains(&key)
    }

    /// Run `work` while holding the named lock for `discriminator`
    ///
    /// The lock is released once `work` returns, whether it succeeded, failed
    /// or panicked. Errors from `work` are returned unchanged; acquisition
    /// errors are converted into `E` and `work` never runs.
    ///
    /// # Errors
    ///
    /// - `MigrationError::LockAcquisition` if a `GET_LOCK` call fails
    /// - `MigrationError::LockInterrupted` if cancelled while waiting
    /// - `MigrationError::LockAlreadyHeld` if the connection already holds it
    /// - whatever `work` returns
    ///
    /// # Example
    ///
    /// ```
    /// use lifeguard_oceanbase::migration::NamedLockCoordinator;
    /// use lifeguard_oceanbase::MigrationError;
    /// # use lifeguard_oceanbase::{SqlError, SqlExecutor};
    /// # struct Conn;
    /// # impl SqlExecutor for Conn {
    /// #     fn execute(&self, _sql: &str) -> Result<(), SqlError> { Ok(()) }
    /// #     fn query_scalar(&self, _sql: &str, _params: &[&str]) -> Result<Option<String>, SqlError> {
    /// #         Ok(Some("1".to_string()))
    /// #     }
    /// # }
    ///
    /// let conn = Conn;
    /// let coordinator = NamedLockCoordinator::new(&conn);
    /// let applied = coordinator.with_lock(1, || Ok::<_, MigrationError>(3))?;
    /// assert_eq!(applied, 3);
    /// # Ok::<(), MigrationError>(())
    /// ```
    pub fn with_lock<T, E, F>(&self, discriminator: i32, work: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<MigrationError>,
    {
        let _lock = self.acquire(discriminator)?;
        work()
    }

    /// Acquire the named lock, returning a guard that releases it on drop
    ///
    /// # Errors
    ///
    /// See [`NamedLockCoordinator::with_lock`].
    pub fn acquire(&self, discriminator: i32) -> Result<NamedLockGuard<'_>, MigrationError> {
        let name = self.lock_name(discriminator);

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::lock_span(&name).entered();

        let key = HeldLock::new(self.executor, name.clone());
        if !guard(&HELD_LOCKS).insert(key.clone()) {
            return Err(MigrationError::LockAlreadyHeld { name });
        }

        let start = Instant::now();
        match self.poll(&name) {
            Ok(attempts) => {
                log::info!(
                    "Acquired named lock {name} after {attempts} attempt(s) in {:?}",
                    start.elapsed()
                );
                Ok(NamedLockGuard {
                    executor: self.executor,
                    key,
                    discriminator,
                    held: true,
                })
            }
            Err(e) => {
                guard(&HELD_LOCKS).remove(&key);
                Err(e)
            }
        }
    }

    fn poll(&self, name: &str) -> Result<u32, MigrationError> {
        let sql = format!("SELECT GET_LOCK(?,{})", self.options.attempt_timeout_secs);
        let mut attempts = 0u32;

        loop {
            attempts = attempts.saturating_add(1);
            let granted = self
                .executor
                .query_int(&sql, &[name])
                .map_err(|source| MigrationError::LockAcquisition {
                    name: name.to_string(),
                    source,
                })?;

            if granted == 1 {
                return Ok(attempts);
            }

            log::debug!(
                "Named lock {name} is busy (attempt {attempts}), retrying in {:?}",
                self.options.poll_interval
            );
            if !self.cancel.sleep(self.options.poll_interval) {
                log::warn!("Interrupted while waiting for named lock {name}");
                return Err(MigrationError::LockInterrupted { name: name.to_string() });
            }
        }
    }
}

/// A held named lock
///
/// Dropping the guard releases the lock. Release is best-effort: a failure
/// is logged and never reported, so it cannot mask the outcome of the work
/// done under the lock.
pub struct NamedLockGuard<'c> {
    executor: &'c dyn SqlExecutor,
    key: HeldLock,
    discriminator: i32,
    held: bool,
}

impl<'c> NamedLockGuard<'c> {
    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn discriminator(&self) -> i32 {
        self.discriminator
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    /// The connection the lock is held on
    pub fn executor(&self) -> &'c dyn SqlExecutor {
        self.executor
    }

    /// Release now instead of at drop
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.held {
            return;
        }
        self.held = false;
        guard(&HELD_LOCKS).remove(&self.key);

        let name = &self.key.name;
        let sql = format!("SELECT RELEASE_LOCK({})", string_literal(name));
        match self.executor.execute(&sql) {
            Ok(()) => log::debug!("Released named lock {name}"),
            Err(e) => log::error!("Unable to release named lock {name}: {e}"),
        }
    }
}

impl Drop for NamedLockGuard<'_> {
    fn drop(&mut self) {
        self.release_once();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SqlError;
    use crate::test_helpers::MockServer;
    use std::cell::Cell;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    #[derive(Debug)]
    enum WorkError {
        Lock(MigrationError),
        Failed(&'static str),
    }

    impl From<MigrationError> for WorkError {
        fn from(e: MigrationError) -> Self {
            WorkError::Lock(e)
        }
    }

    fn fast() -> LockOptions {
        LockOptions {
            poll_interval: Duration::from_millis(5),
            ..LockOptions::default()
        }
    }

    fn granted(value: &str) -> Result<Option<String>, SqlError> {
        Ok(Some(value.to_string()))
    }

    #[test]
    fn test_lock_name_uses_prefix_and_discriminator() {
        let conn = MockServer::new().connect();
        assert_eq!(NamedLockCoordinator::new(&conn).lock_name(42), "Flyway-42");

        let options = LockOptions {
            prefix: "billing".to_string(),
            ..LockOptions::default()
        };
        assert_eq!(NamedLockCoordinator::with_options(&conn, options).lock_name(-3), "billing--3");
    }

    #[test]
    fn test_success_releases_exactly_once() {
        let server = MockServer::new();
        let conn = server.connect();
        let coordinator = NamedLockCoordinator::new(&conn);

        let result = coordinator.with_lock(7, || {
            assert_eq!(server.lock_holder("Flyway-7"), Some(conn.id()));
            Ok::<_, MigrationError>("done")
        });

        assert_eq!(result.unwrap(), "done");
        assert_eq!(conn.release_attempts(), 1);
        assert_eq!(server.lock_holder("Flyway-7"), None);
        assert!(!coordinator.is_held(7));
        assert_eq!(
            conn.statements(),
            vec!["SELECT GET_LOCK(?,10)".to_string(), "SELECT RELEASE_LOCK('Flyway-7')".to_string()]
        );
    }

    #[test]
    fn test_work_error_passes_through_after_release() {
        let server = MockServer::new();
        let conn = server.connect();
        let coordinator = NamedLockCoordinator::new(&conn);

        let result: Result<(), WorkError> = coordinator.with_lock(1, || Err(WorkError::Failed("bad script")));

        assert!(matches!(result, Err(WorkError::Failed("bad script"))));
        assert_eq!(conn.release_attempts(), 1);
        assert_eq!(server.lock_holder("Flyway-1"), None);
    }

    #[test]
    fn test_sql_error_inside_work_lifts_into_migration_error() {
        let conn = MockServer::new().connect();
        let coordinator = NamedLockCoordinator::new(&conn);

        let create = || -> Result<(), SqlError> { Err(SqlError::with_code(1050, "Table already exists")) };

        let result = coordinator.with_lock(1, || -> Result<(), MigrationError> {
            create()?;
            Ok(())
        });

        assert!(matches!(result, Err(MigrationError::Database(SqlError::Query { code: Some(1050), .. }))));
        assert_eq!(conn.release_attempts(), 1);
    }

    #[test]
    fn test_panic_in_work_still_releases() {
        let server = MockServer::new();
        let conn = server.connect();
        let coordinator = NamedLockCoordinator::new(&conn);

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            coordinator.with_lock(2, || -> Result<(), MigrationError> { panic!("migration exploded") })
        }));

        assert!(outcome.is_err());
        assert_eq!(conn.release_attempts(), 1);
        assert_eq!(server.lock_holder("Flyway-2"), None);
    }

    #[test]
    fn test_busy_twice_then_granted_sleeps_twice() {
        let conn = MockServer::new().connect();
        conn.script_get_lock([granted("0"), granted("0"), granted("1")]);
        let coordinator = NamedLockCoordinator::new(&conn);
        let runs = Cell::new(0);

        let start = Instant::now();
        coordinator
            .with_lock(1, || {
                runs.set(runs.get() + 1);
                Ok::<_, MigrationError>(())
            })
            .unwrap();

        assert_eq!(conn.get_lock_attempts(), 3);
        assert!(start.elapsed() >= Duration::from_millis(200));
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn test_null_from_get_lock_is_retried() {
        let conn = MockServer::new().connect();
        conn.script_get_lock([Ok(None), granted("1")]);
        let coordinator = NamedLockCoordinator::with_options(&conn, fast());

        coordinator.with_lock(1, || Ok::<_, MigrationError>(())).unwrap();
        assert_eq!(conn.get_lock_attempts(), 2);
    }

    #[test]
    fn test_try_lock_error_is_fatal_without_retry() {
        let conn = MockServer::new().connect();
        conn.script_get_lock([Err(SqlError::Connection("server has gone away".into()))]);
        let coordinator = NamedLockCoordinator::with_options(&conn, fast());
        let ran = Cell::new(false);

        let result = coordinator.with_lock(9, || {
            ran.set(true);
            Ok::<_, MigrationError>(())
        });

        match result {
            Err(MigrationError::LockAcquisition { name, source }) => {
                assert_eq!(name, "Flyway-9");
                assert_eq!(source, SqlError::Connection("server has gone away".into()));
            }
            other => panic!("expected LockAcquisition, got {other:?}"),
        }
        assert!(!ran.get());
        assert_eq!(conn.get_lock_attempts(), 1);
        assert_eq!(conn.release_attempts(), 0);
        assert!(!coordinator.is_held(9));
    }

    #[test]
    fn test_cancel_while_waiting_interrupts() {
        let server = MockServer::new();
        let holder = server.connect();
        let waiter = server.connect();
        let holding = NamedLockCoordinator::new(&holder);
        let _held = holding.acquire(5).unwrap();

        let (canceller, token) = cancellation();
        let coordinator = NamedLockCoordinator::with_options(&waiter, fast()).with_cancel_token(token);

        let result = std::thread::scope(|scope| {
            scope.spawn(|| {
                std::thread::sleep(Duration::from_millis(30));
                canceller.cancel();
            });
            coordinator.with_lock(5, || Ok::<_, MigrationError>(()))
        });

        assert!(matches!(result, Err(MigrationError::LockInterrupted { ref name }) if name == "Flyway-5"));
        assert!(waiter.get_lock_attempts() >= 1);
        assert_eq!(waiter.release_attempts(), 0);
        assert_eq!(server.lock_holder("Flyway-5"), Some(holder.id()));
    }

    #[test]
    fn test_release_failure_is_swallowed() {
        let server = MockServer::new().with_failing_statement(
            "SELECT RELEASE_LOCK(",
            SqlError::Connection("lost connection".into()),
        );
        let conn = server.connect();
        let coordinator = NamedLockCoordinator::new(&conn);

        let ok = coordinator.with_lock(3, || Ok::<_, MigrationError>(11));
        assert_eq!(ok.unwrap(), 11);

        let err: Result<(), WorkError> = coordinator.with_lock(3, || Err(WorkError::Failed("original")));
        assert!(matches!(err, Err(WorkError::Failed("original"))));
        assert_eq!(conn.release_attempts(), 2);
    }

    #[test]
    fn test_nested_acquire_of_same_discriminator_is_refused() {
        let conn = MockServer::new().connect();
        let coordinator = NamedLockCoordinator::new(&conn);

        let outer = coordinator.acquire(1).unwrap();
        assert!(matches!(coordinator.acquire(1), Err(MigrationError::LockAlreadyHeld { .. })));

        // another discriminator is a different lock
        let other = coordinator.acquire(2).unwrap();
        assert_eq!(other.name(), "Flyway-2");
        drop(other);

        outer.release();
        assert!(!coordinator.is_held(1));
        assert_eq!(conn.release_attempts(), 2);
        assert!(coordinator.acquire(1).is_ok());
    }

    #[test]
    fn test_second_coordinator_on_same_connection_is_refused() {
        let server = MockServer::new();
        let conn = server.connect();
        let first = NamedLockCoordinator::new(&conn);
        let second = NamedLockCoordinator::with_options(&conn, fast());

        let outer = first.acquire(1).unwrap();
        assert!(second.is_held(1));
        assert!(matches!(
            second.acquire(1),
            Err(MigrationError::LockAlreadyHeld { ref name }) if name == "Flyway-1"
        ));
        // the refused attempt never touched the server
        assert_eq!(conn.get_lock_attempts(), 1);
        assert_eq!(conn.release_attempts(), 0);
        assert_eq!(server.lock_holder("Flyway-1"), Some(conn.id()));
        assert!(outer.is_held());

        drop(outer);
        assert!(!second.is_held(1));
        assert!(second.acquire(1).is_ok());
    }

    #[test]
    fn test_other_connections_track_their_own_locks() {
        let server = MockServer::new();
        let a = server.connect();
        let b = server.connect();
        let on_a = NamedLockCoordinator::new(&a);
        let on_b = NamedLockCoordinator::new(&b);

        let _held = on_a.acquire(4).unwrap();
        assert!(on_a.is_held(4));
        assert!(!on_b.is_held(4));

        // a different prefix is a different server lock on the same connection
        let options = LockOptions {
            prefix: "Deploy".to_string(),
            ..LockOptions::default()
        };
        let prefixed = NamedLockCoordinator::with_options(&a, options);
        assert_eq!(prefixed.acquire(4).unwrap().name(), "Deploy-4");
    }

    #[test]
    fn test_cancel_token_states() {
        assert!(!CancelToken::never().is_cancelled());
        assert!(CancelToken::never().sleep(Duration::from_millis(1)));

        let (canceller, token) = cancellation();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        canceller.cancel();
        assert!(token.is_cancelled());
        assert!(!clone.sleep(Duration::from_secs(5)));
    }
}
