//! Integration tests for named-lock coordination
//!
//! Several runners share one `MockServer`, each on its own connection, the
//! way separate processes would share an OceanBase cluster.

use lifeguard_oceanbase::test_helpers::MockServer;
use lifeguard_oceanbase::{cancellation, LockOptions, MigrationError, NamedLockCoordinator};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn fast_options() -> LockOptions {
    LockOptions {
        poll_interval: Duration::from_millis(5),
        ..LockOptions::default()
    }
}

#[test]
fn test_racing_runners_never_overlap() {
    init_logging();
    let server = MockServer::new();
    let inside = AtomicBool::new(false);
    let completed = AtomicUsize::new(0);

    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                let conn = server.connect();
                let coordinator = NamedLockCoordinator::with_options(&conn, fast_options());
                coordinator
                    .with_lock(7, || {
                        assert!(!inside.swap(true, Ordering::SeqCst), "two runners inside the lock");
                        thread::sleep(Duration::from_millis(20));
                        inside.store(false, Ordering::SeqCst);
                        completed.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, MigrationError>(())
                    })
                    .unwrap();
            });
        }
    });

    assert_eq!(completed.load(Ordering::SeqCst), 4);
    assert_eq!(server.lock_holder("Flyway-7"), None);
}

#[test]
fn test_different_discriminators_do_not_contend() {
    init_logging();
    let server = MockServer::new();
    let a = server.connect();
    let b = server.connect();
    let first = NamedLockCoordinator::new(&a);
    let second = NamedLockCoordinator::new(&b);

    let _one = first.acquire(1).unwrap();
    let _two = second.acquire(2).unwrap();
    assert_eq!(server.lock_holder("Flyway-1"), Some(a.id()));
    assert_eq!(server.lock_holder("Flyway-2"), Some(b.id()));
    assert_eq!(a.get_lock_attempts() + b.get_lock_attempts(), 2);
}

#[test]
fn test_waiting_runner_proceeds_after_release() {
    init_logging();
    let server = MockServer::new();
    let holder_conn = server.connect();
    let holder = NamedLockCoordinator::new(&holder_conn);
    let lock = holder.acquire(3).unwrap();

    thread::scope(|scope| {
        let waiter = scope.spawn(|| {
            let conn = server.connect();
            let coordinator = NamedLockCoordinator::with_options(&conn, fast_options());
            let granted = coordinator.with_lock(3, || Ok::<_, MigrationError>(conn.id()));
            (granted, conn.get_lock_attempts())
        });

        thread::sleep(Duration::from_millis(50));
        lock.release();

        let (granted, attempts) = waiter.join().unwrap();
        assert!(granted.is_ok());
        assert!(attempts > 1, "waiter should have polled while the lock was held");
    });
}

#[test]
fn test_cancelled_waiter_gives_up() {
    init_logging();
    let server = MockServer::new();
    let holder_conn = server.connect();
    let holder = NamedLockCoordinator::new(&holder_conn);
    let _lock = holder.acquire(9).unwrap();
    let (canceller, token) = cancellation();

    thread::scope(|scope| {
        let waiter = scope.spawn(|| {
            let conn = server.connect();
            NamedLockCoordinator::with_options(&conn, fast_options())
                .with_cancel_token(token)
                .acquire(9)
                .map(|_| ())
        });

        thread::sleep(Duration::from_millis(30));
        canceller.cancel();

        let err = waiter.join().unwrap().unwrap_err();
        assert!(matches!(err, MigrationError::LockInterrupted { ref name } if name == "Flyway-9"));
    });
    assert_eq!(server.lock_holder("Flyway-9"), Some(holder_conn.id()));
}
