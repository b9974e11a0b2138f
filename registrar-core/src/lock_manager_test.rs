#[cfg(test)]
mod tests {
    use crate::error::RegistrarError;
    use crate::lock_manager::LockManager;
    use crate::types::LockType;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::time::Duration;

    #[test]
    fn acquire_and_release() {
        let locks = LockManager::new();
        let id = locks
            .acquire("R1", LockType::Write, "x", None)
            .expect("first acquire");

        assert_eq!(locks.active_lock_count(), 1);
        assert!(locks.release(&id));
        assert_eq!(locks.active_lock_count(), 0);
    }

    #[test]
    fn release_unknown_is_false() {
        let locks = LockManager::new();
        assert!(!locks.release("lock_missing"));
    }

    #[test]
    fn release_twice_is_idempotent_false() {
        let locks = LockManager::new();
        let id = locks.acquire("R1", LockType::Read, "x", None).unwrap();
        assert!(locks.release(&id));
        assert!(!locks.release(&id));
    }

    #[test]
    fn readers_share_a_resource() {
        let locks = LockManager::new();
        locks.acquire("R1", LockType::Read, "a", None).unwrap();
        locks.acquire("R1", LockType::Read, "b", None).unwrap();
        assert_eq!(locks.locks_on("R1").len(), 2);
    }

    #[test]
    fn writer_excluded_by_foreign_reader() {
        let locks = LockManager::new();
        locks.acquire("R1", LockType::Read, "a", None).unwrap();

        let err = locks.acquire("R1", LockType::Write, "b", None).unwrap_err();
        assert!(err.is_concurrency());
    }

    #[test]
    fn reader_excluded_by_foreign_writer() {
        let locks = LockManager::new();
        locks.acquire("R1", LockType::Exclusive, "a", None).unwrap();
        assert!(locks.acquire("R1", LockType::Read, "b", None).is_err());
    }

    #[test]
    fn same_holder_is_reentrant() {
        let locks = LockManager::new();
        locks.acquire("R1", LockType::Read, "a", None).unwrap();
        locks.acquire("R1", LockType::Write, "a", None).unwrap();
        locks.acquire("R1", LockType::Exclusive, "a", None).unwrap();
        assert_eq!(locks.locks_held_by("a").len(), 3);
    }

    #[test]
    fn different_resources_do_not_interact() {
        let locks = LockManager::new();
        locks.acquire("R1", LockType::Exclusive, "a", None).unwrap();
        assert!(locks.acquire("R2", LockType::Exclusive, "b", None).is_ok());
    }

    #[test]
    fn scoped_releases_on_normal_exit() {
        let locks = LockManager::new();
        {
            let guard = locks.scoped("R1", LockType::Write, "a", None).unwrap();
            assert!(!guard.lock_id().is_empty());
            assert!(locks.acquire("R1", LockType::Write, "b", None).is_err());
        }
        assert!(locks.acquire("R1", LockType::Write, "b", None).is_ok());
    }

    #[test]
    fn scoped_releases_on_error_path() {
        let locks = LockManager::new();

        let run = || -> Result<(), RegistrarError> {
            let _guard = locks.scoped("R1", LockType::Write, "a", None)?;
            Err(RegistrarError::Validation("boom".into()))
        };

        assert!(run().is_err());
        assert_eq!(locks.active_lock_count(), 0);
    }

    #[test]
    fn scoped_releases_on_panic() {
        let locks = LockManager::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = locks.scoped("R1", LockType::Exclusive, "a", None).unwrap();
            panic!("handler crashed");
        }));
        assert!(result.is_err());
        assert_eq!(locks.active_lock_count(), 0);
    }

    #[test]
    fn timed_out_lock_is_taken_over_by_next_acquirer() {
        let locks = LockManager::new();
        locks
            .acquire("R1", LockType::Write, "X", Some(Duration::from_millis(50)))
            .unwrap();
        assert!(locks.acquire("R1", LockType::Write, "Y", None).is_err());

        std::thread::sleep(Duration::from_millis(80));
        assert!(locks.acquire("R1", LockType::Write, "Y", None).is_ok());
    }

    #[test]
    fn sweep_releases_only_expired_locks() {
        let locks = LockManager::new();
        locks
            .acquire("R1", LockType::Write, "a", Some(Duration::from_millis(10)))
            .unwrap();
        locks.acquire("R2", LockType::Write, "b", None).unwrap();

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(locks.sweep_expired(), 1);
        assert_eq!(locks.active_lock_count(), 1);
        assert!(locks.locks_on("R1").is_empty());
    }

    #[test]
    fn background_sweeper_expires_write_lock() {
        // A WRITE lock with a 1s timeout is free for another holder 1.5s later.
        let locks = Arc::new(LockManager::new());
        let sweeper = locks.spawn_expiry_sweeper(Duration::from_millis(100));

        locks
            .acquire("R1", LockType::Write, "X", Some(Duration::from_secs(1)))
            .unwrap();
        std::thread::sleep(Duration::from_millis(1500));

        assert_eq!(locks.active_lock_count(), 0);
        assert!(locks.acquire("R1", LockType::Write, "Y", None).is_ok());
        sweeper.shutdown();
    }

    #[test]
    fn sweeper_stops_when_manager_dropped() {
        let locks = Arc::new(LockManager::new());
        let sweeper = locks.spawn_expiry_sweeper(Duration::from_millis(10));
        drop(locks);
        std::thread::sleep(Duration::from_millis(30));
        // Joining must not hang
        drop(sweeper);
    }

    #[test]
    fn versions_start_at_zero_and_increase() {
        let locks = LockManager::new();
        assert_eq!(locks.get_version("S1"), 0);
        assert_eq!(locks.increment_version("S1"), 1);
        assert_eq!(locks.increment_version("S1"), 2);
        assert!(locks.check_version("S1", 2));
        assert!(!locks.check_version("S1", 1));
        assert!(locks.require_version("S1", 2).is_ok());
        assert!(locks.require_version("S1", 0).unwrap_err().is_concurrency());
    }

    #[test]
    fn versions_are_independent_of_locks() {
        let locks = LockManager::new();
        locks.acquire("S1", LockType::Exclusive, "a", None).unwrap();
        assert_eq!(locks.increment_version("S1"), 1);
    }

    #[test]
    fn retry_succeeds_after_transient_conflicts() {
        let calls = AtomicUsize::new(0);
        let result = LockManager::execute_with_retry(
            || {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(RegistrarError::Concurrency("busy".into()))
                } else {
                    Ok(42)
                }
            },
            3,
            Duration::from_millis(1),
        );
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn retry_reraises_after_exhaustion() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = LockManager::execute_with_retry(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RegistrarError::Concurrency("busy".into()))
            },
            2,
            Duration::from_millis(1),
        );
        assert!(result.unwrap_err().is_concurrency());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn retry_does_not_retry_other_errors() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = LockManager::execute_with_retry(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RegistrarError::Validation("bad".into()))
            },
            5,
            Duration::from_millis(1),
        );
        assert!(matches!(result, Err(RegistrarError::Validation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_writers_never_overlap() {
        let locks = Arc::new(LockManager::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    let holder = format!("worker-{}", i);
                    for _ in 0..50 {
                        if let Ok(_guard) = locks.scoped("hot", LockType::Write, &holder, None) {
                            let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                            max_inside.fetch_max(now, Ordering::SeqCst);
                            std::thread::yield_now();
                            inside.fetch_sub(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(locks.active_lock_count(), 0);
    }
}
