use memo_core::storage::LockState;
use memo_core::{LockError, LockService, StaleLockPolicy};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug)]
enum SectionError {
    Lock(LockError),
    Failed(&'static str),
}

impl From<LockError> for SectionError {
    fn from(value: LockError) -> Self {
        Self::Lock(value)
    }
}

fn fast_lock(timeout: Duration) -> LockService {
    LockService::new()
        .with_timeout(timeout)
        .with_retry_interval(Duration::from_millis(5), Duration::from_millis(20))
}

#[test]
fn held_lock_times_out_with_timeout_error() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("note.md");
    let lock_path = LockService::lock_path_for(&target);
    std::fs::write(&lock_path, "999999").unwrap();

    let started_at = Instant::now();
    let err = fast_lock(Duration::from_millis(200))
        .acquire(&target)
        .unwrap_err();

    assert!(started_at.elapsed() >= Duration::from_millis(200));
    match err {
        LockError::Timeout {
            lock_path: reported,
            attempts,
            ..
        } => {
            assert_eq!(reported, lock_path);
            assert!(attempts > 1);
        }
        other => panic!("expected Timeout, got {other}"),
    }
    assert!(lock_path.exists(), "a waiter must not remove a held lock");
}

#[test]
fn try_lock_fails_fast_with_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("note.md");
    let service = LockService::new();

    let guard = service.try_lock(&target).unwrap();
    let err = service.try_lock(&target).unwrap_err();
    assert!(matches!(err, LockError::Conflict { .. }));

    guard.release().unwrap();
    service.try_lock(&target).unwrap();
}

#[test]
fn with_lock_releases_after_error() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("note.md");
    let service = fast_lock(Duration::from_secs(1));

    let result: Result<(), SectionError> =
        service.with_lock(&target, || Err(SectionError::Failed("write failed")));

    assert!(matches!(result, Err(SectionError::Failed("write failed"))));
    assert!(!LockService::lock_path_for(&target).exists());
}

#[test]
fn with_lock_releases_during_unwind() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("note.md");
    let service = fast_lock(Duration::from_secs(1));

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _: Result<(), SectionError> = service.with_lock(&target, || panic!("boom"));
    }));

    assert!(outcome.is_err());
    assert!(!LockService::lock_path_for(&target).exists());
}

#[test]
fn explicit_release_transitions_state() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("note.md");

    let guard = LockService::new().acquire(&target).unwrap();
    assert_eq!(guard.state(), LockState::Held);
    assert!(guard.lock_path().exists());

    let lock_path = guard.lock_path().to_path_buf();
    guard.release().unwrap();
    assert!(!lock_path.exists());
}

#[test]
fn waiter_proceeds_once_holder_releases() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("note.md");
    let service = fast_lock(Duration::from_secs(5));

    let guard = service.acquire(&target).unwrap();
    let waiter = {
        let service = service.clone();
        let target = target.clone();
        thread::spawn(move || service.acquire(&target).map(|guard| guard.release()))
    };

    thread::sleep(Duration::from_millis(100));
    guard.release().unwrap();

    let released = waiter.join().unwrap().expect("waiter should acquire");
    released.unwrap();
}

#[test]
fn critical_sections_never_overlap() {
    let dir = tempfile::tempdir().unwrap();
    let target = Arc::new(dir.path().join("note.md"));
    let service = fast_lock(Duration::from_secs(10));
    let inside = Arc::new(AtomicUsize::new(0));
    let max_inside = Arc::new(AtomicUsize::new(0));
    let completed = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = service.clone();
            let target = Arc::clone(&target);
            let inside = Arc::clone(&inside);
            let max_inside = Arc::clone(&max_inside);
            let completed = Arc::clone(&completed);
            thread::spawn(move || {
                let result: Result<(), SectionError> = service.with_lock(target.as_path(), || {
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(10));
                    inside.fetch_sub(1, Ordering::SeqCst);
                    completed.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
                result.unwrap();
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    assert_eq!(completed.load(Ordering::SeqCst), 8);
    assert!(!LockService::lock_path_for(target.as_path()).exists());
}

#[test]
fn live_holder_is_never_reclaimed() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("note.md");
    let lock_path = LockService::lock_path_for(&target);
    std::fs::write(&lock_path, std::process::id().to_string()).unwrap();

    let err = fast_lock(Duration::from_millis(100))
        .with_stale_policy(StaleLockPolicy::ReclaimDeadHolder)
        .acquire(&target)
        .unwrap_err();

    assert!(matches!(err, LockError::Timeout { .. }));
    assert!(lock_path.exists());
}

#[cfg(unix)]
fn dead_pid() -> u32 {
    let mut child = std::process::Command::new("true").spawn().unwrap();
    let pid = child.id();
    child.wait().unwrap();
    pid
}

#[cfg(unix)]
#[test]
fn dead_holder_lock_is_reclaimed_only_when_enabled() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("note.md");
    let lock_path = LockService::lock_path_for(&target);

    std::fs::write(&lock_path, dead_pid().to_string()).unwrap();

    let err = fast_lock(Duration::from_millis(100))
        .acquire(&target)
        .unwrap_err();
    assert!(matches!(err, LockError::Timeout { .. }));

    let guard = fast_lock(Duration::from_secs(2))
        .with_stale_policy(StaleLockPolicy::ReclaimDeadHolder)
        .acquire(&target)
        .unwrap();
    let recorded = std::fs::read_to_string(guard.lock_path()).unwrap();
    assert_eq!(recorded, std::process::id().to_string());
}

#[test]
fn unparsable_lock_contents_are_left_alone() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("note.md");
    let lock_path = LockService::lock_path_for(&target);
    std::fs::write(&lock_path, "").unwrap();

    let err = fast_lock(Duration::from_millis(60))
        .with_stale_policy(StaleLockPolicy::ReclaimDeadHolder)
        .acquire(&target)
        .unwrap_err();
    assert!(matches!(err, LockError::Timeout { .. }));
}

#[cfg(unix)]
#[test]
fn racing_reclaimers_admit_one_holder_at_a_time() {
    let dir = tempfile::tempdir().unwrap();
    let target = Arc::new(dir.path().join("note.md"));
    let lock_path = LockService::lock_path_for(target.as_path());
    let stale_pid = dead_pid();
    let service = fast_lock(Duration::from_secs(10))
        .with_stale_policy(StaleLockPolicy::ReclaimDeadHolder);

    for _ in 0..40 {
        std::fs::write(&lock_path, stale_pid.to_string()).unwrap();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                let target = Arc::clone(&target);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                thread::spawn(move || {
                    let result: Result<(), SectionError> =
                        service.with_lock(target.as_path(), || {
                            let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                            max_inside.fetch_max(now, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(1));
                            inside.fetch_sub(1, Ordering::SeqCst);
                            Ok(())
                        });
                    result.unwrap();
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert!(leftovers.is_empty(), "sidecars left behind: {leftovers:?}");
}

#[cfg(unix)]
#[test]
fn busy_reclaim_sidecar_blocks_reclaim() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("note.md");
    let lock_path = LockService::lock_path_for(&target);
    let mut reclaim_path = lock_path.clone().into_os_string();
    reclaim_path.push(".reclaim");
    std::fs::write(&lock_path, dead_pid().to_string()).unwrap();
    std::fs::write(&reclaim_path, std::process::id().to_string()).unwrap();

    let err = fast_lock(Duration::from_millis(100))
        .with_stale_policy(StaleLockPolicy::ReclaimDeadHolder)
        .acquire(&target)
        .unwrap_err();
    assert!(matches!(err, LockError::Timeout { .. }));
    assert!(lock_path.exists());

    std::fs::remove_file(&reclaim_path).unwrap();
    fast_lock(Duration::from_secs(2))
        .with_stale_policy(StaleLockPolicy::ReclaimDeadHolder)
        .acquire(&target)
        .unwrap()
        .release()
        .unwrap();
}
