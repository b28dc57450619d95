//! Advisory lockfile mutual exclusion.
//!
//! # Responsibility
//! - Guard a target path with a sidecar `<target>.lock` file created with
//!   exclusive-create semantics and holding the owner's process id.
//! - Retry contended acquisitions with capped exponential backoff until a
//!   timeout elapses.
//!
//! # Invariants
//! - State flows `Idle -> Acquiring -> Held -> Released`.
//! - A held lock is released on every exit path of the critical section,
//!   including unwinding (`LockGuard` drop).
//! - The lock is advisory: processes ignoring the convention are not blocked.
//! - Stale locks are only reclaimed under `StaleLockPolicy::ReclaimDeadHolder`,
//!   one reclaimer at a time, and only while the file still names a dead pid.

use log::{debug, info, warn};
use serde::Deserialize;
use std::error::Error;
use std::ffi::OsString;
use std::fmt::{Display, Formatter};
use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(50);
pub const DEFAULT_MAX_RETRY_INTERVAL: Duration = Duration::from_secs(1);
const LOCK_SUFFIX: &str = ".lock";
const RECLAIM_SUFFIX: &str = ".reclaim";

/// What to do with a lock file whose recorded holder is gone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleLockPolicy {
    /// Treat every existing lock file as held until the timeout.
    #[default]
    Never,
    /// Remove a lock whose pid names a process that is no longer running.
    ReclaimDeadHolder,
}

/// Lifecycle of one lock acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Idle,
    Acquiring,
    Held,
    Released,
}

impl LockState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Acquiring => "acquiring",
            Self::Held => "held",
            Self::Released => "released",
        }
    }
}

/// Lock acquisition and release failures.
#[derive(Debug)]
pub enum LockError {
    /// Lock not acquired before the timeout.
    Timeout {
        lock_path: PathBuf,
        waited: Duration,
        attempts: u32,
    },
    /// Single-attempt acquisition found the lock held.
    Conflict { lock_path: PathBuf },
    /// Lock file could not be created or removed.
    Io {
        lock_path: PathBuf,
        source: io::Error,
    },
}

impl LockError {
    pub fn lock_path(&self) -> &Path {
        match self {
            Self::Timeout { lock_path, .. }
            | Self::Conflict { lock_path }
            | Self::Io { lock_path, .. } => lock_path,
        }
    }
}

impl Display for LockError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout {
                lock_path,
                waited,
                attempts,
            } => write!(
                f,
                "timed out after {}ms ({attempts} attempts) waiting for lock `{}`",
                waited.as_millis(),
                lock_path.display()
            ),
            Self::Conflict { lock_path } => {
                write!(f, "lock `{}` is held by another writer", lock_path.display())
            }
            Self::Io { lock_path, source } => {
                write!(f, "lock `{}` failed: {source}", lock_path.display())
            }
        }
    }
}

impl Error for LockError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Timeout { .. } | Self::Conflict { .. } => None,
        }
    }
}

/// Held lock. Dropping the guard releases it.
#[derive(Debug)]
pub struct LockGuard {
    lock_path: PathBuf,
    state: LockState,
}

impl LockGuard {
    fn held(lock_path: PathBuf) -> Self {
        debug!("event=lock_state module=lock state={}", LockState::Held.as_str());
        Self {
            lock_path,
            state: LockState::Held,
        }
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    pub fn state(&self) -> LockState {
        self.state
    }

    /// Deletes the lock file and reports removal errors.
    ///
    /// A lock file that is already gone counts as released.
    pub fn release(mut self) -> Result<(), LockError> {
        self.remove_lock_file()
    }

    fn remove_lock_file(&mut self) -> Result<(), LockError> {
        if self.state != LockState::Held {
            return Ok(());
        }
        self.state = LockState::Released;
        debug!(
            "event=lock_state module=lock state={}",
            LockState::Released.as_str()
        );
        match fs::remove_file(&self.lock_path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(LockError::Io {
                lock_path: self.lock_path.clone(),
                source,
            }),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(err) = self.remove_lock_file() {
            warn!(
                "event=lock_release module=lock status=error error_code=lock_release_failed error={}",
                err
            );
        }
    }
}

/// Lockfile-based mutual exclusion with retry and timeout.
#[derive(Debug, Clone)]
pub struct LockService {
    timeout: Duration,
    retry_interval: Duration,
    max_retry_interval: Duration,
    stale_policy: StaleLockPolicy,
}

impl Default for LockService {
    fn default() -> Self {
        Self::new()
    }
}

impl LockService {
    /// Creates a service with 30s timeout and 50ms..1s backoff.
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_LOCK_TIMEOUT,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            max_retry_interval: DEFAULT_MAX_RETRY_INTERVAL,
            stale_policy: StaleLockPolicy::Never,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the first retry delay and its ceiling. Equal values give a
    /// fixed interval.
    pub fn with_retry_interval(mut self, initial: Duration, max: Duration) -> Self {
        self.retry_interval = initial;
        self.max_retry_interval = max.max(initial);
        self
    }

    pub fn with_stale_policy(mut self, policy: StaleLockPolicy) -> Self {
        self.stale_policy = policy;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns `<path>.lock`.
    pub fn lock_path_for(path: impl AsRef<Path>) -> PathBuf {
        let mut raw: OsString = path.as_ref().as_os_str().to_owned();
        raw.push(LOCK_SUFFIX);
        PathBuf::from(raw)
    }

    /// Makes one acquisition attempt without retrying.
    ///
    /// # Errors
    /// - `Conflict` when the lock file already exists.
    /// - `Io` for any other creation failure.
    pub fn try_lock(&self, path: impl AsRef<Path>) -> Result<LockGuard, LockError> {
        let lock_path = Self::lock_path_for(path);
        match create_lock_file(&lock_path) {
            Ok(()) => Ok(LockGuard::held(lock_path)),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                Err(LockError::Conflict { lock_path })
            }
            Err(source) => Err(LockError::Io { lock_path, source }),
        }
    }

    /// Acquires the lock for `path`, retrying until the timeout.
    ///
    /// # Errors
    /// - `Timeout` when the lock stays held for the whole timeout.
    /// - `Io` immediately on any creation failure other than "already exists".
    pub fn acquire(&self, path: impl AsRef<Path>) -> Result<LockGuard, LockError> {
        let lock_path = Self::lock_path_for(path);
        let started_at = Instant::now();
        let mut delay = self.retry_interval;
        let mut attempts = 0u32;
        debug!(
            "event=lock_state module=lock state={}",
            LockState::Acquiring.as_str()
        );

        loop {
            attempts += 1;
            match create_lock_file(&lock_path) {
                Ok(()) => {
                    if attempts > 1 {
                        info!(
                            "event=lock_acquire module=lock status=ok attempts={} waited_ms={}",
                            attempts,
                            started_at.elapsed().as_millis()
                        );
                    }
                    return Ok(LockGuard::held(lock_path));
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    if self.stale_policy == StaleLockPolicy::ReclaimDeadHolder
                        && reclaim_if_stale(&lock_path)
                    {
                        continue;
                    }
                }
                Err(source) => {
                    warn!(
                        "event=lock_acquire module=lock status=error error_code=lock_io error={}",
                        source
                    );
                    return Err(LockError::Io { lock_path, source });
                }
            }

            let elapsed = started_at.elapsed();
            if elapsed >= self.timeout {
                warn!(
                    "event=lock_acquire module=lock status=error error_code=lock_timeout attempts={} waited_ms={}",
                    attempts,
                    elapsed.as_millis()
                );
                return Err(LockError::Timeout {
                    lock_path,
                    waited: elapsed,
                    attempts,
                });
            }

            thread::sleep(delay.min(self.timeout - elapsed));
            delay = delay.saturating_mul(2).min(self.max_retry_interval);
        }
    }

    /// Runs `critical_section` while holding the lock for `path`.
    ///
    /// The lock is released whatever the section returns. On success, a
    /// failure to remove the lock file is reported as the error.
    pub fn with_lock<T, E, F>(&self, path: impl AsRef<Path>, critical_section: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<LockError>,
    {
        let guard = self.acquire(path)?;
        let result = critical_section();
        let released = guard.release();

        match (result, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) => Err(err.into()),
            (Err(err), _) => Err(err),
        }
    }
}

fn create_lock_file(lock_path: &Path) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(lock_path)?;

    if let Err(err) = file.write_all(std::process::id().to_string().as_bytes()) {
        drop(file);
        let _ = fs::remove_file(lock_path);
        return Err(err);
    }
    Ok(())
}

/// Removes `lock_path` when it records a pid that is no longer running.
///
/// Reclaimers serialize on a `<lock>.reclaim` sidecar and re-read the pid
/// while holding it; a file naming a dead pid cannot change underneath
/// them. Unreadable or unparsable lock files are left alone: a holder may
/// be between creating the file and writing its pid.
fn reclaim_if_stale(lock_path: &Path) -> bool {
    if read_dead_holder(lock_path).is_none() {
        return false;
    }

    let reclaim_path = reclaim_path_for(lock_path);
    if create_lock_file(&reclaim_path).is_err() {
        // Another reclaimer is working on this lock.
        return false;
    }

    let reclaimed = match read_dead_holder(lock_path) {
        Some(pid) => match fs::remove_file(lock_path) {
            Ok(()) => {
                warn!(
                    "event=lock_reclaim module=lock status=ok stale_pid={}",
                    pid
                );
                true
            }
            Err(err) => err.kind() == ErrorKind::NotFound,
        },
        None => false,
    };

    if let Err(err) = fs::remove_file(&reclaim_path) {
        warn!(
            "event=lock_reclaim module=lock status=error error_code=reclaim_release error={}",
            err
        );
    }
    reclaimed
}

/// Pid recorded in `lock_path` when it parses and its process is gone.
fn read_dead_holder(lock_path: &Path) -> Option<u32> {
    let contents = fs::read_to_string(lock_path).ok()?;
    let pid = contents.trim().parse::<u32>().ok()?;
    if pid == std::process::id() || holder_is_alive(pid) {
        return None;
    }
    Some(pid)
}

fn reclaim_path_for(lock_path: &Path) -> PathBuf {
    let mut name = lock_path.as_os_str().to_os_string();
    name.push(RECLAIM_SUFFIX);
    PathBuf::from(name)
}

#[cfg(unix)]
fn holder_is_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return true;
    };
    if raw <= 0 {
        return true;
    }
    // Signal 0 only checks for existence; EPERM still means alive.
    !matches!(kill(Pid::from_raw(raw), None), Err(Errno::ESRCH))
}

#[cfg(not(unix))]
fn holder_is_alive(_pid: u32) -> bool {
    true
}
