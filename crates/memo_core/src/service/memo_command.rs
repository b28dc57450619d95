//! Create-or-append memo use-case.
//!
//! # Responsibility
//! - Resolve the memo directory under a project root and pick a file name.
//! - Create a new memo or append an addendum inside the lockfile critical
//!   section.
//! - Convert every failure into a structured `MemoOutcome`.
//!
//! # Invariants
//! - The existence check and the write happen under the same lock, so
//!   concurrent invocations produce exactly one create and N-1 appends.
//! - `run`/`run_in` never return `Err`; failures are reported as
//!   `MemoOutcome::Failed`.
//! - Note content is never logged.

use crate::config::{ConfigError, RecorderConfig};
use crate::content::{
    append_note_content, filename_strategy_for, new_note_content, FilenameStrategy,
};
use crate::security::{new_session_id, validate_root, SecurityError};
use crate::storage::{DirectoryCache, FsError, FsService, LockError, LockService};
use chrono::Local;
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Aggregated error for the memo use-case.
#[derive(Debug)]
pub enum MemoError {
    Security(SecurityError),
    Fs(FsError),
    Lock(LockError),
    Config(ConfigError),
}

impl MemoError {
    /// Stable machine-readable code for logs and CLI output.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Security(SecurityError::InvalidRoot { .. }) => "invalid_root",
            Self::Fs(FsError::PathEscape { .. }) => "path_escape",
            Self::Fs(FsError::FileTooLarge { .. }) => "file_too_large",
            Self::Fs(FsError::Io(_)) => "io",
            Self::Lock(LockError::Timeout { .. }) => "lock_timeout",
            Self::Lock(LockError::Conflict { .. }) => "lock_conflict",
            Self::Lock(LockError::Io { .. }) => "lock_io",
            Self::Config(_) => "config",
        }
    }
}

impl Display for MemoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Security(err) => write!(f, "{err}"),
            Self::Fs(err) => write!(f, "{err}"),
            Self::Lock(err) => write!(f, "{err}"),
            Self::Config(err) => write!(f, "{err}"),
        }
    }
}

impl Error for MemoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Security(err) => Some(err),
            Self::Fs(err) => Some(err),
            Self::Lock(err) => Some(err),
            Self::Config(err) => Some(err),
        }
    }
}

impl From<SecurityError> for MemoError {
    fn from(value: SecurityError) -> Self {
        Self::Security(value)
    }
}

impl From<FsError> for MemoError {
    fn from(value: FsError) -> Self {
        Self::Fs(value)
    }
}

impl From<LockError> for MemoError {
    fn from(value: LockError) -> Self {
        Self::Lock(value)
    }
}

impl From<ConfigError> for MemoError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

/// Which write path an invocation took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoAction {
    Created,
    Appended,
}

impl MemoAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Appended => "appended",
        }
    }
}

/// Structured result of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoOutcome {
    Written {
        action: MemoAction,
        path: PathBuf,
        session_id: String,
        elapsed: Duration,
    },
    Failed {
        error_code: &'static str,
        message: String,
        elapsed: Duration,
    },
}

impl MemoOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Written { .. })
    }

    /// Process exit code: 0 on success, 1 on failure.
    pub fn exit_code(&self) -> u8 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            Self::Written { elapsed, .. } | Self::Failed { elapsed, .. } => *elapsed,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Written { path, .. } => Some(path),
            Self::Failed { .. } => None,
        }
    }
}

/// Memo recorder bound to one validated configuration.
pub struct MemoCommand {
    config: RecorderConfig,
    lock: LockService,
    filename_strategy: Box<dyn FilenameStrategy>,
    dir_cache: Option<Arc<Mutex<DirectoryCache>>>,
}

impl MemoCommand {
    /// Builds a command from `config`.
    ///
    /// # Errors
    /// - `Config` when `config.validate()` fails.
    pub fn new(config: RecorderConfig) -> Result<Self, MemoError> {
        config.validate()?;
        let lock = LockService::new()
            .with_timeout(config.lock_timeout())
            .with_retry_interval(config.lock_retry_interval(), config.lock_max_retry_interval())
            .with_stale_policy(config.stale_lock_policy);
        let dir_cache = config
            .dir_cache_ttl()
            .map(|ttl| Arc::new(Mutex::new(DirectoryCache::new(ttl))));

        Ok(Self {
            filename_strategy: filename_strategy_for(config.filename_style),
            config,
            lock,
            dir_cache,
        })
    }

    /// Replaces the configured file naming strategy.
    pub fn with_filename_strategy(mut self, strategy: Box<dyn FilenameStrategy>) -> Self {
        self.filename_strategy = strategy;
        self
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Records a memo under the current working directory.
    pub fn run(&self) -> MemoOutcome {
        match std::env::current_dir() {
            Ok(cwd) => self.run_in(cwd),
            Err(err) => MemoOutcome::Failed {
                error_code: "io",
                message: format!("cannot read working directory: {err}"),
                elapsed: Duration::ZERO,
            },
        }
    }

    /// Records a memo under `project_root`.
    ///
    /// # Side effects
    /// - Creates `<project_root>/<memo_dir_name>` when missing.
    /// - Creates or appends one memo file; a transient `.lock` sidecar exists
    ///   while writing.
    /// - Emits `memo_write` logging events with duration and status.
    pub fn run_in(&self, project_root: impl AsRef<Path>) -> MemoOutcome {
        let started_at = Instant::now();
        info!("event=memo_write module=command status=start");

        match self.execute(project_root.as_ref()) {
            Ok((action, path, session_id)) => {
                let elapsed = started_at.elapsed();
                info!(
                    "event=memo_write module=command status=ok action={} duration_ms={}",
                    action.as_str(),
                    elapsed.as_millis()
                );
                MemoOutcome::Written {
                    action,
                    path,
                    session_id,
                    elapsed,
                }
            }
            Err(err) => {
                let elapsed = started_at.elapsed();
                error!(
                    "event=memo_write module=command status=error duration_ms={} error_code={} error={}",
                    elapsed.as_millis(),
                    err.error_code(),
                    err
                );
                MemoOutcome::Failed {
                    error_code: err.error_code(),
                    message: err.to_string(),
                    elapsed,
                }
            }
        }
    }

    fn execute(&self, project_root: &Path) -> Result<(MemoAction, PathBuf, String), MemoError> {
        let project_root = validate_root(project_root)?;
        let fs = self.fs_service(&project_root)?;
        fs.ensure_directory(fs.base_dir())?;

        let file_name = self.filename_strategy.file_name(Local::now());
        let target = fs.resolve_within_base(Path::new(&file_name))?;
        let session_id = new_session_id();

        let write_note = || -> Result<MemoAction, MemoError> {
            let action = if fs.exists(&target) {
                fs.append_secure(&target, &append_note_content())?;
                MemoAction::Appended
            } else {
                fs.write_secure(&target, &new_note_content(&session_id))?;
                MemoAction::Created
            };
            Ok(action)
        };

        let action = match self.lock.with_lock(&target, write_note) {
            // A cached memo directory was deleted before the lock file went in.
            Err(MemoError::Lock(LockError::Io { source, .. }))
                if source.kind() == ErrorKind::NotFound && self.dir_cache.is_some() =>
            {
                fs.refresh_directory(target.parent().unwrap_or(fs.base_dir()))?;
                self.lock.with_lock(&target, write_note)?
            }
            other => other?,
        };
        Ok((action, target, session_id))
    }

    fn fs_service(&self, project_root: &Path) -> Result<FsService, MemoError> {
        let mut fs = FsService::try_new(project_root.join(&self.config.memo_dir_name))?
            .with_max_file_size(self.config.max_file_size_bytes)
            .with_stream_threshold(self.config.stream_threshold_bytes);
        if let Some(cache) = &self.dir_cache {
            fs = fs.with_directory_cache(Arc::clone(cache));
        }
        Ok(fs)
    }
}
