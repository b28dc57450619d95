//! Recorder configuration.
//!
//! # Responsibility
//! - Hold tunables for sandboxing, locking and file naming.
//! - Load overrides from an optional JSON file; every field has a default.
//!
//! # Invariants
//! - A config passed to `MemoCommand` has been checked by `validate()`.

use crate::content::FilenameStyle;
use crate::storage::{StaleLockPolicy, DEFAULT_MAX_FILE_SIZE_BYTES};
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_MEMO_DIR_NAME: &str = "memos";

/// Tunables for one recorder instance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecorderConfig {
    /// Directory under the project root that holds memo files.
    pub memo_dir_name: String,
    /// Existing files larger than this are refused.
    pub max_file_size_bytes: u64,
    /// Content larger than this is streamed in chunks.
    pub stream_threshold_bytes: usize,
    pub lock_timeout_ms: u64,
    pub lock_retry_interval_ms: u64,
    pub lock_max_retry_interval_ms: u64,
    pub stale_lock_policy: StaleLockPolicy,
    pub filename_style: FilenameStyle,
    /// Enables the directory-existence cache when set. A cached directory
    /// deleted externally is recreated on the next write into it.
    pub dir_cache_ttl_ms: Option<u64>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            memo_dir_name: DEFAULT_MEMO_DIR_NAME.to_string(),
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
            stream_threshold_bytes: 64 * 1024,
            lock_timeout_ms: 30_000,
            lock_retry_interval_ms: 50,
            lock_max_retry_interval_ms: 1_000,
            stale_lock_policy: StaleLockPolicy::Never,
            filename_style: FilenameStyle::Timestamp,
            dir_cache_ttl_ms: None,
        }
    }
}

impl RecorderConfig {
    /// Reads and validates a JSON config file.
    ///
    /// # Errors
    /// - `Io` when the file cannot be read.
    /// - `Parse` on malformed JSON or unknown fields.
    /// - `Invalid` when a value fails `validate()`.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Parses and validates a JSON config document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let dir = self.memo_dir_name.trim();
        if dir.is_empty() {
            return Err(ConfigError::Invalid("memo_dir_name must not be empty"));
        }
        if dir.contains(['/', '\\']) || dir == "." || dir == ".." {
            return Err(ConfigError::Invalid(
                "memo_dir_name must be a single directory name",
            ));
        }
        if self.max_file_size_bytes == 0 {
            return Err(ConfigError::Invalid("max_file_size_bytes must be > 0"));
        }
        if self.lock_timeout_ms == 0 {
            return Err(ConfigError::Invalid("lock_timeout_ms must be > 0"));
        }
        if self.lock_retry_interval_ms == 0 {
            return Err(ConfigError::Invalid("lock_retry_interval_ms must be > 0"));
        }
        if self.lock_max_retry_interval_ms < self.lock_retry_interval_ms {
            return Err(ConfigError::Invalid(
                "lock_max_retry_interval_ms must be >= lock_retry_interval_ms",
            ));
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn lock_retry_interval(&self) -> Duration {
        Duration::from_millis(self.lock_retry_interval_ms)
    }

    pub fn lock_max_retry_interval(&self) -> Duration {
        Duration::from_millis(self.lock_max_retry_interval_ms)
    }

    pub fn dir_cache_ttl(&self) -> Option<Duration> {
        self.dir_cache_ttl_ms.map(Duration::from_millis)
    }
}

/// Config loading failures.
#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
    Invalid(&'static str),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config json: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}
