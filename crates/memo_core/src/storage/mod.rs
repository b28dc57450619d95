//! Filesystem persistence for memo files.
//!
//! # Responsibility
//! - Sandbox every write under one absolute base directory.
//! - Serialize cooperating writers through `<target>.lock` marker files.
//!
//! # Invariants
//! - Writes never leave the base directory (lexical check before I/O).
//! - A lock file exists only while its holder runs the critical section.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::path::PathBuf;

mod fs_service;
pub mod lock;

pub use fs_service::{DirectoryCache, FsService, DEFAULT_MAX_FILE_SIZE_BYTES};
pub use lock::{LockError, LockGuard, LockService, LockState, StaleLockPolicy};

pub type FsResult<T> = Result<T, FsError>;

/// Sandboxed filesystem errors.
#[derive(Debug)]
pub enum FsError {
    /// Normalized target is outside the sandbox base directory.
    PathEscape { target: PathBuf, base: PathBuf },
    /// Existing file is larger than the configured limit.
    FileTooLarge {
        path: PathBuf,
        size_bytes: u64,
        limit_bytes: u64,
    },
    /// Underlying I/O failure, surfaced unchanged.
    Io(io::Error),
}

impl Display for FsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PathEscape { target, base } => write!(
                f,
                "path `{}` escapes base directory `{}`",
                target.display(),
                base.display()
            ),
            Self::FileTooLarge {
                path,
                size_bytes,
                limit_bytes,
            } => write!(
                f,
                "file `{}` is {size_bytes} bytes, exceeding the {limit_bytes} byte limit",
                path.display()
            ),
            Self::Io(err) => write!(f, "{err}"),
        }
    }
}

impl Error for FsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::PathEscape { .. } | Self::FileTooLarge { .. } => None,
        }
    }
}

impl From<io::Error> for FsError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}
