//! Core logic for the session memo recorder.
//! This crate owns sandboxing, locking, redaction and note rendering.

pub mod config;
pub mod content;
pub mod logging;
pub mod security;
pub mod service;
pub mod storage;

pub use config::{ConfigError, RecorderConfig};
pub use content::{FilenameStrategy, FilenameStyle};
pub use logging::{
    default_log_level, flush_logging, init_logging, logging_status, LoggingError,
};
pub use security::{sanitize, validate_root, SecurityError, REDACTION_MARKER};
pub use service::memo_command::{MemoAction, MemoCommand, MemoError, MemoOutcome};
pub use storage::{FsError, FsService, LockError, LockGuard, LockService, StaleLockPolicy};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
