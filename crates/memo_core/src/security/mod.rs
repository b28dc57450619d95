//! Input validation and content redaction.
//!
//! # Responsibility
//! - Resolve project roots to absolute, traversal-free paths.
//! - Redact sensitive keywords and control characters from generated text.
//! - Produce display-only session identifiers.
//!
//! # Invariants
//! - A validated root never contains `..` components.
//! - Redaction is global: every keyword occurrence is replaced.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

mod root;
mod sanitizer;
mod session;

pub use root::validate_root;
pub use sanitizer::{sanitize, sanitize_with_count, Redaction, REDACTION_MARKER};
pub use session::new_session_id;

pub type SecurityResult<T> = Result<T, SecurityError>;

/// Root path validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityError {
    /// Root is empty, unresolvable or contains traversal segments.
    InvalidRoot { path: PathBuf, reason: &'static str },
}

impl Display for SecurityError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRoot { path, reason } => {
                write!(f, "invalid project root `{}`: {reason}", path.display())
            }
        }
    }
}

impl Error for SecurityError {}
