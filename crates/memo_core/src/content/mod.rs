//! Memo text and file naming.
//!
//! # Responsibility
//! - Render the new-note and addendum markdown templates.
//! - Derive memo file names through a configurable strategy.
//!
//! # Invariants
//! - Every rendered string has passed through `security::sanitize`.

pub mod filename;
pub mod template;

pub use filename::{
    filename_strategy_for, DailyFilename, FilenameStrategy, FilenameStyle, TimestampFilename,
};
pub use template::{
    append_note_content, append_note_content_at, new_note_content, new_note_content_at,
    ADDENDUM_HEADING, NOTE_HEADING,
};
