//! Use-case orchestration.
//!
//! # Responsibility
//! - Compose security, content and storage layers into the memo command.
//! - Keep the CLI decoupled from filesystem and locking details.

pub mod memo_command;
