use crate::security::sanitize;
use chrono::{DateTime, Local};

/// Title text of a freshly created memo.
pub const NOTE_HEADING: &str = "セッション記録";
/// Heading text of every appended block.
pub const ADDENDUM_HEADING: &str = "追記";
const COMMAND_NAME: &str = "/memo";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Renders the new-memo template for `session_id` at the current local time.
pub fn new_note_content(session_id: &str) -> String {
    new_note_content_at(session_id, Local::now())
}

/// Renders the new-memo template at `now`.
pub fn new_note_content_at(session_id: &str, now: DateTime<Local>) -> String {
    let timestamp = now.format(TIMESTAMP_FORMAT);
    let body = format!(
        "# {NOTE_HEADING} - {timestamp}

## 概要
このファイルは作業セッションのメモです。

## セッション情報
- セッションID: {session_id}
- 記録日時: {timestamp}
- コマンド: {COMMAND_NAME}

## 内容
<!-- ここにメモを記入してください -->

---
*memo コマンドで作成*
"
    );
    sanitize(&body)
}

/// Renders an addendum block at the current local time.
pub fn append_note_content() -> String {
    append_note_content_at(Local::now())
}

/// Renders an addendum block at `now`.
///
/// Independent of the existing file content.
pub fn append_note_content_at(now: DateTime<Local>) -> String {
    let timestamp = now.format(TIMESTAMP_FORMAT);
    let body = format!(
        "
---

## {ADDENDUM_HEADING} - {timestamp}

<!-- ここに追記内容を記入してください -->
"
    );
    sanitize(&body)
}
