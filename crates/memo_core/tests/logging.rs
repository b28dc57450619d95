use memo_core::{flush_logging, init_logging, MemoCommand, RecorderConfig};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn log_text(log_dir: &Path) -> String {
    let mut text = String::new();
    for entry in fs::read_dir(log_dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_file() {
            text.push_str(&fs::read_to_string(path).unwrap());
        }
    }
    text
}

#[test]
fn command_events_reach_the_log_file_after_flush() {
    // The logger outlives this test, so its directory is never cleaned up.
    let log_dir = std::env::temp_dir().join(format!(
        "memo-logging-it-{}-{}",
        std::process::id(),
        uuid::Uuid::new_v4().simple()
    ));
    init_logging("info", &log_dir).unwrap();

    let project = tempdir().unwrap();
    let outcome = MemoCommand::new(RecorderConfig::default())
        .unwrap()
        .run_in(project.path());
    assert!(outcome.is_success());

    flush_logging();

    let text = log_text(&log_dir);
    assert!(text.contains("event=app_start"), "log: {text}");
    assert!(text.contains("event=memo_write module=command status=ok"));
    assert!(!text.contains("セッション記録"), "memo content must not be logged");
}
