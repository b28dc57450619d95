//! `memo` command entry point.
//!
//! # Responsibility
//! - Record one memo under the current working directory.
//! - Map the structured outcome to status lines and the process exit code.
//!
//! # Environment
//! - `MEMO_CONFIG`: optional path to a JSON `RecorderConfig`.
//! - `MEMO_LOG_DIR`: absolute directory enabling rolling file logs.
//! - `MEMO_LOG_LEVEL`: `trace|debug|info|warn|error`, default by build mode.

use memo_core::{
    default_log_level, flush_logging, init_logging, MemoAction, MemoCommand, MemoOutcome,
    RecorderConfig,
};
use std::process::ExitCode;

fn main() -> ExitCode {
    let code = run();
    flush_logging();
    code
}

fn run() -> ExitCode {
    if let Some(log_dir) = std::env::var_os("MEMO_LOG_DIR") {
        let level =
            std::env::var("MEMO_LOG_LEVEL").unwrap_or_else(|_| default_log_level().to_string());
        // Logging is optional; a broken log setup must not block recording.
        if let Err(err) = init_logging(&level, &log_dir) {
            eprintln!("memo: logging disabled: {err}");
        }
    }

    let config = match std::env::var_os("MEMO_CONFIG") {
        Some(path) => match RecorderConfig::from_json_file(&path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("❌ メモの作成に失敗しました: {err}");
                return ExitCode::FAILURE;
            }
        },
        None => RecorderConfig::default(),
    };

    let command = match MemoCommand::new(config) {
        Ok(command) => command,
        Err(err) => {
            eprintln!("❌ メモの作成に失敗しました: {err}");
            return ExitCode::FAILURE;
        }
    };

    let outcome = command.run();
    report(&outcome);
    ExitCode::from(outcome.exit_code())
}

fn report(outcome: &MemoOutcome) {
    match outcome {
        MemoOutcome::Written {
            action,
            path,
            elapsed,
            ..
        } => {
            let verb = match action {
                MemoAction::Created => "✅ メモを作成しました",
                MemoAction::Appended => "📝 既存のメモに追記しました",
            };
            println!("{verb}: {}", path.display());
            println!("⏱️  処理時間: {}ms", elapsed.as_millis());
        }
        MemoOutcome::Failed {
            error_code,
            message,
            ..
        } => {
            eprintln!("❌ メモの作成に失敗しました [{error_code}]: {message}");
        }
    }
}
