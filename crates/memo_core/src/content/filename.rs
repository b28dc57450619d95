use chrono::{DateTime, Local};
use serde::Deserialize;

/// Produces the memo file name for an invocation at `now`.
pub trait FilenameStrategy: Send + Sync {
    fn file_name(&self, now: DateTime<Local>) -> String;
}

/// One file per second: `YYYY-MM-DD_HH-MM-SS_memo.md`.
///
/// Invocations within the same second resolve to the same file and append.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampFilename;

impl FilenameStrategy for TimestampFilename {
    fn file_name(&self, now: DateTime<Local>) -> String {
        now.format("%Y-%m-%d_%H-%M-%S_memo.md").to_string()
    }
}

/// One file per day: `YYYY-MM-DD_memo.md`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DailyFilename;

impl FilenameStrategy for DailyFilename {
    fn file_name(&self, now: DateTime<Local>) -> String {
        now.format("%Y-%m-%d_memo.md").to_string()
    }
}

/// Configuration selector for the file naming strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilenameStyle {
    #[default]
    Timestamp,
    Daily,
}

/// Returns the strategy implementation for `style`.
pub fn filename_strategy_for(style: FilenameStyle) -> Box<dyn FilenameStrategy> {
    match style {
        FilenameStyle::Timestamp => Box::new(TimestampFilename),
        FilenameStyle::Daily => Box::new(DailyFilename),
    }
}

#[cfg(test)]
mod tests {
    use super::{filename_strategy_for, FilenameStyle};
    use chrono::{Local, TimeZone};

    #[test]
    fn timestamp_style_formats_to_the_second() {
        let now = Local.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        let name = filename_strategy_for(FilenameStyle::Timestamp).file_name(now);
        assert_eq!(name, "2024-01-15_10-30-00_memo.md");
    }

    #[test]
    fn daily_style_drops_time_of_day() {
        let now = Local.with_ymd_and_hms(2024, 1, 15, 23, 59, 59).unwrap();
        let name = filename_strategy_for(FilenameStyle::Daily).file_name(now);
        assert_eq!(name, "2024-01-15_memo.md");
    }
}
