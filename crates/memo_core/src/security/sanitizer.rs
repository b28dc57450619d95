use once_cell::sync::Lazy;
use regex::Regex;

/// Fixed replacement for every sensitive keyword occurrence.
pub const REDACTION_MARKER: &str = "[REDACTED]";

static SENSITIVE_KEYWORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)api[ _\-]?key|password|secret|token|credential|auth")
        .expect("valid sensitive keyword regex")
});
static CONTROL_CHAR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").expect("valid control char regex")
});

/// Sanitized text together with the number of keyword substitutions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redaction {
    pub content: String,
    pub redaction_count: usize,
}

/// Strips control characters and redacts sensitive keywords.
///
/// Tab, line feed and carriage return survive; every other ASCII control
/// character (including DEL) is removed. Stripping runs first so a control
/// character cannot split a keyword past the matcher.
pub fn sanitize(text: &str) -> String {
    sanitize_with_count(text).content
}

/// Same as [`sanitize`], also reporting how many keywords were replaced.
pub fn sanitize_with_count(text: &str) -> Redaction {
    if text.is_empty() {
        return Redaction {
            content: String::new(),
            redaction_count: 0,
        };
    }

    let stripped = CONTROL_CHAR_RE.replace_all(text, "");
    let redaction_count = SENSITIVE_KEYWORD_RE.find_iter(&stripped).count();
    let content = SENSITIVE_KEYWORD_RE
        .replace_all(&stripped, REDACTION_MARKER)
        .into_owned();

    Redaction {
        content,
        redaction_count,
    }
}

#[cfg(test)]
mod tests {
    use super::{sanitize, sanitize_with_count, REDACTION_MARKER};

    #[test]
    fn redacts_every_occurrence_not_just_first() {
        let sanitized = sanitize("token one, token two, TOKEN three");
        assert_eq!(sanitized.matches(REDACTION_MARKER).count(), 3);
        assert!(!sanitized.to_lowercase().contains("token"));
    }

    #[test]
    fn api_key_spellings_are_single_matches() {
        let redaction = sanitize_with_count("api key, api_key, Api-Key, APIKEY");
        assert_eq!(redaction.redaction_count, 4);
        assert_eq!(
            redaction.content,
            "[REDACTED], [REDACTED], [REDACTED], [REDACTED]"
        );
    }

    #[test]
    fn strips_control_chars_but_keeps_line_structure() {
        let sanitized = sanitize("a\u{0}b\u{7}c\u{7f}\td\r\ne");
        assert_eq!(sanitized, "abc\td\r\ne");
    }

    #[test]
    fn plain_markdown_is_unchanged() {
        let source = "# セッション記録\n\n- item\n";
        assert_eq!(sanitize(source), source);
    }
}
