use chrono::Local;
use uuid::Uuid;

const SESSION_SUFFIX_LEN: usize = 8;

/// Builds a display-only session id: `<YYYYMMDDHHMMSS>-<8 hex chars>`.
///
/// The suffix is taken from a v4 UUID, so it is backed by the OS random
/// source. Uniqueness is best-effort.
pub fn new_session_id() -> String {
    let timestamp = Local::now().format("%Y%m%d%H%M%S");
    let random = Uuid::new_v4().simple().to_string();
    format!("{timestamp}-{}", &random[..SESSION_SUFFIX_LEN])
}

#[cfg(test)]
mod tests {
    use super::new_session_id;

    #[test]
    fn session_id_is_single_token() {
        let id = new_session_id();
        let (timestamp, suffix) = id.split_once('-').expect("id should contain a dash");
        assert_eq!(timestamp.len(), 14);
        assert!(timestamp.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(!id.contains(char::is_whitespace));
    }

    #[test]
    fn consecutive_ids_differ() {
        assert_ne!(new_session_id(), new_session_id());
    }
}
