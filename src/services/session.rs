use std::sync::OnceLock;

use regex::Regex;

/// Environment variable the Claude CLI child receives for conversation continuity.
pub const SESSION_ENV_VAR: &str = "CC_SESSION_ID";

/// Cached regex pattern for session ID validation
fn session_id_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("Invalid session ID regex pattern"))
}

/// Validate session ID format (alphanumeric, dashes, underscores only)
/// Max length 64 characters
pub fn is_valid_session_id(session_id: &str) -> bool {
    !session_id.is_empty() && session_id.len() <= 64 && session_id_regex().is_match(session_id)
}

/// Conversation continuity state for one shell session.
///
/// Owned by the interceptor and lent to each backend call; never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    id: Option<String>,
}

impl Session {
    pub fn new(id: Option<String>) -> Self {
        let mut session = Self::default();
        if let Some(id) = id {
            session.update(&id);
        }
        session
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Adopt a new session id. Invalid ids are ignored and the old one kept.
    /// Returns whether the id was accepted.
    pub fn update(&mut self, id: &str) -> bool {
        if !is_valid_session_id(id) {
            return false;
        }
        self.id = Some(id.to_string());
        true
    }

    pub fn clear(&mut self) {
        self.id = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_valid() {
        assert!(is_valid_session_id("abc123"));
        assert!(is_valid_session_id("session-1"));
        assert!(is_valid_session_id("session_2"));
        assert!(is_valid_session_id("a"));
    }

    #[test]
    fn test_session_id_length_limit() {
        assert!(is_valid_session_id(&"a".repeat(64)));
        assert!(!is_valid_session_id(&"a".repeat(65)));
        assert!(!is_valid_session_id(""));
    }

    #[test]
    fn test_session_id_special_chars_rejected() {
        assert!(!is_valid_session_id("session;rm -rf"));
        assert!(!is_valid_session_id("session$(cmd)"));
        assert!(!is_valid_session_id("session\nline2"));
        assert!(!is_valid_session_id("path/traversal"));
        assert!(!is_valid_session_id("session with space"));
        assert!(!is_valid_session_id("세션아이디"));
    }

    #[test]
    fn test_session_id_regex_caching() {
        assert!(std::ptr::eq(session_id_regex(), session_id_regex()));
    }

    #[test]
    fn test_session_new_drops_invalid_seed() {
        assert_eq!(Session::new(Some("bad id".to_string())).id(), None);
        assert_eq!(Session::new(Some("good-id".to_string())).id(), Some("good-id"));
        assert_eq!(Session::new(None).id(), None);
    }

    #[test]
    fn test_session_update_keeps_old_on_invalid() {
        let mut session = Session::new(Some("s1".to_string()));
        assert!(!session.update("not valid!"));
        assert_eq!(session.id(), Some("s1"));
        assert!(session.update("s2"));
        assert_eq!(session.id(), Some("s2"));
        session.clear();
        assert_eq!(session.id(), None);
    }
}
