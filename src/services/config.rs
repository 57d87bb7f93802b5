/// Environment-derived settings. Nothing is read from or written to disk.

use std::env;
use std::time::Duration;

use super::agent::Backend;
use super::claude::ClaudeBackend;
use super::dummy::{self, DummyBackend};
use super::session::SESSION_ENV_VAR;

pub const DUMMY_ENV_VAR: &str = "XONAI_DUMMY";
pub const SESSION_ID_ENV_VAR: &str = "XONAI_SESSION_ID";
pub const DUMMY_DELAY_ENV_VAR: &str = "XONAI_DUMMY_DELAY_MS";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Answer from the in-process dummy instead of the Claude CLI
    pub use_dummy: bool,
    /// Inherited session id, not yet validated
    pub session_id: Option<String>,
    pub dummy_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            use_dummy: false,
            session_id: None,
            dummy_delay: dummy::DEFAULT_DELAY,
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup (used by tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let use_dummy = lookup(DUMMY_ENV_VAR).map(|v| is_truthy(&v)).unwrap_or(false);

        let session_id = lookup(SESSION_ID_ENV_VAR)
            .or_else(|| lookup(SESSION_ENV_VAR))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let dummy_delay = lookup(DUMMY_DELAY_ENV_VAR)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(dummy::DEFAULT_DELAY);

        Self {
            use_dummy,
            session_id,
            dummy_delay,
        }
    }

    pub fn make_backend(&self) -> Box<dyn Backend> {
        if self.use_dummy {
            Box::new(DummyBackend::new(self.dummy_delay))
        } else {
            Box::new(ClaudeBackend::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        assert_eq!(config(&[]), Config::default());
    }

    #[test]
    fn test_dummy_flag_values() {
        assert!(config(&[("XONAI_DUMMY", "1")]).use_dummy);
        assert!(config(&[("XONAI_DUMMY", "TRUE")]).use_dummy);
        assert!(!config(&[("XONAI_DUMMY", "0")]).use_dummy);
        assert!(!config(&[("XONAI_DUMMY", "")]).use_dummy);
    }

    #[test]
    fn test_session_id_precedence() {
        let c = config(&[("XONAI_SESSION_ID", "primary"), ("CC_SESSION_ID", "fallback")]);
        assert_eq!(c.session_id.as_deref(), Some("primary"));

        let c = config(&[("CC_SESSION_ID", "fallback")]);
        assert_eq!(c.session_id.as_deref(), Some("fallback"));

        let c = config(&[("XONAI_SESSION_ID", "  ")]);
        assert_eq!(c.session_id, None);
    }

    #[test]
    fn test_dummy_delay() {
        assert_eq!(config(&[("XONAI_DUMMY_DELAY_MS", "0")]).dummy_delay, Duration::ZERO);
        assert_eq!(
            config(&[("XONAI_DUMMY_DELAY_MS", "abc")]).dummy_delay,
            dummy::DEFAULT_DELAY
        );
    }

    #[test]
    fn test_make_backend_dummy() {
        let backend = config(&[("XONAI_DUMMY", "1")]).make_backend();
        assert_eq!(backend.name(), dummy::AGENT_LABEL);
        assert!(backend.is_available());
    }
}
