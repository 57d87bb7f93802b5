use std::process::{Command, Stdio};

use super::agent::{Backend, CancelToken, ErrorKind, Response, ResponseStream};
use super::provider_common::{self, StreamingConfig};
use super::session::{Session, SESSION_ENV_VAR};
use super::stream_parser::StreamParser;

// Generate resolve_binary_path(), get_binary_path(), debug_log() for "claude"
define_ai_service_helpers!("claude");

pub const AGENT_LABEL: &str = "Claude Code";

pub const INSTALL_GUIDE_URL: &str = "https://docs.anthropic.com/en/docs/claude-code/getting-started";

/// Arguments requesting streaming structured output; the query follows them.
pub const STREAM_ARGS: &[&str] = &["--print", "--verbose", "--output-format", "stream-json"];

/// Backend driving the external Claude CLI.
pub struct ClaudeBackend {
    binary_path: Option<String>,
    parser: StreamParser,
}

impl ClaudeBackend {
    /// Resolve `claude` on PATH (cached for the process lifetime).
    pub fn new() -> Self {
        Self::with_binary(get_binary_path().map(String::from))
    }

    /// Use an explicit executable; `None` means the CLI is unavailable.
    pub fn with_binary(binary_path: Option<String>) -> Self {
        Self {
            binary_path,
            parser: StreamParser::new(AGENT_LABEL),
        }
    }
}

impl Default for ClaudeBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Full argument list for one query.
pub fn build_args(query: &str) -> Vec<String> {
    let mut args: Vec<String> = STREAM_ARGS.iter().map(|s| s.to_string()).collect();
    args.push(query.to_string());
    args
}

/// The error yielded when the CLI cannot be found.
pub fn cli_not_found() -> Response {
    Response::error(
        format!("Claude CLI not found. Install it from {}", INSTALL_GUIDE_URL),
        Some(ErrorKind::CliNotFound),
    )
}

impl Backend for ClaudeBackend {
    fn name(&self) -> &str {
        AGENT_LABEL
    }

    fn is_available(&self) -> bool {
        self.binary_path.is_some()
    }

    fn invoke<'a>(
        &'a mut self,
        query: &str,
        session: &Session,
        cancel: Option<&'a CancelToken>,
    ) -> ResponseStream<'a> {
        debug_log(&format!("query_len: {} chars", query.len()));
        debug_log(&format!("session_id: {:?}", session.id()));

        let Some(binary_path) = self.binary_path.as_deref() else {
            debug_log("ERROR: Claude CLI not found");
            return Box::new(std::iter::once(cli_not_found()));
        };

        self.parser.reset();
        let args = build_args(query);
        let session_env: Vec<(&str, &str)> = session
            .id()
            .map(|id| vec![(SESSION_ENV_VAR, id)])
            .unwrap_or_default();

        let config = StreamingConfig {
            provider_name: "claude",
            binary_path,
            args: &args,
            env_vars: &session_env,
            env_remove: &["CLAUDECODE"], // Allow running from within Claude Code sessions
        };

        match provider_common::spawn_stream(&config, &mut self.parser, cancel) {
            Ok(stream) => Box::new(stream),
            Err(e) => Box::new(std::iter::once(Response::from(e))),
        }
    }

    /// Run `claude /exit` on the user's terminal so the CLI can walk through login.
    fn login(&mut self) -> bool {
        let Some(binary_path) = self.binary_path.as_deref() else {
            return false;
        };
        debug_log("Launching login process");
        let status = Command::new(binary_path)
            .arg("/exit")
            .env_remove("CLAUDECODE")
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status();
        match status {
            Ok(status) => {
                debug_log(&format!("Login process finished, exit_code: {:?}", status.code()));
                status.success()
            }
            Err(e) => {
                debug_log(&format!("ERROR: Failed to launch login: {}", e));
                false
            }
        }
    }
}
