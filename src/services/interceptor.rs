/// Glue between the host shell's command-not-found hook and the agent.
///
/// Tokens that look like a mistyped shell command are handed back to the
/// shell untouched; everything else is joined into one query, streamed
/// through the backend and rendered by the formatter.

use std::io::Write;
use std::panic::{self, AssertUnwindSafe};

use super::agent::{Backend, CancelToken, ErrorKind, Response, ResponseKind};
use super::formatter::ResponseFormatter;
use super::session::Session;

define_debug_log!("interceptor");

/// First-token prefixes that are left to the shell's own error handling.
/// Matched as prefixes, so `python3` and `git-status` are skipped too.
pub const SKIP_PREFIXES: &[&str] = &["ls", "cd", "pwd", "git", "python", "pip", "claude"];

pub const LOGIN_REQUIRED_NOTICE: &str = "Claude CLI requires login. Launching login process...";
pub const LOGIN_DONE_NOTICE: &str = "Login completed. Retrying your request...";
pub const LOGIN_FAILED_NOTICE: &str = "Login did not complete. Run `claude` to log in manually.";
pub const UNEXPECTED_ERROR: &str = "Unexpected error while handling the request";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptOutcome {
    /// Shell should report "command not found" as usual
    NotHandled,
    /// Query was answered; shell should treat the command as successful
    Handled,
}

/// `true` when the tokens should be left to the shell.
pub fn should_skip(args: &[String]) -> bool {
    match args.first() {
        None => true,
        Some(first) => SKIP_PREFIXES.iter().any(|prefix| first.starts_with(prefix)),
    }
}

pub struct CommandInterceptor<'c, W: Write> {
    backend: Box<dyn Backend>,
    formatter: ResponseFormatter<W>,
    session: Session,
    cancel: Option<&'c CancelToken>,
}

impl<'c, W: Write> CommandInterceptor<'c, W> {
    pub fn new(backend: Box<dyn Backend>, formatter: ResponseFormatter<W>, session: Session) -> Self {
        Self {
            backend,
            formatter,
            session,
            cancel: None,
        }
    }

    /// Share a token that an interrupt handler can trip mid-query.
    pub fn with_cancel(mut self, cancel: &'c CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn formatter(&self) -> &ResponseFormatter<W> {
        &self.formatter
    }

    pub fn into_formatter(self) -> ResponseFormatter<W> {
        self.formatter
    }

    /// Entry point for the shell hook.
    pub fn handle(&mut self, args: &[String]) -> InterceptOutcome {
        if should_skip(args) {
            debug_log(&format!("skip: {:?}", args.first()));
            return InterceptOutcome::NotHandled;
        }
        let query = args.join(" ");
        if query.trim().is_empty() {
            return InterceptOutcome::NotHandled;
        }
        self.run_query(&query);
        InterceptOutcome::Handled
    }

    /// Stream one query to completion, recovering from a missing login once.
    pub fn run_query(&mut self, query: &str) {
        debug_log(&format!("=== run_query START ({} chars) ===", query.len()));
        self.formatter.refresh_width();
        if let Some(token) = self.cancel {
            token.set_active(true);
        }

        if self.stream_guarded(query) {
            debug_log("NotLoggedIn seen, launching login");
            self.formatter.notice(LOGIN_REQUIRED_NOTICE);
            let login_ok = self.backend.login();
            let interrupted = self.cancel.map(CancelToken::is_cancelled).unwrap_or(false);
            if login_ok && !interrupted {
                self.formatter.notice(LOGIN_DONE_NOTICE);
                self.stream_guarded(query);
            } else {
                debug_log("login failed, not retrying");
                self.formatter.notice(LOGIN_FAILED_NOTICE);
            }
        }

        if let Some(token) = self.cancel {
            token.set_active(false);
        }
        self.formatter.finish();
        debug_log("=== run_query END ===");
    }

    /// Run [`Self::stream_once`], turning a panic into an error line.
    /// The panic report goes to the debug log, not the terminal.
    /// Returns `true` if the stream reported a missing login.
    fn stream_guarded(&mut self, query: &str) -> bool {
        if let Some(token) = self.cancel {
            token.reset();
        }
        let previous_hook = panic::take_hook();
        panic::set_hook(Box::new(|info| debug_log(&format!("PANIC: {}", info))));
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.stream_once(query)));
        panic::set_hook(previous_hook);

        match outcome {
            Ok(needs_login) => needs_login,
            Err(_) => {
                debug_log("ERROR: backend panicked");
                self.formatter.format(&Response::error(UNEXPECTED_ERROR, None));
                false
            }
        }
    }

    fn stream_once(&mut self, query: &str) -> bool {
        let mut needs_login = false;
        let stream = self.backend.invoke(query, &self.session, self.cancel);
        for response in stream {
            if let ResponseKind::Init { session_id: Some(id), .. } = &response.kind {
                if !self.session.update(id) {
                    debug_log(&format!("ignoring invalid session id: {:?}", id));
                }
            }
            if response.error_type() == Some(ErrorKind::NotLoggedIn) {
                needs_login = true;
            }
            self.formatter.format(&response);
        }
        needs_login
    }
}
