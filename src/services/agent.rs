/// Shared types for all agent backends (Claude, Dummy).

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use super::session::Session;

/// How the `content` of a [`Response`] should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Text,
    Markdown,
    Json,
}

/// Actionable error categories. An untyped error is `None` at the use site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// CLI reachable but unauthenticated
    NotLoggedIn,
    /// CLI executable not resolvable on PATH
    CliNotFound,
    /// Connectivity failure
    NetworkError,
}

/// Variant-specific part of a [`Response`].
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseKind {
    /// Backend session started
    Init { session_id: Option<String>, model: Option<String> },
    /// Streamed assistant text chunk
    Message,
    /// Tool invocation; `content` is the summarized input
    ToolUse { tool: String },
    /// Tool output, correlated with the most recent tool use
    ToolResult { tool: String },
    /// Failure signal
    Error { error_type: Option<ErrorKind> },
    /// Final per-turn stats
    Result { token: u64, cost_usd: f64 },
}

/// One classified unit of agent output.
/// All agent backends convert their native stream events into this type.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub content: String,
    pub content_type: ContentType,
    pub kind: ResponseKind,
}

impl Response {
    pub fn init(label: &str, session_id: Option<String>, model: Option<String>) -> Self {
        Self {
            content: label.to_string(),
            content_type: ContentType::Text,
            kind: ResponseKind::Init { session_id, model },
        }
    }

    pub fn message(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            content_type: ContentType::Markdown,
            kind: ResponseKind::Message,
        }
    }

    pub fn tool_use(tool: &str, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            content_type: ContentType::Text,
            kind: ResponseKind::ToolUse { tool: tool.to_string() },
        }
    }

    pub fn tool_result(tool: &str, content: impl Into<String>, content_type: ContentType) -> Self {
        Self {
            content: content.into(),
            content_type,
            kind: ResponseKind::ToolResult { tool: tool.to_string() },
        }
    }

    pub fn error(content: impl Into<String>, error_type: Option<ErrorKind>) -> Self {
        Self {
            content: content.into(),
            content_type: ContentType::Text,
            kind: ResponseKind::Error { error_type },
        }
    }

    pub fn result(content: impl Into<String>, token: u64, cost_usd: f64) -> Self {
        Self {
            content: content.into(),
            content_type: ContentType::Text,
            kind: ResponseKind::Result { token, cost_usd },
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.kind, ResponseKind::Error { .. })
    }

    pub fn error_type(&self) -> Option<ErrorKind> {
        match self.kind {
            ResponseKind::Error { error_type } => error_type,
            _ => None,
        }
    }
}

/// Lazy, finite, non-restartable sequence of responses for one query.
pub type ResponseStream<'a> = Box<dyn Iterator<Item = Response> + 'a>;

/// Every agent backend turns a query into a [`ResponseStream`].
pub trait Backend {
    /// Label shown in the init line
    fn name(&self) -> &str;

    fn is_available(&self) -> bool;

    /// Start one query. The stream owns whatever it spawned and must not leave
    /// a child process running once it is exhausted or dropped.
    fn invoke<'a>(
        &'a mut self,
        query: &str,
        session: &Session,
        cancel: Option<&'a CancelToken>,
    ) -> ResponseStream<'a>;

    /// Interactive re-authentication. Returns `true` if the query is worth retrying.
    fn login(&mut self) -> bool {
        false
    }
}

/// Token for cooperative cancellation of streaming requests.
/// Holds a flag and the child process PID so a signal handler can reach it.
/// All fields are plain atomics so the token can live in a `static`.
pub struct CancelToken {
    pub cancelled: AtomicBool,
    /// 0 when no child is running; also the child's process group id
    pub child_pid: AtomicU32,
    /// Set while a query is running
    pub active: AtomicBool,
}

impl CancelToken {
    pub const fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            child_pid: AtomicU32::new(0),
            active: AtomicBool::new(false),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Mark whether a query is in flight. An interrupt outside a query is
    /// not ours to handle.
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Clear the flag before a new query starts.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
        self.child_pid.store(0, Ordering::SeqCst);
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
