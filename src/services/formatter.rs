/// Terminal rendering of agent responses.
///
/// Streamed message text is written as-is with no trailing newline; every
/// other response is a whole line, so the formatter tracks whether the cursor
/// is at the start of a line and inserts a newline when it is not.

use std::io::{self, Write};

use super::agent::{ErrorKind, Response, ResponseKind};
use super::utils::{group_thousands, terminal_width, truncate_to_width};

define_debug_log!("formatter");

/// Bash commands are cut to this many columns in tool-use lines.
pub const COMMAND_DISPLAY_WIDTH: usize = 60;

const NETWORK_RETRY_HINT: &str = "   Network problem: check your connection and run the query again.";

pub struct ResponseFormatter<W: Write> {
    out: W,
    last_tool: Option<String>,
    last_was_newline: bool,
    total_tokens: u64,
    total_cost: f64,
    width: Option<usize>,
}

impl ResponseFormatter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ResponseFormatter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            last_tool: None,
            last_was_newline: true,
            total_tokens: 0,
            total_cost: 0.0,
            width: None,
        }
    }

    /// Fix the render width instead of asking the terminal.
    pub fn with_width(mut self, width: usize) -> Self {
        self.width = Some(width);
        self
    }

    /// Forget the cached terminal width; it is measured again on next use.
    pub fn refresh_width(&mut self) {
        self.width = None;
    }

    fn width(&mut self) -> usize {
        *self.width.get_or_insert_with(terminal_width)
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    pub fn total_cost(&self) -> f64 {
        self.total_cost
    }

    pub fn last_tool(&self) -> Option<&str> {
        self.last_tool.as_deref()
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Render one response to the output.
    pub fn format(&mut self, response: &Response) {
        if let Err(e) = self.render(response) {
            debug_log(&format!("ERROR: write failed: {}", e));
        }
    }

    /// Print a status line of our own between responses.
    pub fn notice(&mut self, line: &str) {
        let result = self
            .ensure_newline()
            .and_then(|_| self.write_line(line))
            .and_then(|_| self.out.flush());
        if let Err(e) = result {
            debug_log(&format!("ERROR: write failed: {}", e));
        }
    }

    /// Leave the cursor at the start of a line so the shell prompt is clean.
    pub fn finish(&mut self) {
        let result = self.ensure_newline().and_then(|_| self.out.flush());
        if let Err(e) = result {
            debug_log(&format!("ERROR: write failed: {}", e));
        }
    }

    fn render(&mut self, response: &Response) -> io::Result<()> {
        match &response.kind {
            ResponseKind::Init { session_id, model } => {
                let line = format_init(&response.content, session_id.as_deref(), model.as_deref());
                self.ensure_newline()?;
                self.write_line(&line)?;
            }
            ResponseKind::Message => {
                if response.content.is_empty() {
                    return Ok(());
                }
                self.out.write_all(response.content.as_bytes())?;
                self.last_was_newline = response.content.ends_with('\n');
            }
            ResponseKind::ToolUse { tool } => {
                self.last_tool = Some(tool.clone());
                let line = format_tool_use(tool, &response.content);
                let width = self.width();
                self.ensure_newline()?;
                self.write_line(&truncate_to_width(&line, Some(width)))?;
            }
            ResponseKind::ToolResult { tool } => {
                let tool = if tool.is_empty() { self.last_tool.as_deref().unwrap_or("") } else { tool.as_str() };
                let Some(line) = format_tool_result(tool, &response.content) else {
                    return Ok(());
                };
                let width = self.width();
                self.ensure_newline()?;
                self.write_line(&truncate_to_width(&line, Some(width)))?;
            }
            ResponseKind::Error { error_type } => {
                let width = self.width();
                let message = truncate_to_width(&format!("❌ {}", response.content), Some(width));
                self.ensure_newline()?;
                self.write_line("")?;
                self.write_line(&message)?;
                if *error_type == Some(ErrorKind::NetworkError) {
                    self.write_line(NETWORK_RETRY_HINT)?;
                }
            }
            ResponseKind::Result { token, cost_usd } => {
                self.total_tokens += token;
                self.total_cost += cost_usd;
                let line = format_result(&response.content, self.total_tokens);
                self.ensure_newline()?;
                self.write_line("")?;
                self.write_line(&line)?;
            }
        }
        self.out.flush()
    }

    fn ensure_newline(&mut self) -> io::Result<()> {
        if !self.last_was_newline {
            writeln!(self.out)?;
            self.last_was_newline = true;
        }
        Ok(())
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.out, "{}", line)?;
        self.last_was_newline = true;
        Ok(())
    }
}

pub fn format_init(label: &str, session_id: Option<&str>, model: Option<&str>) -> String {
    let label = if label.is_empty() { "Claude Code" } else { label };
    let model = model.unwrap_or("unknown");
    match session_id {
        Some(id) if !id.is_empty() => format!("🚀 {}: model={}, id={}", label, model, id),
        _ => format!("🚀 {}: model={}", label, model),
    }
}

/// Tool-use line with the tool's emoji.
pub fn format_tool_use(tool: &str, content: &str) -> String {
    match tool {
        "LS" => format!("📁 ls {}", content),
        "Read" | "NotebookRead" => format!("📖 Reading {}", content),
        "Edit" | "Write" | "MultiEdit" | "NotebookEdit" => format!("✏️ Editing {}", content),
        "Bash" => format!("🔧 {}", command_preview(content)),
        "WebSearch" => format!("🔍 Searching: {}", content),
        "WebFetch" => format!("🌐 Fetching: {}", content),
        "TodoRead" => "📋 Reading todos".to_string(),
        "TodoWrite" => "📝 Updating todos".to_string(),
        "Task" => format!("🤖 Task: {}", content),
        "Glob" | "Grep" => match content.split_once(" in ") {
            Some((pattern, _)) => format!("🔍 Searching for: {}", pattern),
            None => format!("🔍 Searching: {}", content),
        },
        _ => format!("🔧 {}: {}", tool, content),
    }
}

/// First line of a command, cut to [`COMMAND_DISPLAY_WIDTH`].
fn command_preview(command: &str) -> String {
    let mut lines = command.lines();
    let first = lines.next().unwrap_or("");
    let line = if lines.next().is_some() { format!("{} ...", first) } else { first.to_string() };
    truncate_to_width(&line, Some(COMMAND_DISPLAY_WIDTH))
}

/// One-line summary of a tool's output. Empty output is not shown.
pub fn format_tool_result(tool: &str, content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lines: Vec<&str> = trimmed.lines().collect();

    let summary = match tool {
        "Read" | "NotebookRead" => format!("Read {} lines", content.matches('\n').count() + 1),
        "LS" => format!("Found {} items", lines.len()),
        "Edit" | "MultiEdit" | "NotebookEdit" => "File updated".to_string(),
        "Write" => "File written".to_string(),
        "Bash" => {
            if lines.len() == 1 && lines[0].chars().count() < 60 {
                lines[0].to_string()
            } else if lines.len() > 1 {
                format!("Output: {} lines", lines.len())
            } else {
                "Command completed".to_string()
            }
        }
        "Glob" | "Grep" => format!("Found {} matches", lines.len()),
        "TodoRead" => match serde_json::from_str::<Vec<serde_json::Value>>(trimmed) {
            Ok(todos) => format!("{} todos", todos.len()),
            Err(_) => "Todos listed".to_string(),
        },
        "TodoWrite" => "Todos updated".to_string(),
        _ => {
            if lines.len() == 1 && lines[0].chars().count() < 80 {
                lines[0].to_string()
            } else {
                "Completed".to_string()
            }
        }
    };
    Some(format!("  → {}", summary))
}

pub fn format_result(stats: &str, session_tokens: u64) -> String {
    let tokens = group_thousands(session_tokens);
    if stats.is_empty() {
        format!("📊 next_session_tokens={}", tokens)
    } else {
        format!("📊 {}, next_session_tokens={}", stats, tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::agent::ContentType;

    fn formatter() -> ResponseFormatter<Vec<u8>> {
        ResponseFormatter::new(Vec::new()).with_width(80)
    }

    fn render(responses: &[Response]) -> String {
        let mut f = formatter();
        for r in responses {
            f.format(r);
        }
        String::from_utf8(f.into_inner()).expect("utf8 output")
    }

    // --- init ---

    #[test]
    fn test_init_line() {
        let out = render(&[Response::init("Claude Code", Some("s1".into()), Some("m1".into()))]);
        assert_eq!(out, "🚀 Claude Code: model=m1, id=s1\n");
    }

    #[test]
    fn test_init_without_session() {
        let out = render(&[Response::init("Claude Code", None, None)]);
        assert_eq!(out, "🚀 Claude Code: model=unknown\n");
    }

    #[test]
    fn test_init_after_partial_line_forces_newline() {
        let out = render(&[
            Response::message("partial"),
            Response::init("Claude Code", None, Some("m".into())),
        ]);
        assert_eq!(out, "partial\n🚀 Claude Code: model=m\n");
    }

    // --- messages ---

    #[test]
    fn test_messages_stream_without_newline() {
        let out = render(&[Response::message("Hello"), Response::message(" world")]);
        assert_eq!(out, "Hello world");
    }

    #[test]
    fn test_message_ending_newline_tracked() {
        let mut f = formatter();
        f.format(&Response::message("line\n"));
        f.format(&Response::tool_use("Bash", "ls"));
        let out = String::from_utf8(f.into_inner()).expect("utf8");
        assert_eq!(out, "line\n🔧 ls\n");
    }

    // --- tool use ---

    #[test]
    fn test_tool_use_emoji_table() {
        assert_eq!(format_tool_use("Bash", "ls -la"), "🔧 ls -la");
        assert_eq!(format_tool_use("Read", "/a.rs"), "📖 Reading /a.rs");
        assert_eq!(format_tool_use("NotebookRead", "/n.ipynb"), "📖 Reading /n.ipynb");
        assert_eq!(format_tool_use("MultiEdit", "/a.rs"), "✏️ Editing /a.rs");
        assert_eq!(format_tool_use("WebSearch", "rust"), "🔍 Searching: rust");
        assert_eq!(format_tool_use("WebFetch", "https://x"), "🌐 Fetching: https://x");
        assert_eq!(format_tool_use("TodoRead", "TodoRead"), "📋 Reading todos");
        assert_eq!(format_tool_use("TodoWrite", "TodoWrite"), "📝 Updating todos");
        assert_eq!(format_tool_use("Task", "audit"), "🤖 Task: audit");
        assert_eq!(format_tool_use("LS", "/tmp"), "📁 ls /tmp");
        assert_eq!(format_tool_use("Grep", "fn main in src"), "🔍 Searching for: fn main");
        assert_eq!(format_tool_use("Glob", "*.rs"), "🔍 Searching: *.rs");
        assert_eq!(format_tool_use("Mystery", "Mystery"), "🔧 Mystery: Mystery");
    }

    #[test]
    fn test_bash_command_truncated() {
        let long = "x".repeat(100);
        let line = format_tool_use("Bash", &long);
        assert_eq!(line, format!("🔧 {}...", "x".repeat(57)));
    }

    #[test]
    fn test_bash_multiline_command_shows_first_line() {
        assert_eq!(format_tool_use("Bash", "cd /tmp\nls"), "🔧 cd /tmp ...");
    }

    #[test]
    fn test_tool_use_remembers_last_tool() {
        let mut f = formatter();
        f.format(&Response::tool_use("Grep", "x"));
        assert_eq!(f.last_tool(), Some("Grep"));
    }

    // --- tool results ---

    #[test]
    fn test_tool_result_summaries() {
        assert_eq!(format_tool_result("Read", "a\nb\nc").as_deref(), Some("  → Read 3 lines"));
        assert_eq!(format_tool_result("LS", "a\nb\n").as_deref(), Some("  → Found 2 items"));
        assert_eq!(format_tool_result("Edit", "ok").as_deref(), Some("  → File updated"));
        assert_eq!(format_tool_result("MultiEdit", "ok").as_deref(), Some("  → File updated"));
        assert_eq!(format_tool_result("Write", "ok").as_deref(), Some("  → File written"));
        assert_eq!(format_tool_result("Bash", "hello").as_deref(), Some("  → hello"));
        assert_eq!(format_tool_result("Bash", "a\nb").as_deref(), Some("  → Output: 2 lines"));
        assert_eq!(format_tool_result("Bash", &"y".repeat(70)).as_deref(), Some("  → Command completed"));
        assert_eq!(format_tool_result("Grep", "a\nb\nc").as_deref(), Some("  → Found 3 matches"));
        assert_eq!(format_tool_result("TodoRead", "[1,2]").as_deref(), Some("  → 2 todos"));
        assert_eq!(format_tool_result("TodoRead", "nope").as_deref(), Some("  → Todos listed"));
        assert_eq!(format_tool_result("TodoWrite", "ok").as_deref(), Some("  → Todos updated"));
        assert_eq!(format_tool_result("Other", "short").as_deref(), Some("  → short"));
        assert_eq!(format_tool_result("Other", "a\nb").as_deref(), Some("  → Completed"));
    }

    #[test]
    fn test_empty_tool_result_suppressed() {
        assert_eq!(format_tool_result("Bash", ""), None);
        assert_eq!(format_tool_result("Bash", "  \n "), None);
        let out = render(&[Response::tool_result("Bash", "", ContentType::Text)]);
        assert_eq!(out, "");
    }

    #[test]
    fn test_tool_result_falls_back_to_last_tool() {
        let out = render(&[
            Response::tool_use("Read", "/a"),
            Response::tool_result("", "1\n2", ContentType::Text),
        ]);
        assert_eq!(out, "📖 Reading /a\n  → Read 2 lines\n");
    }

    #[test]
    fn test_tool_line_fits_width() {
        let mut f = ResponseFormatter::new(Vec::new()).with_width(20);
        f.format(&Response::tool_use("WebFetch", "https://example.com/a/very/long/path"));
        let out = String::from_utf8(f.into_inner()).expect("utf8");
        let line = out.trim_end_matches('\n');
        assert!(line.ends_with("..."));
        assert!(crate::services::utils::display_width(line) <= 20);
    }

    // --- errors ---

    #[test]
    fn test_error_rendered_with_blank_line() {
        let out = render(&[Response::message("text"), Response::error("boom", None)]);
        assert_eq!(out, "text\n\n❌ boom\n");
    }

    #[test]
    fn test_network_error_hint() {
        let out = render(&[Response::error("Connection refused", Some(ErrorKind::NetworkError))]);
        assert_eq!(out, format!("\n❌ Connection refused\n{}\n", NETWORK_RETRY_HINT));
    }

    #[test]
    fn test_long_error_limited_to_five_lines() {
        let msg = (1..=10).map(|i| i.to_string()).collect::<Vec<_>>().join("\n");
        let out = render(&[Response::error(msg, None)]);
        assert_eq!(out, "\n❌ 1\n2\n3\n4\n5\n...\n");
    }

    // --- result ---

    #[test]
    fn test_result_line_and_totals() {
        let mut f = formatter();
        f.format(&Response::message("done"));
        f.format(&Response::result("duration_ms=1, cost_usd=0.05", 1650, 0.05));
        assert_eq!(f.total_tokens(), 1650);
        assert!((f.total_cost() - 0.05).abs() < 1e-12);
        let out = String::from_utf8(f.into_inner()).expect("utf8");
        assert_eq!(out, "done\n\n📊 duration_ms=1, cost_usd=0.05, next_session_tokens=1,650\n");
    }

    #[test]
    fn test_totals_accumulate_across_queries() {
        let mut f = formatter();
        f.format(&Response::result("a", 600, 0.01));
        f.format(&Response::result("b", 500, 0.02));
        assert_eq!(f.total_tokens(), 1100);
        assert!((f.total_cost() - 0.03).abs() < 1e-12);
        let out = String::from_utf8(f.into_inner()).expect("utf8");
        assert!(out.ends_with("📊 b, next_session_tokens=1,100\n"));
    }

    #[test]
    fn test_result_without_stats() {
        assert_eq!(format_result("", 12), "📊 next_session_tokens=12");
    }

    #[test]
    fn test_finish_terminates_partial_line() {
        let mut f = formatter();
        f.format(&Response::message("no newline"));
        f.finish();
        f.finish();
        let out = String::from_utf8(f.into_inner()).expect("utf8");
        assert_eq!(out, "no newline\n");
    }
}
