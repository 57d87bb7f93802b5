/// Shared utility functions used across multiple modules.

use std::fs::OpenOptions;
use std::io::Write;
use std::sync::OnceLock;

use regex::Regex;
use unicode_width::UnicodeWidthChar;

/// Macro to generate the debug logging boilerplate for a module:
/// a `debug_log` function that writes to `~/.xonai/debug/<name>.log`.
///
/// Usage: `define_debug_log!("interceptor");`
#[macro_export]
macro_rules! define_debug_log {
    ($log_name:expr) => {
        fn debug_log(msg: &str) {
            $crate::services::utils::write_debug_log($log_name, msg);
        }
    };
}

/// Macro to generate the common boilerplate for AI service modules:
/// - A `OnceLock`-cached path resolver (`resolve_binary_path`, `get_binary_path`)
/// - A `debug_log` function (see [`define_debug_log`])
///
/// Usage: `define_ai_service_helpers!("claude");`
#[macro_export]
macro_rules! define_ai_service_helpers {
    ($binary_name:expr) => {
        static BINARY_PATH: std::sync::OnceLock<Option<String>> = std::sync::OnceLock::new();

        fn resolve_binary_path() -> Option<String> {
            // Try direct `which` first
            if let Ok(output) = std::process::Command::new("which").arg($binary_name).output() {
                if output.status.success() {
                    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                    if !path.is_empty() {
                        return Some(path);
                    }
                }
            }
            // Fallback: use login shell to resolve PATH
            if let Ok(output) = std::process::Command::new("bash")
                .args(["-lc", &format!("which {}", $binary_name)])
                .output()
            {
                if output.status.success() {
                    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                    if !path.is_empty() {
                        return Some(path);
                    }
                }
            }
            None
        }

        fn get_binary_path() -> Option<&'static str> {
            BINARY_PATH.get_or_init(resolve_binary_path).as_deref()
        }

        $crate::define_debug_log!($binary_name);
    };
}

/// Append a timestamped line to `~/.xonai/debug/<log_name>.log`.
/// No-op unless `XONAI_DEBUG=1`.
pub fn write_debug_log(log_name: &str, msg: &str) {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    let enabled = ENABLED.get_or_init(|| {
        std::env::var("XONAI_DEBUG").map(|v| v == "1").unwrap_or(false)
    });
    if !*enabled { return; }
    if let Some(home) = dirs::home_dir() {
        let debug_dir = home.join(".xonai").join("debug");
        let _ = std::fs::create_dir_all(&debug_dir);
        let log_path = debug_dir.join(format!("{}.log", log_name));
        if let Ok(mut file) = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
        {
            let timestamp = chrono::Local::now().format("%H:%M:%S%.3f");
            let _ = writeln!(file, "[{}] {}", timestamp, msg);
        }
    }
}

/// Maximum number of lines rendered for any multi-line content.
pub const MAX_DISPLAY_LINES: usize = 5;

const ELLIPSIS: &str = "...";

fn ansi_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").expect("Invalid ANSI regex pattern"))
}

/// Remove ANSI CSI escape sequences.
pub fn strip_ansi(s: &str) -> String {
    ansi_regex().replace_all(s, "").into_owned()
}

/// Printable column width of `s`, ignoring ANSI escapes.
/// Wide (CJK) glyphs count 2, zero-width glyphs count 0.
pub fn display_width(s: &str) -> usize {
    strip_ansi(s)
        .chars()
        .map(|c| UnicodeWidthChar::width(c).unwrap_or(0))
        .sum()
}

/// Current terminal column count, 80 when it cannot be determined.
pub fn terminal_width() -> usize {
    match crossterm::terminal::size() {
        Ok((cols, _)) if cols > 0 => cols as usize,
        _ => 80,
    }
}

/// Fit `text` into the terminal: at most [`MAX_DISPLAY_LINES`] lines, each cut to
/// `width - 3` printable columns plus `...`. A trailing `...` line marks dropped lines.
/// `width` defaults to the current terminal width.
pub fn truncate_to_width(text: &str, width: Option<usize>) -> String {
    let width = width.unwrap_or_else(terminal_width);
    let lines: Vec<&str> = text.split('\n').collect();

    let mut result: Vec<String> = lines
        .iter()
        .take(MAX_DISPLAY_LINES)
        .map(|line| truncate_line(line, width))
        .collect();

    if lines.len() > MAX_DISPLAY_LINES {
        result.push(ELLIPSIS.to_string());
    }

    result.join("\n")
}

fn truncate_line(line: &str, width: usize) -> String {
    let limit = width.saturating_sub(ELLIPSIS.len());
    let plain = strip_ansi(line);
    let line_width = display_width(&plain);

    if line_width <= limit {
        return line.to_string();
    }
    // Already cut on a previous pass
    if plain.ends_with(ELLIPSIS) && line_width <= width {
        return line.to_string();
    }

    let mut truncated = String::new();
    let mut current_width = 0;
    for c in plain.chars() {
        let char_width = UnicodeWidthChar::width(c).unwrap_or(0);
        if current_width + char_width > limit {
            break;
        }
        truncated.push(c);
        current_width += char_width;
    }
    truncated.push_str(ELLIPSIS);
    truncated
}

/// `1234567` -> `"1,234,567"`
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
