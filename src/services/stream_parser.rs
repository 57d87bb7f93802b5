/// Decoding of Claude CLI `--output-format stream-json` lines.
///
/// Every line is decoded into a [`StreamEvent`] at the boundary; classification
/// into [`Response`] values only ever looks at the typed event. Lines that are
/// not JSON, or that do not fit the shape of their `type`, are dropped.

use serde::Deserialize;
use serde_json::{Number, Value};

use super::agent::{ContentType, ErrorKind, Response};

/// One line of the stream-json protocol, discriminated by its `type` field.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    System {
        subtype: Option<String>,
        session_id: Option<String>,
        model: Option<String>,
    },
    ContentBlockDelta {
        delta: Option<Delta>,
    },
    Assistant {
        message: Option<MessageBody>,
    },
    User {
        message: Option<MessageBody>,
    },
    Error {
        /// An object with `message`, a bare string, or something else entirely
        error: Option<Value>,
        message: Option<String>,
    },
    Result {
        usage: Option<Usage>,
        duration_ms: Option<Number>,
        cost_usd: Option<Number>,
        total_cost_usd: Option<Number>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub struct Delta {
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MessageBody {
    #[serde(default)]
    pub content: Vec<ContentItem>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        #[serde(default = "unknown_tool")]
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        #[serde(default)]
        content: Value,
    },
    #[serde(other)]
    Other,
}

fn unknown_tool() -> String {
    "unknown".to_string()
}

#[derive(Debug, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    pub cache_creation_input_tokens: Option<u64>,
    pub cache_read_input_tokens: Option<u64>,
}

impl Usage {
    pub fn total(&self) -> u64 {
        self.input_tokens
            + self.output_tokens
            + self.cache_creation_input_tokens.unwrap_or(0)
            + self.cache_read_input_tokens.unwrap_or(0)
    }
}

/// Decode one raw line. Blank, non-JSON and mis-shaped lines yield `None`.
pub fn decode_line(line: &str) -> Option<StreamEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    serde_json::from_str(line).ok()
}

/// Map error text to an [`ErrorKind`] by case-insensitive substring match.
pub fn classify_error_text(text: &str) -> Option<ErrorKind> {
    let lower = text.to_lowercase();
    if lower.contains("not logged in") || lower.contains("invalid api key") {
        Some(ErrorKind::NotLoggedIn)
    } else if lower.contains("network") || lower.contains("connection") {
        Some(ErrorKind::NetworkError)
    } else {
        None
    }
}

/// Stateful classifier: remembers the last tool used so that tool results,
/// which carry no usable id, can be attributed to it.
#[derive(Debug)]
pub struct StreamParser {
    label: String,
    last_tool: Option<String>,
}

impl StreamParser {
    /// `label` is the agent name placed in the init response.
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            last_tool: None,
        }
    }

    pub fn last_tool(&self) -> Option<&str> {
        self.last_tool.as_deref()
    }

    /// Forget the previous query's tool before a new query starts.
    pub fn reset(&mut self) {
        self.last_tool = None;
    }

    /// Decode and classify a raw line.
    pub fn parse_line(&mut self, line: &str) -> Option<Response> {
        decode_line(line).and_then(|event| self.classify(event))
    }

    /// Turn one event into at most one response.
    pub fn classify(&mut self, event: StreamEvent) -> Option<Response> {
        match event {
            StreamEvent::System { subtype, session_id, model } => {
                if subtype.as_deref() != Some("init") {
                    return None;
                }
                let session_id = session_id.filter(|s| !s.is_empty());
                let model = Some(model.filter(|m| !m.is_empty()).unwrap_or_else(|| "unknown".to_string()));
                Some(Response::init(&self.label, session_id, model))
            }
            StreamEvent::ContentBlockDelta { delta } => {
                let text = delta?.text?;
                if text.is_empty() {
                    return None;
                }
                Some(Response::message(text))
            }
            StreamEvent::Assistant { message } => {
                // Only the first classifiable item of a message is reported
                for item in message?.content {
                    match item {
                        ContentItem::Text { text } => {
                            let text = text.trim();
                            if text.is_empty() {
                                continue;
                            }
                            if text.contains("Invalid API key") {
                                return Some(Response::error(text, Some(ErrorKind::NotLoggedIn)));
                            }
                            return Some(Response::message(format!("\n{}", text)));
                        }
                        ContentItem::ToolUse { name, input } => {
                            let content = summarize_tool_input(&name, &input);
                            let response = Response::tool_use(&name, content);
                            self.last_tool = Some(name);
                            return Some(response);
                        }
                        _ => {}
                    }
                }
                None
            }
            StreamEvent::User { message } => {
                for item in message?.content {
                    if let ContentItem::ToolResult { content } = item {
                        let (text, content_type) = tool_result_text(content);
                        let tool = self.last_tool.as_deref().unwrap_or("");
                        return Some(Response::tool_result(tool, text, content_type));
                    }
                }
                None
            }
            StreamEvent::Error { error, message } => {
                let detail = error.as_ref().and_then(|e| match e {
                    Value::String(s) => Some(s.clone()),
                    other => other.get("message").and_then(Value::as_str).map(String::from),
                });
                let text = detail
                    .or(message)
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| "Unknown error".to_string());
                let error_type = classify_error_text(&text);
                Some(Response::error(text, error_type))
            }
            StreamEvent::Result { usage, duration_ms, cost_usd, total_cost_usd } => {
                let usage = usage.unwrap_or_default();
                let cost = cost_usd.or(total_cost_usd);
                let cost_value = cost.as_ref().and_then(Number::as_f64).unwrap_or(0.0);

                let mut summary = format!(
                    "duration_ms={}, cost_usd={}, input_tokens={}, output_tokens={}",
                    duration_ms.map(|d| d.to_string()).unwrap_or_else(|| "0".to_string()),
                    cost.map(|c| c.to_string()).unwrap_or_else(|| "0".to_string()),
                    usage.input_tokens,
                    usage.output_tokens,
                );
                if let Some(n) = usage.cache_creation_input_tokens {
                    summary.push_str(&format!(", cache_creation_input_tokens={}", n));
                }
                if let Some(n) = usage.cache_read_input_tokens {
                    summary.push_str(&format!(", cache_read_input_tokens={}", n));
                }

                Some(Response::result(summary, usage.total(), cost_value))
            }
            StreamEvent::Unknown => None,
        }
    }
}

/// Tool-specific short description of a tool's input parameters.
pub fn summarize_tool_input(tool: &str, input: &Value) -> String {
    let field = |key: &str| input.get(key).and_then(Value::as_str).unwrap_or("");
    let path_field = || {
        let file_path = field("file_path");
        if file_path.is_empty() { field("notebook_path") } else { file_path }
    };

    match tool {
        "Bash" => field("command").to_string(),
        "Read" | "NotebookRead" | "Edit" | "Write" | "MultiEdit" | "NotebookEdit" => {
            path_field().to_string()
        }
        "WebSearch" => field("query").to_string(),
        "WebFetch" => field("url").to_string(),
        "Glob" | "Grep" => {
            let pattern = field("pattern");
            let path = field("path");
            if path.is_empty() {
                pattern.to_string()
            } else {
                format!("{} in {}", pattern, path)
            }
        }
        "Task" => field("description").to_string(),
        "LS" => {
            let path = field("path");
            let ignore: Vec<&str> = input
                .get("ignore")
                .and_then(Value::as_array)
                .map(|arr| arr.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            if ignore.is_empty() {
                path.to_string()
            } else {
                format!("{} (ignore: {})", path, ignore.join(", "))
            }
        }
        _ => tool.to_string(),
    }
}

/// Tool result content can be a string or an array of text items
fn tool_result_text(content: Value) -> (String, ContentType) {
    match content {
        Value::Null => (String::new(), ContentType::Text),
        Value::String(s) => (s, ContentType::Text),
        Value::Array(items) => {
            let text = items
                .iter()
                .filter_map(|v| v.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n");
            (text, ContentType::Text)
        }
        other => (other.to_string(), ContentType::Json),
    }
}
