/// In-process stand-in for the Claude CLI, used for testing without network.
///
/// Produces the same stream-json objects the real CLI prints and feeds them
/// through the same [`StreamParser`].

use std::collections::VecDeque;
use std::thread;
use std::time::Duration;

use serde_json::{json, Value};

use super::agent::{Backend, CancelToken, Response, ResponseStream};
use super::provider_common::INTERRUPTED_MESSAGE;
use super::session::Session;
use super::stream_parser::StreamParser;

define_debug_log!("dummy");

pub const AGENT_LABEL: &str = "Dummy AI";

pub const DEFAULT_DELAY: Duration = Duration::from_millis(50);

pub struct DummyBackend {
    delay: Duration,
    session_counter: u64,
    parser: StreamParser,
}

impl DummyBackend {
    /// `delay` is slept between emitted events to mimic streaming.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            session_counter: 0,
            parser: StreamParser::new(AGENT_LABEL),
        }
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new(DEFAULT_DELAY)
    }
}

/// The canned reply text for `prompt`.
pub fn reply_text(prompt: &str) -> String {
    format!("I received your prompt: '{}'. This is a dummy response.", prompt)
}

/// Protocol lines for one dummy turn, serialized as the CLI would print them.
fn script_lines(prompt: &str, session_id: &str, delay: Duration) -> VecDeque<String> {
    let reply = reply_text(prompt);
    let words: Vec<&str> = reply.split_whitespace().collect();
    let mut events: Vec<Value> = Vec::new();

    events.push(json!({
        "type": "system",
        "subtype": "init",
        "session_id": session_id,
        "model": "dummy-model",
        "tools": ["Bash", "Read", "Grep"],
    }));

    for (i, word) in words.iter().enumerate() {
        let text = if i + 1 < words.len() { format!("{} ", word) } else { word.to_string() };
        events.push(json!({
            "type": "content_block_delta",
            "index": 0,
            "delta": { "type": "text_delta", "text": text },
        }));
    }

    let lower = prompt.to_lowercase();
    if lower.contains("file") || lower.contains("search") {
        events.push(json!({
            "type": "assistant",
            "message": { "content": [{
                "type": "tool_use",
                "id": "toolu_dummy",
                "name": "Grep",
                "input": { "pattern": "search pattern", "path": "files" },
            }]},
        }));
        events.push(json!({
            "type": "user",
            "message": { "content": [{
                "type": "tool_result",
                "tool_use_id": "toolu_dummy",
                "content": "Found 3 matching files",
            }]},
        }));
    }

    let duration_ms = (words.len() as u128 + 3) * delay.as_millis();
    events.push(json!({
        "type": "result",
        "subtype": "success",
        "duration_ms": duration_ms as u64,
        "cost_usd": 0.001,
        "session_id": session_id,
        "usage": {
            "input_tokens": prompt.split_whitespace().count(),
            "output_tokens": words.len(),
        },
    }));

    events.iter().map(Value::to_string).collect()
}

struct DummyStream<'a> {
    lines: VecDeque<String>,
    parser: &'a mut StreamParser,
    cancel: Option<&'a CancelToken>,
    delay: Duration,
    started: bool,
    done: bool,
}

impl Iterator for DummyStream<'_> {
    type Item = Response;

    fn next(&mut self) -> Option<Response> {
        while !self.done {
            if self.cancel.map(CancelToken::is_cancelled).unwrap_or(false) {
                debug_log("Cancel detected");
                self.done = true;
                return Some(Response::error(INTERRUPTED_MESSAGE, None));
            }
            let Some(line) = self.lines.pop_front() else {
                self.done = true;
                break;
            };
            if self.started && !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
            self.started = true;
            if let Some(response) = self.parser.parse_line(&line) {
                return Some(response);
            }
        }
        None
    }
}

impl Backend for DummyBackend {
    fn name(&self) -> &str {
        AGENT_LABEL
    }

    fn is_available(&self) -> bool {
        true
    }

    fn invoke<'a>(
        &'a mut self,
        query: &str,
        session: &Session,
        cancel: Option<&'a CancelToken>,
    ) -> ResponseStream<'a> {
        self.session_counter += 1;
        self.parser.reset();
        let session_id = session
            .id()
            .map(String::from)
            .unwrap_or_else(|| format!("dummy-session-{}", self.session_counter));
        debug_log(&format!("query: {:?}, session_id: {}", query, session_id));

        Box::new(DummyStream {
            lines: script_lines(query, &session_id, self.delay),
            parser: &mut self.parser,
            cancel,
            delay: self.delay,
            started: false,
            done: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::agent::ResponseKind;

    fn run(backend: &mut DummyBackend, query: &str) -> Vec<Response> {
        backend.invoke(query, &Session::default(), None).collect()
    }

    #[test]
    fn test_dummy_stream_shape() {
        let mut backend = DummyBackend::new(Duration::ZERO);
        let responses = run(&mut backend, "hello there");

        assert!(matches!(
            &responses[0].kind,
            ResponseKind::Init { session_id: Some(id), model: Some(model) }
                if id == "dummy-session-1" && model == "dummy-model"
        ));
        assert_eq!(responses[0].content, AGENT_LABEL);
        assert!(matches!(responses.last().map(|r| &r.kind), Some(ResponseKind::Result { .. })));
        assert!(!responses.iter().any(|r| matches!(r.kind, ResponseKind::ToolUse { .. })));
    }

    #[test]
    fn test_dummy_messages_concatenate_to_reply() {
        let mut backend = DummyBackend::new(Duration::ZERO);
        let text: String = run(&mut backend, "what is 2+2")
            .iter()
            .filter(|r| r.kind == ResponseKind::Message)
            .map(|r| r.content.as_str())
            .collect();
        assert_eq!(text, reply_text("what is 2+2"));
    }

    #[test]
    fn test_dummy_tool_pair_for_file_queries() {
        let mut backend = DummyBackend::new(Duration::ZERO);
        let responses = run(&mut backend, "search my FILES");
        let use_idx = responses
            .iter()
            .position(|r| r.kind == ResponseKind::ToolUse { tool: "Grep".to_string() })
            .expect("tool use");
        assert_eq!(responses[use_idx].content, "search pattern in files");
        assert_eq!(responses[use_idx + 1].kind, ResponseKind::ToolResult { tool: "Grep".to_string() });
        assert_eq!(responses[use_idx + 1].content, "Found 3 matching files");
    }

    #[test]
    fn test_dummy_result_tokens() {
        let mut backend = DummyBackend::new(Duration::ZERO);
        let responses = run(&mut backend, "one two three");
        let words = reply_text("one two three").split_whitespace().count() as u64;
        match responses.last().map(|r| &r.kind) {
            Some(ResponseKind::Result { token, cost_usd }) => {
                assert_eq!(*token, 3 + words);
                assert!((cost_usd - 0.001).abs() < f64::EPSILON);
            }
            other => panic!("Expected Result, got {:?}", other),
        }
    }

    #[test]
    fn test_dummy_session_counter_and_continuity() {
        let mut backend = DummyBackend::new(Duration::ZERO);
        run(&mut backend, "a");
        let second = run(&mut backend, "b");
        assert!(matches!(
            &second[0].kind,
            ResponseKind::Init { session_id: Some(id), .. } if id == "dummy-session-2"
        ));

        let session = Session::new(Some("kept".to_string()));
        let third: Vec<Response> = backend.invoke("c", &session, None).collect();
        assert!(matches!(
            &third[0].kind,
            ResponseKind::Init { session_id: Some(id), .. } if id == "kept"
        ));
    }

    #[test]
    fn test_dummy_new_query_starts_without_last_tool() {
        let mut backend = DummyBackend::new(Duration::ZERO);
        run(&mut backend, "search files");
        assert_eq!(backend.parser.last_tool(), Some("Grep"));
        drop(backend.invoke("hello", &Session::default(), None));
        assert_eq!(backend.parser.last_tool(), None);
    }

    #[test]
    fn test_dummy_cancel_mid_stream() {
        let token = CancelToken::new();
        let mut backend = DummyBackend::new(Duration::ZERO);
        let mut stream = backend.invoke("hello", &Session::default(), Some(&token));
        assert!(stream.next().is_some());
        token.cancel();
        let interrupted = stream.next().expect("interrupt");
        assert_eq!(interrupted.content, INTERRUPTED_MESSAGE);
        assert!(stream.next().is_none());
    }
}
