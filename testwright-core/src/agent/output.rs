//! Parsing for the Claude Code `stream-json` output format

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// One line of `claude --output-format stream-json`
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    /// Session start
    System {
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
    },

    /// A turn of assistant output
    Assistant {
        #[serde(default)]
        message: AssistantMessage,
    },

    /// Final result of the session
    Result {
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        is_error: bool,
        #[serde(default)]
        duration_ms: Option<u64>,
        #[serde(default)]
        total_cost_usd: Option<f64>,
    },

    /// Tool results echoed back as user turns, and anything newer
    #[serde(other)]
    Other,
}

/// Assistant message content
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

/// A block inside an assistant message
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

/// Handler for processing stream messages
pub trait StreamHandler: Send {
    /// Called when assistant text is received
    fn on_assistant_text(&mut self, text: &str);

    /// Called when the assistant uses a tool
    fn on_tool_use(&mut self, _tool: &str, _input: &serde_json::Value) {}

    /// Called with the final result
    fn on_complete(&mut self, _result: Option<&str>, _is_error: bool, _duration_ms: Option<u64>) {}

    /// Called for lines that are not stream JSON
    fn on_unparsed(&mut self, _line: &str) {}
}

/// Feed one output line to a handler
pub fn process_line(line: &str, handler: &mut dyn StreamHandler) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    match serde_json::from_str::<StreamMessage>(line) {
        Ok(StreamMessage::System { subtype, .. }) => {
            trace!(subtype = ?subtype, "Stream session started");
        }
        Ok(StreamMessage::Assistant { message }) => {
            for block in &message.content {
                match block {
                    ContentBlock::Text { text } => handler.on_assistant_text(text),
                    ContentBlock::ToolUse { name, input } => handler.on_tool_use(name, input),
                    ContentBlock::Other => {}
                }
            }
        }
        Ok(StreamMessage::Result {
            result,
            is_error,
            duration_ms,
            total_cost_usd,
        }) => {
            debug!(
                duration_ms = ?duration_ms,
                cost_usd = ?total_cost_usd,
                is_error,
                "Stream finished"
            );
            handler.on_complete(result.as_deref(), is_error, duration_ms);
        }
        Ok(StreamMessage::Other) => {}
        Err(_) => handler.on_unparsed(line),
    }
}

/// Handler that keeps what an executor needs from a session
#[derive(Debug, Default)]
pub struct Transcript {
    assistant_text: Vec<String>,
    result: Option<String>,
    is_error: bool,
    tool_uses: usize,
    raw: Vec<String>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Final answer: the result message, else the joined assistant text,
    /// else raw non-JSON output
    pub fn text(&self) -> String {
        if let Some(result) = self.result.as_ref().filter(|r| !r.trim().is_empty()) {
            return result.clone();
        }
        if !self.assistant_text.is_empty() {
            return self.assistant_text.join("\n");
        }
        self.raw.join("\n")
    }

    pub fn is_error(&self) -> bool {
        self.is_error
    }

    pub fn tool_uses(&self) -> usize {
        self.tool_uses
    }
}

impl StreamHandler for Transcript {
    fn on_assistant_text(&mut self, text: &str) {
        self.assistant_text.push(text.to_string());
    }

    fn on_tool_use(&mut self, tool: &str, _input: &serde_json::Value) {
        debug!(tool, "Agent used tool");
        self.tool_uses += 1;
    }

    fn on_complete(&mut self, result: Option<&str>, is_error: bool, _duration_ms: Option<u64>) {
        self.result = result.map(String::from);
        self.is_error = is_error;
    }

    fn on_unparsed(&mut self, line: &str) {
        self.raw.push(line.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stream_session() {
        let lines = [
            r#"{"type":"system","subtype":"init","session_id":"abc","tools":["Read"]}"#,
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"Looking around"},{"type":"tool_use","id":"t1","name":"Read","input":{"file_path":"calc.py"}}]}}"#,
            r#"{"type":"user","message":{"content":[{"type":"tool_result","content":"..."}]}}"#,
            r#"{"type":"result","subtype":"success","is_error":false,"result":"VERDICT: TESTS_NEEDED","duration_ms":1200}"#,
        ];

        let mut transcript = Transcript::new();
        for line in lines {
            process_line(line, &mut transcript);
        }

        assert_eq!(transcript.text(), "VERDICT: TESTS_NEEDED");
        assert_eq!(transcript.tool_uses(), 1);
        assert!(!transcript.is_error());
    }

    #[test]
    fn test_falls_back_to_assistant_text() {
        let mut transcript = Transcript::new();
        process_line(
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"part one"}]}}"#,
            &mut transcript,
        );
        process_line(
            r#"{"type":"assistant","message":{"content":[{"type":"thinking","thinking":"hmm"},{"type":"text","text":"part two"}]}}"#,
            &mut transcript,
        );
        assert_eq!(transcript.text(), "part one\npart two");
    }

    #[test]
    fn test_plain_text_lines_kept() {
        let mut transcript = Transcript::new();
        process_line("codex says hello", &mut transcript);
        process_line("", &mut transcript);
        process_line("{not json", &mut transcript);
        assert_eq!(transcript.text(), "codex says hello\n{not json");
    }
}
