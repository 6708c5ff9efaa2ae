//! Incremental decoder for the assistant endpoint's response body.
//!
//! The body is a binary event stream whose payloads are JSON objects. Instead
//! of decoding the framing, the parser looks for the leading bytes of the
//! object shapes it cares about, then scans forward for the matching closing
//! brace while skipping quoted strings. Objects may be split across reads, so
//! an incomplete object stays in the buffer until more bytes arrive.
//!
//! A stray `}` inside a string the scanner misreads (for example after an
//! unbalanced escape) stalls extraction until a later brace balances it. The
//! bytes in between are lost.

use serde_json::Value;

use crate::{messages::unified::Usage, stream::parse_arguments};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Content,
    Name,
    Input,
    Stop,
    Usage,
}

const PATTERNS: [(&[u8], Kind); 5] = [
    (br#"{"content":"#, Kind::Content),
    (br#"{"name":"#, Kind::Name),
    (br#"{"input":"#, Kind::Input),
    (br#"{"stop":"#, Kind::Stop),
    (br#"{"usage":"#, Kind::Usage),
];

/// Bytes kept at the end of a buffer without any pattern, in case one starts there.
const TAIL: usize = 10;

/// One decoded upstream event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ParseEvent {
    Content(String),
    ToolStart { id: String, name: String },
    ToolInput { id: String, fragment: String },
    ToolStop { id: String },
}

/// A finalized tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParsedToolCall {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) input: Value,
}

/// What remains once the body has ended.
#[derive(Debug, Default)]
pub(crate) struct ParseOutcome {
    pub(crate) events: Vec<ParseEvent>,
    pub(crate) tool_calls: Vec<ParsedToolCall>,
    pub(crate) usage: Option<Usage>,
}

#[derive(Debug)]
struct ToolBuilder {
    id: String,
    name: String,
    arguments: String,
}

#[derive(Debug, Default)]
pub(crate) struct EventStreamParser {
    buffer: Vec<u8>,
    current_tool: Option<ToolBuilder>,
    tool_calls: Vec<ParsedToolCall>,
    last_content: Option<String>,
    usage: Option<Usage>,
}

impl EventStreamParser {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends `bytes` and returns every event that became complete.
    pub(crate) fn feed(&mut self, bytes: &[u8]) -> Vec<ParseEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();

        loop {
            let Some((start, kind)) = find_earliest(&self.buffer) else {
                if self.buffer.len() > TAIL {
                    self.buffer.drain(..self.buffer.len() - TAIL);
                }

                break;
            };

            let Some(len) = object_len(&self.buffer[start..]) else {
                self.buffer.drain(..start);
                break;
            };

            let object: Vec<u8> = self.buffer.drain(..start + len).skip(start).collect();

            match serde_json::from_slice::<Value>(&object) {
                Ok(value) => self.handle(kind, value, &mut events),
                Err(e) => log::warn!("Dropping malformed upstream event: {e}"),
            }
        }

        events
    }

    /// Finalizes the open tool call and hands over the tool calls and withheld usage.
    pub(crate) fn finish(&mut self) -> ParseOutcome {
        let mut events = Vec::new();
        self.finalize_tool(&mut events);

        if !self.buffer.is_empty() {
            log::debug!("Discarding {} unparsed trailing bytes", self.buffer.len());
            self.buffer.clear();
        }

        ParseOutcome {
            events,
            tool_calls: std::mem::take(&mut self.tool_calls),
            usage: self.usage.take(),
        }
    }

    fn handle(&mut self, kind: Kind, value: Value, events: &mut Vec<ParseEvent>) {
        match kind {
            Kind::Content => {
                if value.get("followupPrompt").is_some() {
                    return;
                }

                let Some(content) = value.get("content").and_then(Value::as_str) else {
                    return;
                };

                if self.last_content.as_deref() == Some(content) {
                    log::debug!("Skipping replayed content event");
                    return;
                }

                self.last_content = Some(content.to_string());
                events.push(ParseEvent::Content(content.to_string()));
            }
            Kind::Name | Kind::Input => {
                let id = value.get("toolUseId").and_then(Value::as_str);
                let name = value.get("name").and_then(Value::as_str);

                if let Some(id) = id
                    && self.tool_calls.iter().any(|call| call.id == id)
                {
                    log::debug!("Ignoring event for already finalized tool call {id}");
                    return;
                }

                let switches = match (&self.current_tool, id) {
                    (None, _) => true,
                    (Some(current), Some(id)) => current.id != id,
                    (Some(_), None) => false,
                };

                if switches {
                    self.finalize_tool(events);

                    let Some(name) = name else {
                        log::warn!("Dropping tool input that belongs to no open tool call");
                        return;
                    };

                    let id = id
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("tooluse_{}", uuid::Uuid::new_v4().simple()));

                    events.push(ParseEvent::ToolStart {
                        id: id.clone(),
                        name: name.to_string(),
                    });

                    self.current_tool = Some(ToolBuilder {
                        id,
                        name: name.to_string(),
                        arguments: String::new(),
                    });
                }

                if let Some(input) = value.get("input") {
                    self.append_input(input, events);
                }

                if is_stop(&value) {
                    self.finalize_tool(events);
                }
            }
            Kind::Stop => {
                if is_stop(&value) {
                    self.finalize_tool(events);
                }
            }
            Kind::Usage => match value.get("usage") {
                Some(Value::Object(usage)) => {
                    let tokens = |key: &str| usage.get(key).and_then(Value::as_i64).unwrap_or(0);

                    self.usage = Some(Usage {
                        input_tokens: tokens("inputTokens"),
                        output_tokens: tokens("outputTokens"),
                        ..Default::default()
                    });
                }
                Some(Value::Number(credits)) => log::debug!("Upstream metered {credits} credits"),
                _ => log::warn!("Ignoring usage event of unknown shape"),
            },
        }
    }

    fn append_input(&mut self, input: &Value, events: &mut Vec<ParseEvent>) {
        let Some(tool) = self.current_tool.as_mut() else {
            return;
        };

        let fragment = match input {
            Value::String(fragment) => fragment.clone(),
            Value::Null => return,
            other => other.to_string(),
        };

        if fragment.is_empty() {
            return;
        }

        tool.arguments.push_str(&fragment);

        events.push(ParseEvent::ToolInput {
            id: tool.id.clone(),
            fragment,
        });
    }

    fn finalize_tool(&mut self, events: &mut Vec<ParseEvent>) {
        let Some(tool) = self.current_tool.take() else {
            return;
        };

        events.push(ParseEvent::ToolStop { id: tool.id.clone() });

        if self.tool_calls.iter().any(|call| call.id == tool.id) {
            log::debug!("Tool call {} finalized twice, keeping the first", tool.id);
            return;
        }

        self.tool_calls.push(ParsedToolCall {
            input: parse_arguments(&tool.arguments),
            id: tool.id,
            name: tool.name,
        });
    }
}

fn is_stop(value: &Value) -> bool {
    value.get("stop").and_then(Value::as_bool).unwrap_or(false)
}

fn find_earliest(buffer: &[u8]) -> Option<(usize, Kind)> {
    PATTERNS
        .iter()
        .filter_map(|(pattern, kind)| {
            buffer
                .windows(pattern.len())
                .position(|window| window == *pattern)
                .map(|position| (position, *kind))
        })
        .min_by_key(|(position, _)| *position)
}

/// Length of the JSON object at the start of `bytes`, if it is complete.
fn object_len(bytes: &[u8]) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, byte) in bytes.iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }

        match byte {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth = depth.saturating_sub(1);

                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }

    None
}
