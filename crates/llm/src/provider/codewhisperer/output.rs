use std::collections::HashMap;

use bytes::Bytes;

use super::parser::{EventStreamParser, ParseEvent};
use crate::{
    messages::unified::{ContentBlock, MessageType, Role, StopReason, StreamEvent, UnifiedResponse},
    stream::{StreamProcessor, StreamState},
};

/// Translates the assistant endpoint's binary body into unified stream events.
pub(crate) struct CodeWhispererStreamProcessor {
    parser: EventStreamParser,
    state: StreamState,
    tool_indices: HashMap<String, u32>,
    open_tool: Option<String>,
    held_text: String,
}

impl CodeWhispererStreamProcessor {
    pub(crate) fn new(message_id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            parser: EventStreamParser::new(),
            state: StreamState::new(message_id, model),
            tool_indices: HashMap::new(),
            open_tool: None,
            held_text: String::new(),
        }
    }

    fn apply(&mut self, parsed: Vec<ParseEvent>, events: &mut Vec<StreamEvent>) {
        for event in parsed {
            match event {
                // Text must not close a tool block that still receives input.
                ParseEvent::Content(text) if self.open_tool.is_some() => self.held_text.push_str(&text),
                ParseEvent::Content(text) => self.state.text_delta(&text, events),
                ParseEvent::ToolStart { id, name } => {
                    let index = self.tool_indices.len() as u32;
                    self.tool_indices.insert(id.clone(), index);
                    self.open_tool = Some(id.clone());

                    self.state.tool_call_delta(index, Some(&id), Some(&name), None, events);
                }
                ParseEvent::ToolInput { id, fragment } => {
                    let Some(index) = self.tool_indices.get(&id).copied() else {
                        log::warn!("Dropping input for unknown tool call {id}");
                        continue;
                    };

                    self.state.tool_call_delta(index, None, None, Some(&fragment), events);
                }
                ParseEvent::ToolStop { id } => {
                    if self.open_tool.as_ref() == Some(&id) {
                        self.open_tool = None;
                        self.flush_held_text(events);
                    }
                }
            }
        }
    }

    fn flush_held_text(&mut self, events: &mut Vec<StreamEvent>) {
        if self.held_text.is_empty() {
            return;
        }

        let text = std::mem::take(&mut self.held_text);
        self.state.text_delta(&text, events);
    }
}

impl StreamProcessor for CodeWhispererStreamProcessor {
    type Chunk = Bytes;

    fn process(&mut self, chunk: Bytes) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        if self.state.is_finished() {
            return events;
        }

        self.state.start(&mut events);

        let parsed = self.parser.feed(&chunk);
        self.apply(parsed, &mut events);

        events
    }

    fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        if self.state.is_finished() {
            return events;
        }

        let outcome = self.parser.finish();
        self.apply(outcome.events, &mut events);

        self.open_tool = None;
        self.flush_held_text(&mut events);

        if let Some(usage) = outcome.usage {
            self.state.set_usage(usage);
        }

        let stop_reason = if self.state.has_tool_calls() || !outcome.tool_calls.is_empty() {
            StopReason::ToolUse
        } else {
            StopReason::EndTurn
        };

        self.state.set_stop_reason(stop_reason);
        self.state.finish(&mut events);

        events
    }

    fn is_finished(&self) -> bool {
        self.state.is_finished()
    }
}

/// Decodes a complete body into a unified response.
pub(crate) fn parse_response(body: &[u8], id: String, model: String) -> UnifiedResponse {
    let mut parser = EventStreamParser::new();

    let text: String = parser
        .feed(body)
        .into_iter()
        .filter_map(|event| match event {
            ParseEvent::Content(text) => Some(text),
            _ => None,
        })
        .collect();

    let outcome = parser.finish();

    let mut content = Vec::new();

    if !text.is_empty() {
        content.push(ContentBlock::Text { text });
    }

    let stop_reason = if outcome.tool_calls.is_empty() {
        StopReason::EndTurn
    } else {
        StopReason::ToolUse
    };

    content.extend(outcome.tool_calls.into_iter().map(|call| ContentBlock::ToolUse {
        id: call.id,
        name: call.name,
        input: call.input,
        signature: None,
    }));

    if content.is_empty() {
        content.push(ContentBlock::text(""));
    }

    UnifiedResponse {
        id,
        r#type: MessageType::Message,
        role: Role::Assistant,
        content,
        model,
        stop_reason: Some(stop_reason),
        stop_sequence: None,
        usage: outcome.usage.unwrap_or_default(),
    }
}
