//! Per-stream state shared by every provider stream processor.
//!
//! [`StreamState`] owns the bookkeeping of one outbound stream: whether
//! `message_start` went out, which content block is open, the accumulated
//! tool calls, the captured continuation signature and the final stop reason
//! and usage. Provider processors translate their upstream units into calls on
//! it, and [`forward`] drives a processor over an upstream body.

use std::{
    collections::{BTreeMap, VecDeque},
    fmt,
    pin::Pin,
};

use futures::{Stream, StreamExt};
use serde_json::Value;

use crate::{
    LlmError,
    messages::unified::{
        BlockDelta, ContentBlock, MessageDelta, StopReason, StreamEvent, StreamMessageStart, Usage,
    },
};

/// A stream of unified events, as returned to callers.
pub type ChatEventStream = Pin<Box<dyn Stream<Item = crate::Result<StreamEvent>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenBlock {
    Text,
    Thinking,
    Tool(u32),
}

/// Raw arguments of one streamed tool call.
#[derive(Debug, Clone)]
pub(crate) struct ToolCallAccumulator {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) arguments: String,
    block_index: u32,
    closed: bool,
}

impl ToolCallAccumulator {
    /// The arguments as a JSON value. Only meaningful once the call is closed.
    pub(crate) fn input(&self) -> Value {
        parse_arguments(&self.arguments)
    }
}

/// Parses tool arguments, substituting an empty object for anything that is not valid JSON.
pub(crate) fn parse_arguments(arguments: &str) -> Value {
    if arguments.trim().is_empty() {
        return Value::Object(Default::default());
    }

    serde_json::from_str(arguments).unwrap_or_else(|e| {
        log::warn!("Tool call arguments are not valid JSON, using an empty object: {e}");
        Value::Object(Default::default())
    })
}

pub(crate) struct StreamState {
    message_id: String,
    model: String,
    started: bool,
    finished: bool,
    next_index: u32,
    open: Option<(u32, OpenBlock)>,
    buffers: BTreeMap<u32, String>,
    tool_calls: BTreeMap<u32, ToolCallAccumulator>,
    signature: Option<String>,
    stop_reason: Option<StopReason>,
    usage: Usage,
}

impl StreamState {
    pub(crate) fn new(message_id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            model: model.into(),
            started: false,
            finished: false,
            next_index: 0,
            open: None,
            buffers: BTreeMap::new(),
            tool_calls: BTreeMap::new(),
            signature: None,
            stop_reason: None,
            usage: Usage::default(),
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished
    }

    /// Emits `message_start` and a single `ping` the first time it is called.
    pub(crate) fn start(&mut self, events: &mut Vec<StreamEvent>) {
        if self.started || self.finished {
            return;
        }

        self.started = true;

        events.push(StreamEvent::MessageStart {
            message: StreamMessageStart::new(self.message_id.clone(), self.model.clone()),
        });
        events.push(StreamEvent::Ping);
    }

    pub(crate) fn thinking_delta(&mut self, thinking: &str, events: &mut Vec<StreamEvent>) {
        if self.finished {
            return;
        }

        let index = self.ensure_open(OpenBlock::Thinking, events);

        self.buffers.entry(index).or_default().push_str(thinking);

        events.push(StreamEvent::ContentBlockDelta {
            index,
            delta: BlockDelta::ThinkingDelta {
                thinking: thinking.to_string(),
            },
        });
    }

    pub(crate) fn text_delta(&mut self, text: &str, events: &mut Vec<StreamEvent>) {
        if self.finished {
            return;
        }

        let index = self.ensure_open(OpenBlock::Text, events);

        self.buffers.entry(index).or_default().push_str(text);

        events.push(StreamEvent::ContentBlockDelta {
            index,
            delta: BlockDelta::TextDelta { text: text.to_string() },
        });
    }

    /// Remembers the first continuation signature seen in the stream.
    pub(crate) fn capture_signature(&mut self, signature: &str) {
        if self.signature.is_none() && !signature.is_empty() {
            self.signature = Some(signature.to_string());
        }
    }

    /// Handles one tool call fragment for the provider-assigned `tool_index`.
    ///
    /// The first fragment of an index opens a new `tool_use` block. Argument
    /// text is forwarded as-is; it only forms valid JSON once every fragment
    /// has arrived.
    pub(crate) fn tool_call_delta(
        &mut self,
        tool_index: u32,
        id: Option<&str>,
        name: Option<&str>,
        arguments: Option<&str>,
        events: &mut Vec<StreamEvent>,
    ) {
        if self.finished {
            return;
        }

        if !self.tool_calls.contains_key(&tool_index) {
            self.start(events);
            self.close_open_block(events);

            let index = self.next_index;
            self.next_index += 1;

            let id = id
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("toolu_{}", uuid::Uuid::new_v4().simple()));

            let name = name.unwrap_or_default().to_string();

            let signature = if tool_index == 0 { self.signature.clone() } else { None };

            events.push(StreamEvent::ContentBlockStart {
                index,
                content_block: ContentBlock::ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    input: Value::Object(Default::default()),
                    signature,
                },
            });

            self.open = Some((index, OpenBlock::Tool(tool_index)));
            self.tool_calls.insert(
                tool_index,
                ToolCallAccumulator {
                    id,
                    name,
                    arguments: String::new(),
                    block_index: index,
                    closed: false,
                },
            );
        }

        let Some(fragment) = arguments.filter(|fragment| !fragment.is_empty()) else {
            return;
        };

        let Some(accumulator) = self.tool_calls.get_mut(&tool_index) else {
            return;
        };

        accumulator.arguments.push_str(fragment);

        if accumulator.closed {
            log::warn!(
                "Dropping argument fragment for tool call {} whose block is already closed",
                accumulator.id
            );
            return;
        }

        events.push(StreamEvent::ContentBlockDelta {
            index: accumulator.block_index,
            delta: BlockDelta::InputJsonDelta {
                partial_json: fragment.to_string(),
            },
        });
    }

    pub(crate) fn set_stop_reason(&mut self, stop_reason: StopReason) {
        self.stop_reason = Some(stop_reason);
    }

    pub(crate) fn set_usage(&mut self, usage: Usage) {
        self.usage = usage;
    }

    pub(crate) fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Tool calls seen so far, in provider index order.
    pub(crate) fn tool_calls(&self) -> impl Iterator<Item = &ToolCallAccumulator> {
        self.tool_calls.values()
    }

    /// Closes the stream: stops the open block, then emits `message_delta` and `message_stop`.
    ///
    /// Calling it again yields nothing.
    pub(crate) fn finish(&mut self, events: &mut Vec<StreamEvent>) {
        if self.finished {
            return;
        }

        self.start(events);
        self.close_open_block(events);
        self.finished = true;

        let text_len: usize = self.buffers.values().map(String::len).sum();

        log::debug!(
            "Stream {} finished after {} blocks, {text_len} bytes of text and {} tool calls",
            self.message_id,
            self.next_index,
            self.tool_calls.len()
        );

        if log::log_enabled!(log::Level::Debug) {
            for call in self.tool_calls() {
                log::debug!("Tool call {} ({}) closed with input {}", call.id, call.name, call.input());
            }
        }

        events.push(StreamEvent::MessageDelta {
            delta: MessageDelta {
                stop_reason: Some(self.stop_reason.take().unwrap_or(StopReason::EndTurn)),
                stop_sequence: None,
            },
            usage: std::mem::take(&mut self.usage),
        });
        events.push(StreamEvent::MessageStop);
    }

    fn ensure_open(&mut self, kind: OpenBlock, events: &mut Vec<StreamEvent>) -> u32 {
        self.start(events);

        if let Some((index, open)) = self.open
            && open == kind
        {
            return index;
        }

        self.close_open_block(events);

        let index = self.next_index;
        self.next_index += 1;

        let content_block = match kind {
            OpenBlock::Thinking => ContentBlock::Thinking {
                thinking: String::new(),
                signature: None,
            },
            _ => ContentBlock::text(""),
        };

        events.push(StreamEvent::ContentBlockStart { index, content_block });
        self.open = Some((index, kind));

        index
    }

    fn close_open_block(&mut self, events: &mut Vec<StreamEvent>) {
        let Some((index, kind)) = self.open.take() else {
            return;
        };

        if let OpenBlock::Tool(tool_index) = kind
            && let Some(accumulator) = self.tool_calls.get_mut(&tool_index)
        {
            accumulator.closed = true;
        }

        events.push(StreamEvent::ContentBlockStop { index });
    }
}

/// Turns units of an upstream body into unified events.
pub(crate) trait StreamProcessor: Send {
    type Chunk;

    fn process(&mut self, chunk: Self::Chunk) -> Vec<StreamEvent>;

    /// Flushes everything still pending. Must be idempotent.
    fn finish(&mut self) -> Vec<StreamEvent>;

    fn is_finished(&self) -> bool;
}

struct Forwarder<T, E, P> {
    source: Pin<Box<dyn Stream<Item = Result<T, E>> + Send>>,
    processor: P,
    pending: VecDeque<StreamEvent>,
    done: bool,
}

/// Drives `processor` over `source`, yielding events strictly in arrival order.
///
/// The processor is finished exactly once, when the processor itself signals
/// completion or the source ends. A source error is yielded once and ends the
/// stream. Dropping the returned stream drops the source and releases the
/// underlying connection.
pub(crate) fn forward<S, T, E, P>(source: S, processor: P) -> ChatEventStream
where
    S: Stream<Item = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: fmt::Display + Send + 'static,
    P: StreamProcessor<Chunk = T> + 'static,
{
    let forwarder = Forwarder {
        source: Box::pin(source),
        processor,
        pending: VecDeque::new(),
        done: false,
    };

    let stream = futures::stream::unfold(forwarder, |mut forwarder| async move {
        loop {
            if let Some(event) = forwarder.pending.pop_front() {
                return Some((Ok(event), forwarder));
            }

            if forwarder.done {
                return None;
            }

            match forwarder.source.next().await {
                Some(Ok(chunk)) => {
                    let events = forwarder.processor.process(chunk);
                    forwarder.pending.extend(events);

                    if forwarder.processor.is_finished() {
                        forwarder.done = true;
                    }
                }
                Some(Err(e)) => {
                    log::error!("Upstream stream failed: {e}");
                    forwarder.done = true;

                    return Some((Err(LlmError::ConnectionError(e.to_string())), forwarder));
                }
                None => {
                    let events = forwarder.processor.finish();
                    forwarder.pending.extend(events);
                    forwarder.done = true;
                }
            }
        }
    });

    Box::pin(stream)
}
