use crate::{
    messages::{
        openai::ChatCompletionChunk,
        unified::{StopReason, StreamEvent, Usage},
    },
    stream::{StreamProcessor, StreamState},
};

const DONE: &str = "[DONE]";

/// Translates OpenAI-compatible `chat.completion.chunk` payloads into unified events.
///
/// Each call to [`StreamProcessor::process`] receives the `data:` field of one
/// server-sent event.
pub(crate) struct OpenAIStreamProcessor {
    state: StreamState,
}

impl OpenAIStreamProcessor {
    pub(crate) fn new(message_id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            state: StreamState::new(message_id, model),
        }
    }

    fn apply(&mut self, chunk: ChatCompletionChunk, events: &mut Vec<StreamEvent>) {
        self.state.start(events);

        if let Some(usage) = chunk.usage {
            self.state.set_usage(Usage::from(usage));
        }

        for choice in chunk.choices {
            let delta = choice.delta;

            if let Some(signature) = delta
                .extra_content
                .as_ref()
                .and_then(|extension| extension.thought_signature())
            {
                self.state.capture_signature(signature);
            }

            if let Some(reasoning) = delta.reasoning_content.as_deref().filter(|text| !text.is_empty()) {
                self.state.thinking_delta(reasoning, events);
            }

            if let Some(content) = delta.content.as_deref().filter(|text| !text.is_empty()) {
                self.state.text_delta(content, events);
            }

            for call in delta.tool_calls.into_iter().flatten() {
                if let Some(signature) = call
                    .extra_content
                    .as_ref()
                    .and_then(|extension| extension.thought_signature())
                {
                    self.state.capture_signature(signature);
                }

                let (name, arguments) = match &call.function {
                    Some(function) => (function.name.as_deref(), function.arguments.as_deref()),
                    None => (None, None),
                };

                self.state
                    .tool_call_delta(call.index, call.id.as_deref(), name, arguments, events);
            }

            if let Some(reason) = choice.finish_reason.as_deref() {
                self.state.set_stop_reason(StopReason::from_finish_reason(reason));
            }
        }
    }
}

impl StreamProcessor for OpenAIStreamProcessor {
    type Chunk = String;

    fn process(&mut self, data: String) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        if data.trim() == DONE {
            self.state.finish(&mut events);
            return events;
        }

        match sonic_rs::from_str::<ChatCompletionChunk>(&data) {
            Ok(chunk) => self.apply(chunk, &mut events),
            Err(e) => log::warn!("Dropping malformed upstream chunk: {e}"),
        }

        events
    }

    fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        self.state.finish(&mut events);

        events
    }

    fn is_finished(&self) -> bool {
        self.state.is_finished()
    }
}
