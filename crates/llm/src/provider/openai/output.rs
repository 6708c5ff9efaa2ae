//! OpenAI-compatible chat completion response → unified response.

use serde_json::Value;

use crate::{
    messages::{
        openai::{Annotation, ChatCompletionResponse, ChatUsage},
        unified::{
            ContentBlock, MessageType, Role, ServerToolUsage, StopReason, UnifiedResponse, Usage, WebSearchResult,
        },
    },
    stream::parse_arguments,
};

impl From<ChatCompletionResponse> for UnifiedResponse {
    fn from(response: ChatCompletionResponse) -> Self {
        let usage = response.usage.map(Usage::from).unwrap_or_default();

        let Some(choice) = response.choices.into_iter().next() else {
            log::warn!("Upstream response {} has no choices", response.id);

            return UnifiedResponse {
                id: response.id,
                r#type: MessageType::Message,
                role: Role::Assistant,
                content: vec![ContentBlock::text("")],
                model: response.model,
                stop_reason: Some(StopReason::EndTurn),
                stop_sequence: None,
                usage,
            };
        };

        let message = choice.message;
        let mut content = Vec::new();

        let citations: Vec<_> = message
            .annotations
            .into_iter()
            .flatten()
            .filter_map(|annotation| match annotation {
                Annotation::UrlCitation { url_citation } => {
                    Some(WebSearchResult::new(url_citation.url, url_citation.title))
                }
                Annotation::Unknown => None,
            })
            .collect();

        if !citations.is_empty() {
            let id = format!("srvtoolu_{}", uuid::Uuid::new_v4().simple());

            content.push(ContentBlock::ServerToolUse {
                id: id.clone(),
                name: "web_search".to_string(),
                input: Value::Object(Default::default()),
            });

            content.push(ContentBlock::WebSearchToolResult {
                tool_use_id: id,
                content: citations,
            });
        }

        let tool_calls = message.tool_calls.unwrap_or_default();

        let first_call_signature = tool_calls
            .first()
            .and_then(|call| call.extra_content.as_ref())
            .and_then(|extension| extension.thought_signature())
            .map(str::to_string);

        if let Some(reasoning) = message.reasoning_content.filter(|reasoning| !reasoning.is_empty()) {
            let signature = message
                .extra_content
                .as_ref()
                .and_then(|extension| extension.thought_signature())
                .map(str::to_string)
                .or_else(|| first_call_signature.clone());

            content.push(ContentBlock::Thinking {
                thinking: reasoning,
                signature,
            });
        }

        if let Some(text) = message.content.filter(|text| !text.is_empty()) {
            content.push(ContentBlock::Text { text });
        }

        for (i, call) in tool_calls.into_iter().enumerate() {
            content.push(ContentBlock::ToolUse {
                id: call.id,
                name: call.function.name,
                input: parse_arguments(&call.function.arguments),
                signature: if i == 0 { first_call_signature.clone() } else { None },
            });
        }

        if content.is_empty() {
            content.push(ContentBlock::text(""));
        }

        let stop_reason = choice
            .finish_reason
            .as_deref()
            .map(StopReason::from_finish_reason)
            .unwrap_or(StopReason::EndTurn);

        UnifiedResponse {
            id: response.id,
            r#type: MessageType::Message,
            role: Role::Assistant,
            content,
            model: response.model,
            stop_reason: Some(stop_reason),
            stop_sequence: None,
            usage,
        }
    }
}

impl From<ChatUsage> for Usage {
    fn from(usage: ChatUsage) -> Self {
        let details = usage.prompt_tokens_details;
        let cached = details.as_ref().and_then(|details| details.cached_tokens).unwrap_or(0);

        let input_tokens = usage.prompt_tokens - cached;

        if input_tokens < 0 {
            log::warn!(
                "Upstream reported more cached tokens ({cached}) than prompt tokens ({}), input_tokens is negative",
                usage.prompt_tokens
            );
        }

        Usage {
            input_tokens,
            output_tokens: usage.completion_tokens,
            cache_read_input_tokens: details.as_ref().map(|_| cached),
            cache_creation_input_tokens: details.map(|details| details.cache_creation_tokens.unwrap_or(0)),
            server_tool_use: usage
                .web_search_requests
                .filter(|requests| *requests > 0)
                .map(|web_search_requests| ServerToolUsage { web_search_requests }),
        }
    }
}
