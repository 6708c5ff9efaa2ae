//! Unified request → OpenAI-compatible chat completion request.

use crate::{
    LlmError,
    messages::{
        openai::{
            ChatCompletionRequest, ChatContent, ChatMessage, ChatRole, ContentPart, FunctionCall,
            FunctionDefinition, FunctionType, ImageUrl, ReasoningEffort, StreamOptions, Tool, ToolCall, ToolChoice,
            ToolChoiceFunction, ToolChoiceMode, VendorExtension,
        },
        unified::{
            ContentBlock, MessageContent, Role, ThinkingConfig, UnifiedChatRequest, UnifiedMessage, UnifiedTool,
            UnifiedToolChoice,
        },
    },
};

impl TryFrom<UnifiedChatRequest> for ChatCompletionRequest {
    type Error = LlmError;

    fn try_from(request: UnifiedChatRequest) -> Result<Self, Self::Error> {
        if request.messages.is_empty() {
            return Err(LlmError::InvalidRequest("messages must not be empty".to_string()));
        }

        let mut messages = Vec::with_capacity(request.messages.len() + 1);

        if let Some(system) = request.system.as_ref().map(|system| system.to_text())
            && !system.is_empty()
        {
            messages.push(ChatMessage::text(ChatRole::System, system));
        }

        for message in request.messages {
            convert_message(message, &mut messages);
        }

        let tools = request
            .tools
            .filter(|tools| !tools.is_empty())
            .map(|tools| tools.into_iter().map(Tool::from).collect());

        let tool_choice = tools.as_ref().map(|_| match request.tool_choice {
            Some(UnifiedToolChoice::Any { .. }) => ToolChoice::Mode(ToolChoiceMode::Required),
            Some(UnifiedToolChoice::Tool { name, .. }) => ToolChoice::Specific {
                r#type: FunctionType::Function,
                function: ToolChoiceFunction { name },
            },
            _ => ToolChoice::Mode(ToolChoiceMode::Auto),
        });

        let reasoning_effort = match request.thinking {
            Some(ThinkingConfig::Enabled { budget_tokens }) => Some(ReasoningEffort::from_budget(budget_tokens)),
            Some(ThinkingConfig::Disabled) | None => None,
        };

        let stream = request.stream.filter(|stream| *stream);

        Ok(Self {
            model: request.model,
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
            top_k: request.top_k,
            stop: request.stop_sequences,
            stream,
            stream_options: stream.map(|_| StreamOptions { include_usage: true }),
            tools,
            tool_choice,
            reasoning_effort,
            extra_body: None,
        })
    }
}

impl From<UnifiedTool> for Tool {
    fn from(tool: UnifiedTool) -> Self {
        Tool {
            r#type: FunctionType::Function,
            function: FunctionDefinition {
                name: tool.name,
                description: tool.description,
                parameters: tool.input_schema,
            },
        }
    }
}

impl From<Role> for ChatRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => ChatRole::User,
            Role::Assistant => ChatRole::Assistant,
        }
    }
}

/// Demultiplexes one unified message into provider messages.
///
/// Tool calls stay on the message that made them, tool results become
/// separate `tool` messages, and thinking text moves to `reasoning_content`.
fn convert_message(message: UnifiedMessage, messages: &mut Vec<ChatMessage>) {
    let role = ChatRole::from(message.role);

    let blocks = match message.content {
        MessageContent::Text(text) => {
            messages.push(ChatMessage::text(role, text));
            return;
        }
        MessageContent::Blocks(blocks) => blocks,
    };

    let mut parts = Vec::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();
    let mut tool_results = Vec::new();
    let mut reasoning: Option<String> = None;
    let mut thinking_signature: Option<String> = None;

    for block in blocks {
        match block {
            ContentBlock::Text { text } => parts.push(ContentPart::Text { text }),
            ContentBlock::Image { source } => parts.push(ContentPart::ImageUrl {
                image_url: ImageUrl { url: source.to_url() },
            }),
            ContentBlock::ToolUse {
                id,
                name,
                input,
                signature,
            } => tool_calls.push(ToolCall {
                id,
                r#type: FunctionType::Function,
                function: FunctionCall {
                    name,
                    arguments: serde_json::to_string(&input).unwrap_or_else(|_| "{}".to_string()),
                },
                extra_content: signature.map(VendorExtension::with_thought_signature),
            }),
            ContentBlock::ToolResult {
                tool_use_id, content, ..
            } => {
                let text = content.map(|content| content.to_text()).unwrap_or_default();
                tool_results.push(ChatMessage::tool_result(tool_use_id, text));
            }
            ContentBlock::Thinking { thinking, signature } => {
                reasoning.get_or_insert_with(String::new).push_str(&thinking);

                if thinking_signature.is_none() {
                    thinking_signature = signature;
                }
            }
            ContentBlock::ServerToolUse { .. } | ContentBlock::WebSearchToolResult { .. } => {
                log::debug!("Dropping server tool block, it has no provider-side equivalent");
            }
        }
    }

    if let Some(signature) = thinking_signature
        && let Some(call) = tool_calls.first_mut()
        && call.extra_content.is_none()
    {
        call.extra_content = Some(VendorExtension::with_thought_signature(signature));
    }

    let has_calls = !tool_calls.is_empty();
    let has_body = !parts.is_empty() || has_calls || reasoning.is_some();

    let content = match parts.len() {
        0 => None,
        1 if matches!(parts[0], ContentPart::Text { .. }) => match parts.pop() {
            Some(ContentPart::Text { text }) => Some(ChatContent::Text(text)),
            _ => None,
        },
        _ => Some(ChatContent::Parts(parts)),
    };

    let body = ChatMessage {
        role,
        content,
        reasoning_content: reasoning,
        tool_calls: has_calls.then_some(tool_calls),
        tool_call_id: None,
    };

    if tool_results.is_empty() {
        if has_body {
            messages.push(body);
        } else {
            messages.push(ChatMessage::text(body.role, String::new()));
        }
    } else if has_calls {
        // The new calls must precede the results that follow them.
        messages.push(body);
        messages.extend(tool_results);
    } else {
        // The results answer calls from an earlier turn.
        messages.extend(tool_results);

        if has_body {
            messages.push(body);
        }
    }
}
