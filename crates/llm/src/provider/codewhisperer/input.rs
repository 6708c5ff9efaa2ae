//! Unified request → assistant endpoint `conversationState`.

use crate::{
    error::LlmError,
    messages::{
        codewhisperer::{
            AssistantHistoryItem, AssistantResponseMessage, ChatTriggerType, CodeWhispererRequest, ConversationState,
            CurrentMessage, HistoryItem, Image, ImageBytes, InputSchema, Origin, TextContent, ToolItem, ToolResult,
            ToolResultStatus, ToolSpecification, ToolUse, UserHistoryItem, UserInputMessage, UserInputMessageContext,
        },
        unified::{ContentBlock, ImageSource, MessageContent, Role, UnifiedChatRequest, UnifiedMessage, UnifiedTool},
    },
};

/// Model used when the requested one has no proprietary counterpart.
pub(crate) const DEFAULT_MODEL: &str = "CLAUDE_SONNET_4_5_20250929_V1_0";

const MODEL_TABLE: &[(&str, &str)] = &[
    ("claude-opus-4-5", "claude-opus-4.5"),
    ("claude-opus-4-5-20251101", "claude-opus-4.5"),
    ("claude-haiku-4-5", "claude-haiku-4.5"),
    ("claude-haiku-4-5-20251001", "claude-haiku-4.5"),
    ("claude-sonnet-4-5", "CLAUDE_SONNET_4_5_20250929_V1_0"),
    ("claude-sonnet-4-5-20250929", "CLAUDE_SONNET_4_5_20250929_V1_0"),
    ("claude-sonnet-4-20250514", "CLAUDE_SONNET_4_20250514_V1_0"),
    ("claude-3-7-sonnet-20250219", "CLAUDE_3_7_SONNET_20250219_V1_0"),
    ("claude-3-5-sonnet-20241022", "CLAUDE_3_7_SONNET_20250219_V1_0"),
    ("claude-3-5-sonnet-latest", "CLAUDE_3_7_SONNET_20250219_V1_0"),
];

const MAX_TOOLS: usize = 50;
const MAX_DESCRIPTION_CHARS: usize = 500;

const CONTINUE: &str = "Continue";
const ACKNOWLEDGED: &str = "I understand.";
const TOOL_RESULTS_PROVIDED: &str = "Tool results provided.";

/// Maps a model id to the endpoint's own id. Ids that already are proprietary pass through.
pub(crate) fn proprietary_model(model: &str) -> &str {
    if let Some((_, mapped)) = MODEL_TABLE.iter().find(|(name, _)| *name == model) {
        return mapped;
    }

    if MODEL_TABLE.iter().any(|(_, mapped)| *mapped == model) {
        return model;
    }

    log::debug!("Model {model} has no proprietary counterpart, using {DEFAULT_MODEL}");

    DEFAULT_MODEL
}

/// One conversation turn, flattened.
#[derive(Debug, Default)]
struct Turn {
    text: String,
    images: Vec<Image>,
    tool_results: Vec<ToolResult>,
    tool_uses: Vec<ToolUse>,
}

impl Turn {
    fn user_content(&self) -> String {
        if !self.text.is_empty() {
            self.text.clone()
        } else if !self.tool_results.is_empty() {
            TOOL_RESULTS_PROVIDED.to_string()
        } else {
            CONTINUE.to_string()
        }
    }

    fn into_user_message(self, model_id: &str) -> UserInputMessage {
        let content = self.user_content();

        let context = UserInputMessageContext {
            tools: Vec::new(),
            tool_results: self.tool_results,
        };

        UserInputMessage {
            content,
            model_id: model_id.to_string(),
            origin: Origin::AiEditor,
            images: self.images,
            user_input_message_context: (!context.is_empty()).then_some(context),
        }
    }
}

pub(crate) fn to_codewhisperer(
    request: UnifiedChatRequest,
    profile_arn: Option<String>,
) -> crate::Result<CodeWhispererRequest> {
    if request.messages.is_empty() {
        return Err(LlmError::InvalidRequest("messages must not be empty".to_string()));
    }

    let model_id = proprietary_model(&request.model).to_string();

    let mut turns: Vec<(Role, Turn)> = request
        .messages
        .into_iter()
        .map(|message| (message.role, convert_message(message)))
        .collect();

    if let Some(system) = request.system.map(|system| system.to_text()).filter(|text| !text.is_empty()) {
        match turns.first_mut() {
            Some((Role::User, turn)) if turn.text.is_empty() => turn.text = system,
            Some((Role::User, turn)) => turn.text = format!("{system}\n\n{}", turn.text),
            _ => turns.insert(
                0,
                (
                    Role::User,
                    Turn {
                        text: system,
                        ..Default::default()
                    },
                ),
            ),
        }
    }

    let current = match turns.last() {
        Some((Role::User, _)) => turns.pop().map(|(_, turn)| turn).unwrap_or_default(),
        _ => Turn::default(),
    };

    let history = build_history(turns, &model_id);

    let mut current = current.into_user_message(&model_id);

    let tools = convert_tools(request.tools.unwrap_or_default());

    if !tools.is_empty() {
        current
            .user_input_message_context
            .get_or_insert_with(Default::default)
            .tools = tools;
    }

    Ok(CodeWhispererRequest {
        conversation_state: ConversationState {
            chat_trigger_type: ChatTriggerType::Manual,
            conversation_id: uuid::Uuid::new_v4().to_string(),
            current_message: CurrentMessage {
                user_input_message: current,
            },
            history,
        },
        profile_arn,
    })
}

fn convert_message(message: UnifiedMessage) -> Turn {
    let blocks = match message.content {
        MessageContent::Text(text) => {
            return Turn {
                text,
                ..Default::default()
            };
        }
        MessageContent::Blocks(blocks) => blocks,
    };

    let mut turn = Turn::default();
    let mut texts = Vec::new();

    for block in blocks {
        match block {
            ContentBlock::Text { text } => texts.push(text),
            ContentBlock::Image { source } => match source {
                ImageSource::Base64 { media_type, data } => turn.images.push(Image {
                    format: media_type.strip_prefix("image/").unwrap_or(&media_type).to_string(),
                    source: ImageBytes { bytes: data },
                }),
                ImageSource::Url { url } => log::warn!("Dropping image {url}: only inline images are supported"),
            },
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => {
                if turn.tool_results.iter().any(|result| result.tool_use_id == tool_use_id) {
                    log::debug!("Dropping duplicate result for tool call {tool_use_id}");
                    continue;
                }

                turn.tool_results.push(ToolResult {
                    tool_use_id,
                    status: if is_error.unwrap_or(false) {
                        ToolResultStatus::Error
                    } else {
                        ToolResultStatus::Success
                    },
                    content: vec![TextContent {
                        text: content.map(|content| content.to_text()).unwrap_or_default(),
                    }],
                });
            }
            ContentBlock::ToolUse { id, name, input, .. } => turn.tool_uses.push(ToolUse {
                tool_use_id: id,
                name,
                input,
            }),
            ContentBlock::Thinking { .. } | ContentBlock::ServerToolUse { .. } | ContentBlock::WebSearchToolResult { .. } => {
                log::debug!("Dropping content block the assistant endpoint does not accept");
            }
        }
    }

    turn.text = texts.join("\n");
    turn
}

/// Builds a history that strictly alternates user and assistant turns, starting
/// with a user turn and ending with an assistant turn.
fn build_history(turns: Vec<(Role, Turn)>, model_id: &str) -> Vec<HistoryItem> {
    let mut history: Vec<HistoryItem> = Vec::new();

    for (role, turn) in turns {
        match role {
            Role::User => {
                if let Some(HistoryItem::User(previous)) = history.last_mut() {
                    if !turn.tool_results.is_empty() {
                        merge_user_turn(&mut previous.user_input_message, turn);
                        continue;
                    }

                    history.push(acknowledgement());
                }

                history.push(HistoryItem::User(UserHistoryItem {
                    user_input_message: turn.into_user_message(model_id),
                }));
            }
            Role::Assistant => {
                if matches!(history.last(), None | Some(HistoryItem::Assistant(_))) {
                    history.push(continuation(model_id));
                }

                let content = if turn.text.is_empty() {
                    ACKNOWLEDGED.to_string()
                } else {
                    turn.text
                };

                history.push(HistoryItem::Assistant(AssistantHistoryItem {
                    assistant_response_message: AssistantResponseMessage {
                        content,
                        tool_uses: turn.tool_uses,
                    },
                }));
            }
        }
    }

    if let Some(HistoryItem::User(_)) = history.last() {
        history.push(acknowledgement());
    }

    history
}

fn merge_user_turn(previous: &mut UserInputMessage, turn: Turn) {
    if !turn.text.is_empty() {
        previous.content = format!("{}\n\n{}", previous.content, turn.text);
    }

    previous.images.extend(turn.images);

    let context = previous.user_input_message_context.get_or_insert_with(Default::default);

    for result in turn.tool_results {
        if !context.tool_results.iter().any(|known| known.tool_use_id == result.tool_use_id) {
            context.tool_results.push(result);
        }
    }
}

fn acknowledgement() -> HistoryItem {
    HistoryItem::Assistant(AssistantHistoryItem {
        assistant_response_message: AssistantResponseMessage {
            content: ACKNOWLEDGED.to_string(),
            tool_uses: Vec::new(),
        },
    })
}

fn continuation(model_id: &str) -> HistoryItem {
    HistoryItem::User(UserHistoryItem {
        user_input_message: Turn::default().into_user_message(model_id),
    })
}

fn convert_tools(tools: Vec<UnifiedTool>) -> Vec<ToolItem> {
    if tools.len() > MAX_TOOLS {
        log::warn!("Request defines {} tools, only the first {MAX_TOOLS} are sent", tools.len());
    }

    tools
        .into_iter()
        .take(MAX_TOOLS)
        .map(|tool| {
            let description = tool
                .description
                .filter(|description| !description.is_empty())
                .unwrap_or_else(|| format!("Tool: {}", tool.name));

            ToolItem {
                tool_specification: ToolSpecification {
                    name: tool.name,
                    description: truncate_description(description),
                    input_schema: InputSchema { json: tool.input_schema },
                },
            }
        })
        .collect()
}

fn truncate_description(description: String) -> String {
    if description.chars().count() <= MAX_DESCRIPTION_CHARS {
        return description;
    }

    let truncated: String = description.chars().take(MAX_DESCRIPTION_CHARS - 3).collect();
    format!("{truncated}...")
}
