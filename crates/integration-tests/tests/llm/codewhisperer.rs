use indoc::formatdoc;
use integration_tests::{MockReply, MockUpstream, collect_events, request, upstream};
use llm::{ContentBlock, StopReason, StreamEvent, messages::unified::BlockDelta};
use serde_json::json;

const PROFILE_ARN: &str = "arn:aws:codewhisperer:us-east-1:123456789012:profile/EXAMPLE";

fn config(url: &str) -> String {
    formatdoc! {r#"
        [providers.assistant]
        type = "codewhisperer"
        base_url = "{url}"
        api_key = "bearer-token"
        profile_arn = "{PROFILE_ARN}"

        [providers.assistant.models.sonnet]
        rename = "claude-sonnet-4-5"
    "#}
}

/// Wraps a JSON payload in binary framing: prelude, headers and a trailing checksum.
fn frame(payload: &str) -> Vec<u8> {
    let mut frame = vec![0x00, 0x00, 0x00, 0x9a, 0x00, 0x00, 0x00, 0x4b, 0x8e, 0x21, 0x03, 0xd7];
    frame.extend_from_slice(b"\x0b:event-type\x07\x00\x16assistantResponseEvent");
    frame.extend_from_slice(payload.as_bytes());
    frame.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
    frame
}

fn body() -> Vec<Vec<u8>> {
    let mut tool = frame(r#"{"name":"get_weather","toolUseId":"tooluse_Xy7"}"#);
    tool.extend(frame(r#"{"input":"{\"city\":","name":"get_weather","toolUseId":"tooluse_Xy7"}"#));

    let mut split = frame(r#"{"input":"\"Tromsø\"}","name":"get_weather","toolUseId":"tooluse_Xy7"}"#);
    let tail = split.split_off(60);

    let mut end = tail;
    end.extend(frame(r#"{"name":"get_weather","stop":true,"toolUseId":"tooluse_Xy7"}"#));
    end.extend(frame(r#"{"usage":{"inputTokens":310,"outputTokens":27}}"#));

    vec![
        frame(r#"{"content":"Checking the "}"#),
        frame(r#"{"content":"forecast."}"#),
        tool,
        split,
        end,
    ]
}

#[tokio::test]
async fn request_shape() {
    let mock = MockUpstream::start(MockReply::Chunks(vec![frame(r#"{"content":"Hi!"}"#)])).await;
    let upstream = upstream(&config(&mock.url()));

    let request = request(json!({
        "model": "sonnet",
        "system": "You are a weather bot.",
        "tools": [{
            "name": "get_weather",
            "description": "Current weather",
            "input_schema": {"type": "object", "properties": {"city": {"type": "string"}}}
        }],
        "messages": [
            {"role": "assistant", "content": "Hello, ask me about the weather."},
            {"role": "user", "content": "Weather in Tromsø?"}
        ]
    }));

    let response = upstream.completion(request, None).await.unwrap();

    assert_eq!(response.content, vec![ContentBlock::text("Hi!")]);
    assert_eq!(response.model, "sonnet");

    let received = mock.request();

    assert_eq!(received.uri, "/generateAssistantResponse");
    assert_eq!(received.headers["authorization"], "Bearer bearer-token");

    insta::assert_json_snapshot!(received.body, {
        ".conversationState.conversationId" => "[uuid]"
    }, @r#"
    {
      "conversationState": {
        "chatTriggerType": "MANUAL",
        "conversationId": "[uuid]",
        "currentMessage": {
          "userInputMessage": {
            "content": "Weather in Tromsø?",
            "modelId": "CLAUDE_SONNET_4_5_20250929_V1_0",
            "origin": "AI_EDITOR",
            "userInputMessageContext": {
              "tools": [
                {
                  "toolSpecification": {
                    "name": "get_weather",
                    "description": "Current weather",
                    "inputSchema": {
                      "json": {
                        "type": "object",
                        "properties": {
                          "city": {
                            "type": "string"
                          }
                        }
                      }
                    }
                  }
                }
              ]
            }
          }
        },
        "history": [
          {
            "userInputMessage": {
              "content": "You are a weather bot.",
              "modelId": "CLAUDE_SONNET_4_5_20250929_V1_0",
              "origin": "AI_EDITOR"
            }
          },
          {
            "assistantResponseMessage": {
              "content": "Hello, ask me about the weather."
            }
          }
        ]
      },
      "profileArn": "arn:aws:codewhisperer:us-east-1:123456789012:profile/EXAMPLE"
    }
    "#);
}

#[tokio::test]
async fn streamed_text_and_tool_call() {
    let mock = MockUpstream::start(MockReply::Chunks(body())).await;
    let upstream = upstream(&config(&mock.url()));

    let stream = upstream
        .completion_stream(
            request(json!({"model": "sonnet", "messages": [{"role": "user", "content": "Weather in Tromsø?"}]})),
            None,
        )
        .await
        .unwrap();

    let events = collect_events(stream).await;

    let StreamEvent::MessageStart { message } = &events[0] else {
        unreachable!("stream must open with message_start, got {:?}", events[0]);
    };

    assert_eq!(message.model, "sonnet");

    let text: String = events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::ContentBlockDelta {
                delta: BlockDelta::TextDelta { text },
                ..
            } => Some(text.as_str()),
            _ => None,
        })
        .collect();

    assert_eq!(text, "Checking the forecast.");

    let arguments: String = events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::ContentBlockDelta {
                index: 1,
                delta: BlockDelta::InputJsonDelta { partial_json },
            } => Some(partial_json.as_str()),
            _ => None,
        })
        .collect();

    assert_eq!(arguments, r#"{"city":"Tromsø"}"#);

    let tool_start = events.iter().find_map(|event| match event {
        StreamEvent::ContentBlockStart {
            index: 1,
            content_block: ContentBlock::ToolUse { id, name, .. },
        } => Some((id.as_str(), name.as_str())),
        _ => None,
    });

    assert_eq!(tool_start, Some(("tooluse_Xy7", "get_weather")));

    let tail = &events[events.len() - 2..];

    insta::assert_json_snapshot!(tail, @r#"
    [
      {
        "type": "message_delta",
        "delta": {
          "stop_reason": "tool_use",
          "stop_sequence": null
        },
        "usage": {
          "input_tokens": 310,
          "output_tokens": 27
        }
      },
      {
        "type": "message_stop"
      }
    ]
    "#);
}

#[tokio::test]
async fn full_body_with_tool_call() {
    let mock = MockUpstream::start(MockReply::Chunks(body())).await;
    let upstream = upstream(&config(&mock.url()));

    let response = upstream
        .completion(
            request(json!({"model": "sonnet", "messages": [{"role": "user", "content": "Weather in Tromsø?"}]})),
            None,
        )
        .await
        .unwrap();

    assert_eq!(response.stop_reason, Some(StopReason::ToolUse));
    assert_eq!(response.usage.input_tokens, 310);
    assert_eq!(response.usage.output_tokens, 27);

    assert_eq!(
        response.content,
        vec![
            ContentBlock::text("Checking the forecast."),
            ContentBlock::ToolUse {
                id: "tooluse_Xy7".to_string(),
                name: "get_weather".to_string(),
                input: json!({"city": "Tromsø"}),
                signature: None,
            },
        ]
    );
}
