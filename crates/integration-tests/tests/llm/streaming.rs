use indoc::formatdoc;
use integration_tests::{MockReply, MockUpstream, collect_events, collect_results, request, upstream};
use llm::{ContentBlock, StopReason, StreamEvent, messages::unified::BlockDelta};
use serde_json::json;

fn config(url: &str) -> String {
    formatdoc! {r#"
        [providers.openai]
        base_url = "{url}"
        api_key = "sk-test"
    "#}
}

fn hello() -> llm::UnifiedChatRequest {
    request(json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "hi"}]}))
}

fn stop_reason(events: &[StreamEvent]) -> Option<StopReason> {
    events.iter().find_map(|event| match event {
        StreamEvent::MessageDelta { delta, .. } => delta.stop_reason.clone(),
        _ => None,
    })
}

#[tokio::test]
async fn text_stream() {
    let mock = MockUpstream::start(MockReply::sse([
        json!({"choices": [{"index": 0, "delta": {"role": "assistant"}}]}),
        json!({"choices": [{"index": 0, "delta": {"content": "hi there"}}]}),
        json!({"choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]}),
    ]))
    .await;

    let upstream = upstream(&config(&mock.url()));
    let events = collect_events(upstream.completion_stream(hello(), None).await.unwrap()).await;

    insta::assert_json_snapshot!(events, {
        "[0].message.id" => "[id]"
    }, @r#"
    [
      {
        "type": "message_start",
        "message": {
          "id": "[id]",
          "type": "message",
          "role": "assistant",
          "content": [],
          "model": "gpt-4o",
          "stop_reason": null,
          "stop_sequence": null,
          "usage": {
            "input_tokens": 0,
            "output_tokens": 0
          }
        }
      },
      {
        "type": "ping"
      },
      {
        "type": "content_block_start",
        "index": 0,
        "content_block": {
          "type": "text",
          "text": ""
        }
      },
      {
        "type": "content_block_delta",
        "index": 0,
        "delta": {
          "type": "text_delta",
          "text": "hi there"
        }
      },
      {
        "type": "content_block_stop",
        "index": 0
      },
      {
        "type": "message_delta",
        "delta": {
          "stop_reason": "end_turn",
          "stop_sequence": null
        },
        "usage": {
          "input_tokens": 0,
          "output_tokens": 0
        }
      },
      {
        "type": "message_stop"
      }
    ]
    "#);

    let received = mock.request();

    assert_eq!(received.body["stream"], true);
    assert_eq!(received.body["stream_options"], json!({"include_usage": true}));
}

#[tokio::test]
async fn fragmented_tool_calls() {
    let mock = MockUpstream::start(MockReply::sse([
        json!({"choices": [{"delta": {"content": "Looking up both."}}]}),
        json!({"choices": [{"delta": {"tool_calls": [
            {"index": 0, "id": "call_a", "type": "function", "function": {"name": "get_weather", "arguments": ""}}
        ]}}]}),
        json!({"choices": [{"delta": {"tool_calls": [{"index": 0, "function": {"arguments": "{\"city\":"}}]}}]}),
        json!({"choices": [{"delta": {"tool_calls": [{"index": 0, "function": {"arguments": "\"Oslo\"}"}}]}}]}),
        json!({"choices": [{"delta": {"tool_calls": [
            {"index": 1, "id": "call_b", "type": "function", "function": {"name": "get_time", "arguments": "{\"tz\":\"CET\"}"}}
        ]}}]}),
        json!({"choices": [{"delta": {}, "finish_reason": "tool_calls"}]}),
        json!({"choices": [], "usage": {"prompt_tokens": 50, "completion_tokens": 22}}),
    ]))
    .await;

    let upstream = upstream(&config(&mock.url()));
    let events = collect_events(upstream.completion_stream(hello(), None).await.unwrap()).await;

    let blocks: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::ContentBlockStart { index, content_block } => Some((*index, content_block.clone())),
            _ => None,
        })
        .collect();

    assert_eq!(
        blocks,
        vec![
            (0, ContentBlock::text("")),
            (
                1,
                ContentBlock::ToolUse {
                    id: "call_a".to_string(),
                    name: "get_weather".to_string(),
                    input: json!({}),
                    signature: None,
                }
            ),
            (
                2,
                ContentBlock::ToolUse {
                    id: "call_b".to_string(),
                    name: "get_time".to_string(),
                    input: json!({}),
                    signature: None,
                }
            ),
        ]
    );

    let arguments = |block: u32| -> String {
        events
            .iter()
            .filter_map(|event| match event {
                StreamEvent::ContentBlockDelta {
                    index,
                    delta: BlockDelta::InputJsonDelta { partial_json },
                } if *index == block => Some(partial_json.as_str()),
                _ => None,
            })
            .collect()
    };

    assert_eq!(arguments(1), r#"{"city":"Oslo"}"#);
    assert_eq!(arguments(2), r#"{"tz":"CET"}"#);

    // Every opened block is closed, in order, before the message ends.
    let stops: Vec<u32> = events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::ContentBlockStop { index } => Some(*index),
            _ => None,
        })
        .collect();

    assert_eq!(stops, [0, 1, 2]);
    assert_eq!(stop_reason(&events), Some(StopReason::ToolUse));

    let usage = events.iter().find_map(|event| match event {
        StreamEvent::MessageDelta { usage, .. } => Some(usage.clone()),
        _ => None,
    });

    let usage = usage.unwrap();
    assert_eq!((usage.input_tokens, usage.output_tokens), (50, 22));

    assert!(matches!(events.last(), Some(StreamEvent::MessageStop)));
}

#[tokio::test]
async fn malformed_chunks_are_skipped() {
    let mock = MockUpstream::start(MockReply::sse([
        json!({"choices": [{"delta": {"content": "one "}}]}).to_string(),
        "{not json".to_string(),
        json!({"choices": [{"delta": {"content": "two"}}]}).to_string(),
        json!({"choices": [{"delta": {}, "finish_reason": "length"}]}).to_string(),
    ]))
    .await;

    let upstream = upstream(&config(&mock.url()));
    let results = collect_results(upstream.completion_stream(hello(), None).await.unwrap()).await;

    assert!(results.iter().all(Result::is_ok));

    let events: Vec<StreamEvent> = results.into_iter().flatten().collect();

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

    assert_eq!(text, "one two");
    assert_eq!(stop_reason(&events), Some(StopReason::MaxTokens));
}

#[tokio::test]
async fn stream_without_done_is_still_finalized() {
    let mock = MockUpstream::start(MockReply::Sse(vec![
        json!({"choices": [{"delta": {"content": "cut short"}}]}).to_string(),
    ]))
    .await;

    let upstream = upstream(&config(&mock.url()));
    let events = collect_events(upstream.completion_stream(hello(), None).await.unwrap()).await;

    let types: Vec<&str> = events.iter().map(StreamEvent::event_type).collect();

    assert_eq!(
        types,
        [
            "message_start",
            "ping",
            "content_block_start",
            "content_block_delta",
            "content_block_stop",
            "message_delta",
            "message_stop"
        ]
    );

    assert_eq!(stop_reason(&events), Some(StopReason::EndTurn));
}

#[tokio::test]
async fn streaming_errors_are_returned_before_any_event() {
    let reply = json!({"error": {"message": "The model `gpt-5o` does not exist", "code": "model_not_found"}});
    let mock = MockUpstream::start(MockReply::Json(axum::http::StatusCode::NOT_FOUND, reply)).await;

    let upstream = upstream(&config(&mock.url()));

    let Err(error) = upstream.completion_stream(hello(), None).await else {
        unreachable!("a 404 must fail the request");
    };

    assert_eq!(error.status_code().as_u16(), 404);
    assert_eq!(error.error_type(), "not_found_error");
}
