use indoc::formatdoc;
use integration_tests::{MockReply, MockUpstream, request, upstream};
use llm::{ContentBlock, StopReason};
use serde_json::json;

fn config(url: &str) -> String {
    formatdoc! {r#"
        [providers.gemini]
        type = "gemini"
        base_url = "{url}"
        api_key = "gemini-key"
    "#}
}

#[tokio::test]
async fn thinking_config_travels_in_extra_body() {
    let mock = MockUpstream::start(MockReply::ok(json!({
        "choices": [{"message": {"content": "42"}, "finish_reason": "stop"}]
    })))
    .await;

    let upstream = upstream(&config(&mock.url()));

    let request = request(json!({
        "model": "gemini-2.5-pro",
        "thinking": {"type": "enabled", "budget_tokens": 8192},
        "messages": [{"role": "user", "content": "What is six times seven?"}]
    }));

    upstream.completion(request, None).await.unwrap();

    let received = mock.request();

    assert_eq!(received.uri, "/v1beta/openai/chat/completions");
    assert_eq!(received.headers["authorization"], "Bearer gemini-key");
    assert!(received.body.get("reasoning_effort").is_none());

    insta::assert_json_snapshot!(received.body["extra_body"], @r#"
    {
      "google": {
        "thinking_config": {
          "thinking_budget": 8192,
          "include_thoughts": true
        }
      }
    }
    "#);
}

#[tokio::test]
async fn thought_signature_round_trip() {
    let mock = MockUpstream::start(MockReply::ok(json!({
        "choices": [{
            "message": {
                "reasoning_content": "The user wants the weather.",
                "tool_calls": [{
                    "id": "function-call-1",
                    "type": "function",
                    "function": {"name": "get_weather", "arguments": "{\"city\":\"Bergen\"}"},
                    "extra_content": {"google": {"thought_signature": "CiQBVKhc7w=="}}
                }]
            },
            "finish_reason": "tool_calls"
        }]
    })))
    .await;

    let upstream = upstream(&config(&mock.url()));

    let first = request(json!({
        "model": "gemini-2.5-flash",
        "messages": [{"role": "user", "content": "Weather in Bergen?"}]
    }));

    let response = upstream.completion(first, None).await.unwrap();

    assert_eq!(response.stop_reason, Some(StopReason::ToolUse));

    assert_eq!(
        response.content,
        vec![
            ContentBlock::Thinking {
                thinking: "The user wants the weather.".to_string(),
                signature: Some("CiQBVKhc7w==".to_string()),
            },
            ContentBlock::ToolUse {
                id: "function-call-1".to_string(),
                name: "get_weather".to_string(),
                input: json!({"city": "Bergen"}),
                signature: Some("CiQBVKhc7w==".to_string()),
            },
        ]
    );

    // The assistant turn goes back upstream with the tool result.
    let second = request(json!({
        "model": "gemini-2.5-flash",
        "messages": [
            {"role": "user", "content": "Weather in Bergen?"},
            {"role": "assistant", "content": response.content},
            {"role": "user", "content": [
                {"type": "tool_result", "tool_use_id": "function-call-1", "content": [{"type": "text", "text": "Rain"}]}
            ]}
        ]
    }));

    upstream.completion(second, None).await.unwrap();

    let requests = mock.requests();
    assert_eq!(requests.len(), 2);

    let messages = &requests[1].body["messages"];

    insta::assert_json_snapshot!(messages, @r#"
    [
      {
        "role": "user",
        "content": "Weather in Bergen?"
      },
      {
        "role": "assistant",
        "reasoning_content": "The user wants the weather.",
        "tool_calls": [
          {
            "id": "function-call-1",
            "type": "function",
            "function": {
              "name": "get_weather",
              "arguments": "{\"city\":\"Bergen\"}"
            },
            "extra_content": {
              "google": {
                "thought_signature": "CiQBVKhc7w=="
              }
            }
          }
        ]
      },
      {
        "role": "tool",
        "content": "Rain",
        "tool_call_id": "function-call-1"
      }
    ]
    "#);
}

#[tokio::test]
async fn quota_errors_keep_their_status() {
    let reply = json!([{
        "error": {
            "code": 429,
            "message": "Resource has been exhausted (e.g. check quota).",
            "status": "RESOURCE_EXHAUSTED"
        }
    }]);

    let mock = MockUpstream::start(MockReply::Json(axum::http::StatusCode::TOO_MANY_REQUESTS, reply)).await;
    let upstream = upstream(&config(&mock.url()));

    let error = upstream
        .completion(
            request(json!({"model": "gemini-2.5-pro", "messages": [{"role": "user", "content": "hi"}]})),
            None,
        )
        .await
        .unwrap_err();

    assert_eq!(error.status_code().as_u16(), 429);

    insta::assert_json_snapshot!(error.to_unified(), @r#"
    {
      "type": "error",
      "error": {
        "type": "rate_limit_error",
        "message": "Resource has been exhausted (e.g. check quota)."
      }
    }
    "#);
}
