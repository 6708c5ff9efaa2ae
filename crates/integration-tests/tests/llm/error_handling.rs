use axum::http::StatusCode;
use indoc::{formatdoc, indoc};
use integration_tests::{MockReply, MockUpstream, request, upstream};
use llm::LlmError;
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

#[tokio::test]
async fn invalid_api_key() {
    let reply = json!({
        "error": {
            "message": "Incorrect API key provided: sk-test.",
            "type": "invalid_request_error",
            "param": null,
            "code": "invalid_api_key"
        }
    });

    let mock = MockUpstream::start(MockReply::Json(StatusCode::UNAUTHORIZED, reply)).await;
    let error = upstream(&config(&mock.url())).completion(hello(), None).await.unwrap_err();

    assert_eq!(error.status_code(), StatusCode::UNAUTHORIZED);

    insta::assert_json_snapshot!(error.to_unified(), @r#"
    {
      "type": "error",
      "error": {
        "type": "authentication_error",
        "message": "Incorrect API key provided: sk-test."
      }
    }
    "#);
}

#[tokio::test]
async fn overloaded_without_type() {
    let reply = json!({"error": {"message": "The server is overloaded, try again later."}});

    let mock = MockUpstream::start(MockReply::Json(StatusCode::SERVICE_UNAVAILABLE, reply)).await;
    let error = upstream(&config(&mock.url())).completion(hello(), None).await.unwrap_err();

    assert_eq!(error.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(error.error_type(), "overloaded_error");
}

#[tokio::test]
async fn html_error_page() {
    let mock = MockUpstream::start(MockReply::Text(
        StatusCode::BAD_GATEWAY,
        "<html><body>upstream connect error</body></html>".to_string(),
    ))
    .await;

    let error = upstream(&config(&mock.url())).completion(hello(), None).await.unwrap_err();

    assert_eq!(error.status_code(), StatusCode::BAD_GATEWAY);

    insta::assert_json_snapshot!(error.to_unified(), @r#"
    {
      "type": "error",
      "error": {
        "type": "api_error",
        "message": "502 Bad Gateway"
      }
    }
    "#);
}

#[tokio::test]
async fn malformed_success_body() {
    let mock = MockUpstream::start(MockReply::Text(StatusCode::OK, "this is not json".to_string())).await;
    let error = upstream(&config(&mock.url())).completion(hello(), None).await.unwrap_err();

    assert!(matches!(error, LlmError::UpstreamParse(_)));
    assert_eq!(error.status_code(), StatusCode::BAD_GATEWAY);
    assert_eq!(error.error_type(), "api_error");
}

#[tokio::test]
async fn missing_credential() {
    let config = indoc! {r#"
        [providers.openai]
        base_url = "http://127.0.0.1:9"
    "#};

    let error = upstream(config).completion(hello(), None).await.unwrap_err();

    assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);

    insta::assert_json_snapshot!(error.to_unified(), @r#"
    {
      "type": "error",
      "error": {
        "type": "invalid_request_error",
        "message": "Missing credential: provider 'openai' has no api_key and the request carried none"
      }
    }
    "#);
}

#[tokio::test]
async fn empty_messages_are_rejected_before_sending() {
    let mock = MockUpstream::start(MockReply::ok(json!({}))).await;

    let error = upstream(&config(&mock.url()))
        .completion(request(json!({"model": "gpt-4o", "messages": []})), None)
        .await
        .unwrap_err();

    assert!(matches!(error, LlmError::InvalidRequest(_)));
    assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
    assert!(mock.requests().is_empty());
}
