//! Tests for the provider abstraction as seen from outside the crate:
//! message types, error display, the mock double and the factory.

use std::sync::Arc;

use ar_core::config::{ProviderConfig, ProviderKind};
use ar_intelligence::llm::{
    build_provider, LlmConfig, LlmError, LlmMessage, LlmProvider, LlmResponse, LlmRole,
    MockProvider,
};
use futures_util::StreamExt;

// ===========================================================================
// Messages
// ===========================================================================

#[test]
fn test_llm_message_constructors() {
    assert_eq!(LlmMessage::system("s").role, LlmRole::System);
    assert_eq!(LlmMessage::user("u").role, LlmRole::User);
    assert_eq!(LlmMessage::assistant("a").role, LlmRole::Assistant);
    assert_eq!(LlmMessage::new(LlmRole::User, "x").content, "x");
}

#[test]
fn test_llm_role_wire_names() {
    assert_eq!(serde_json::to_string(&LlmRole::System).unwrap(), "\"system\"");
    assert_eq!(LlmRole::Assistant.to_string(), "assistant");
    let role: LlmRole = serde_json::from_str("\"user\"").unwrap();
    assert_eq!(role, LlmRole::User);
}

// ===========================================================================
// Errors
// ===========================================================================

#[test]
fn test_error_display_messages() {
    let e = LlmError::ApiError {
        status: 400,
        message: "bad request".into(),
    };
    assert!(e.to_string().contains("400"));
    assert!(e.to_string().contains("bad request"));

    let e = LlmError::RateLimited {
        retry_after_secs: Some(30),
    };
    assert!(e.to_string().contains("30"));

    assert!(LlmError::Timeout.to_string().contains("timed out"));
    assert!(LlmError::MissingApiKey("OPENAI_API_KEY".into())
        .to_string()
        .contains("OPENAI_API_KEY"));
}

// ===========================================================================
// MockProvider
// ===========================================================================

#[tokio::test]
async fn test_mock_captures_full_conversation() {
    let provider = MockProvider::new().with_text("ok");
    let config = LlmConfig::default();
    let messages = vec![
        LlmMessage::system("You are helpful"),
        LlmMessage::assistant("earlier"),
        LlmMessage::user("Hello"),
    ];

    let resp = provider.complete(&messages, &config).await.unwrap();
    assert_eq!(resp.content, "ok");

    let captured = provider.captured_requests();
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].0, messages);
    assert_eq!(captured[0].1.model, "gpt-4o-mini");
}

#[tokio::test]
async fn test_mock_as_shared_trait_object() {
    let mock = Arc::new(
        MockProvider::new().with_response(LlmResponse {
            content: "shared".into(),
            model: "m".into(),
            input_tokens: 1,
            output_tokens: 2,
            finish_reason: "stop".into(),
        }),
    );
    let provider: Arc<dyn LlmProvider> = mock.clone();

    let resp = provider
        .complete(&[LlmMessage::user("x")], &LlmConfig::default())
        .await
        .unwrap();
    assert_eq!(resp.content, "shared");
    assert_eq!(mock.request_count(), 1);
}

#[tokio::test]
async fn test_mock_stream_surfaces_mid_stream_error() {
    let provider = MockProvider::new().with_stream_items(vec![
        Ok("partial ".into()),
        Err(LlmError::HttpError("connection reset".into())),
    ]);
    let mut stream = provider
        .stream(&[LlmMessage::user("go")], &LlmConfig::default())
        .await
        .unwrap();

    assert_eq!(stream.next().await.unwrap().unwrap(), "partial ");
    assert!(matches!(
        stream.next().await,
        Some(Err(LlmError::HttpError(_)))
    ));
    assert!(stream.next().await.is_none());
}

// ===========================================================================
// Factory
// ===========================================================================

#[test]
fn test_build_provider_anthropic_without_key_fails() {
    let cfg = ProviderConfig {
        kind: ProviderKind::Anthropic,
        api_key_env: Some("AR_ANTHROPIC_KEY_FOR_TESTS_UNSET".into()),
        ..ProviderConfig::default()
    };
    assert!(matches!(
        build_provider(&cfg),
        Err(LlmError::MissingApiKey(_))
    ));
}
