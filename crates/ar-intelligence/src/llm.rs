//! Completion provider abstraction layer.
//!
//! A single async trait covers blocking and streaming completion over a
//! structured conversation. Concrete providers speak the OpenAI Chat
//! Completions protocol (hosted or local servers) or the Anthropic Messages
//! API; [`MockProvider`] serves queued replies for tests.

use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use ar_core::config::{ProviderConfig, ProviderKind};
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Lazily produced text fragments of one completion.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum LlmError {
    /// Connection failure, DNS, TLS, or a broken response body.
    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("rate limited: retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("request timed out")]
    Timeout,

    /// The provider cannot perform the requested operation (e.g. streaming).
    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("missing API key: set {0}")]
    MissingApiKey(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::HttpError(err.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Core data types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for LlmRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmRole::System => write!(f, "system"),
            LlmRole::User => write!(f, "user"),
            LlmRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: LlmRole,
    pub content: String,
}

impl LlmMessage {
    pub fn new(role: LlmRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(LlmRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(LlmRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(LlmRole::Assistant, content)
    }
}

/// Per-request generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub system_prompt: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            max_tokens: 4000,
            temperature: 0.2,
            system_prompt: None,
        }
    }
}

impl From<&ProviderConfig> for LlmConfig {
    fn from(cfg: &ProviderConfig) -> Self {
        Self {
            model: cfg.model.clone(),
            max_tokens: cfg.max_tokens,
            temperature: cfg.temperature,
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub finish_reason: String,
}

impl LlmResponse {
    /// Response carrying only text, with zeroed usage.
    pub fn text(content: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: model.into(),
            input_tokens: 0,
            output_tokens: 0,
            finish_reason: "stop".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// LlmProvider trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a completion request and return the full response.
    async fn complete(
        &self,
        messages: &[LlmMessage],
        config: &LlmConfig,
    ) -> Result<LlmResponse, LlmError>;

    /// Stream a completion fragment by fragment. The stream is finite and
    /// cannot be restarted.
    ///
    /// Providers that do not support streaming return
    /// `Err(LlmError::Unsupported(...))`.
    async fn stream(
        &self,
        messages: &[LlmMessage],
        config: &LlmConfig,
    ) -> Result<TextStream, LlmError>;
}

/// Build the provider selected by `cfg`, resolving its API key from the
/// environment.
pub fn build_provider(cfg: &ProviderConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let missing = |default_var: &str| {
        LlmError::MissingApiKey(
            cfg.api_key_env
                .clone()
                .unwrap_or_else(|| default_var.to_string()),
        )
    };

    let provider: Arc<dyn LlmProvider> = match cfg.kind {
        ProviderKind::OpenAi => {
            let key = cfg.api_key().ok_or_else(|| missing("OPENAI_API_KEY"))?;
            let mut p = OpenAiProvider::new(key);
            if let Some(ref url) = cfg.base_url {
                p = p.with_base_url(url.clone());
            }
            Arc::new(p)
        }
        ProviderKind::Anthropic => {
            let key = cfg.api_key().ok_or_else(|| missing("ANTHROPIC_API_KEY"))?;
            let mut p = AnthropicProvider::new(key);
            if let Some(ref url) = cfg.base_url {
                p = p.with_base_url(url.clone());
            }
            Arc::new(p)
        }
        ProviderKind::Local => {
            let url = cfg
                .base_url
                .clone()
                .unwrap_or_else(|| "http://localhost:8000".to_string());
            Arc::new(LocalProvider::new(url, cfg.api_key()))
        }
    };
    debug!(kind = ?cfg.kind, model = %cfg.model, "completion provider ready");
    Ok(provider)
}

// ---------------------------------------------------------------------------
// Shared HTTP plumbing
// ---------------------------------------------------------------------------

/// Map 429 and other non-success statuses onto [`LlmError`].
async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = resp.status().as_u16();

    if status == 429 {
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        return Err(LlmError::RateLimited {
            retry_after_secs: retry_after,
        });
    }

    if !resp.status().is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(LlmError::ApiError {
            status,
            message: text,
        });
    }

    Ok(resp)
}

/// One parsed server-sent-events line of an OpenAI-style stream.
#[derive(Debug, PartialEq, Eq)]
enum SseLine {
    Delta(String),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }
    let Ok(value) = serde_json::from_str::<serde_json::Value>(data) else {
        return SseLine::Skip;
    };
    match value["choices"][0]["delta"]["content"].as_str() {
        Some(text) if !text.is_empty() => SseLine::Delta(text.to_string()),
        _ => SseLine::Skip,
    }
}

/// Turn an SSE response body into a [`TextStream`]. A reader task splits the
/// body into lines and relays content deltas over a channel until `[DONE]`,
/// end of body, or the consumer going away.
fn sse_text_stream(resp: reqwest::Response) -> TextStream {
    let (tx, rx) = flume::unbounded::<Result<String, LlmError>>();
    let mut body = resp.bytes_stream();

    tokio::spawn(async move {
        let mut buffer: Vec<u8> = Vec::new();
        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    let _ = tx.send_async(Err(LlmError::from(e))).await;
                    return;
                }
            };
            buffer.extend_from_slice(&chunk);

            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let raw: Vec<u8> = buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&raw);
                match parse_sse_line(line.trim()) {
                    SseLine::Delta(text) => {
                        if tx.send_async(Ok(text)).await.is_err() {
                            return;
                        }
                    }
                    SseLine::Done => return,
                    SseLine::Skip => {}
                }
            }
        }
    });

    Box::pin(rx.into_stream())
}

// ---------------------------------------------------------------------------
// AnthropicProvider
// ---------------------------------------------------------------------------

/// Provider for the Anthropic Messages API. Blocking completion only.
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.anthropic.com".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Build the JSON request body. System turns move to the top-level
    /// `system` field.
    pub fn build_request_body(messages: &[LlmMessage], config: &LlmConfig) -> serde_json::Value {
        let mut system_text: Option<String> = config.system_prompt.clone();

        let api_messages: Vec<serde_json::Value> = messages
            .iter()
            .filter_map(|msg| {
                if msg.role == LlmRole::System {
                    if let Some(ref mut s) = system_text {
                        s.push('\n');
                        s.push_str(&msg.content);
                    } else {
                        system_text = Some(msg.content.clone());
                    }
                    None
                } else {
                    Some(serde_json::json!({
                        "role": msg.role.to_string(),
                        "content": msg.content,
                    }))
                }
            })
            .collect();

        let mut body = serde_json::json!({
            "model": config.model,
            "max_tokens": config.max_tokens,
            "temperature": config.temperature,
            "messages": api_messages,
        });

        if let Some(system) = system_text {
            body["system"] = serde_json::Value::String(system);
        }

        body
    }
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    model: String,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Deserialize)]
struct AnthropicContentBlock {
    text: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(
        &self,
        messages: &[LlmMessage],
        config: &LlmConfig,
    ) -> Result<LlmResponse, LlmError> {
        let body = Self::build_request_body(messages, config);
        let url = format!("{}/v1/messages", self.base_url);

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;
        let resp = check_status(resp).await?;

        let api_resp: AnthropicResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::ParseError(e.to_string()))?;

        let content = api_resp
            .content
            .iter()
            .filter_map(|block| block.text.as_deref())
            .collect::<String>();

        Ok(LlmResponse {
            content,
            model: api_resp.model,
            input_tokens: api_resp.usage.input_tokens,
            output_tokens: api_resp.usage.output_tokens,
            finish_reason: api_resp.stop_reason.unwrap_or_else(|| "unknown".into()),
        })
    }

    async fn stream(
        &self,
        _messages: &[LlmMessage],
        _config: &LlmConfig,
    ) -> Result<TextStream, LlmError> {
        Err(LlmError::Unsupported(
            "streaming not implemented for AnthropicProvider".into(),
        ))
    }
}

// ---------------------------------------------------------------------------
// OpenAiProvider
// ---------------------------------------------------------------------------

/// Provider for the OpenAI Chat Completions API.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.openai.com".to_string(),
        }
    }

    /// Override the base URL (Azure OpenAI, proxies, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Build the JSON request body. System turns stay inline; a configured
    /// system prompt is prepended.
    pub fn build_request_body(messages: &[LlmMessage], config: &LlmConfig) -> serde_json::Value {
        let mut api_messages: Vec<serde_json::Value> = Vec::with_capacity(messages.len() + 1);

        if let Some(ref system) = config.system_prompt {
            api_messages.push(serde_json::json!({
                "role": "system",
                "content": system,
            }));
        }

        api_messages.extend(messages.iter().map(|msg| {
            serde_json::json!({
                "role": msg.role.to_string(),
                "content": msg.content,
            })
        }));

        serde_json::json!({
            "model": config.model,
            "max_tokens": config.max_tokens,
            "temperature": config.temperature,
            "messages": api_messages,
        })
    }

    /// Same body with `"stream": true`.
    pub fn build_stream_body(messages: &[LlmMessage], config: &LlmConfig) -> serde_json::Value {
        let mut body = Self::build_request_body(messages, config);
        body["stream"] = serde_json::Value::Bool(true);
        body
    }

    fn request(&self, body: &serde_json::Value) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
    }
}

/// Chat Completions response. Local servers often omit `model` and `usage`.
#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    model: Option<String>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResp,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatMessageResp {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
}

impl ChatCompletionResponse {
    fn into_response(self, requested_model: &str) -> Result<LlmResponse, LlmError> {
        let usage = self.usage.as_ref();
        let input_tokens = usage.and_then(|u| u.prompt_tokens).unwrap_or(0);
        let output_tokens = usage.and_then(|u| u.completion_tokens).unwrap_or(0);
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::ParseError("no choices in response".into()))?;

        Ok(LlmResponse {
            content: choice.message.content.unwrap_or_default(),
            model: self.model.unwrap_or_else(|| requested_model.to_string()),
            input_tokens,
            output_tokens,
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".into()),
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn complete(
        &self,
        messages: &[LlmMessage],
        config: &LlmConfig,
    ) -> Result<LlmResponse, LlmError> {
        let body = Self::build_request_body(messages, config);
        let resp = self.request(&body).send().await?;
        let resp = check_status(resp).await?;

        let api_resp: ChatCompletionResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::ParseError(e.to_string()))?;
        api_resp.into_response(&config.model)
    }

    async fn stream(
        &self,
        messages: &[LlmMessage],
        config: &LlmConfig,
    ) -> Result<TextStream, LlmError> {
        let body = Self::build_stream_body(messages, config);
        let resp = self.request(&body).send().await?;
        let resp = check_status(resp).await?;
        Ok(sse_text_stream(resp))
    }
}

// ---------------------------------------------------------------------------
// LocalProvider: local inference via OpenAI-compatible API
// ---------------------------------------------------------------------------

/// Provider for local inference servers exposing `/v1/chat/completions`
/// (llama.cpp, vLLM, Ollama, TGI). Authentication is optional.
///
/// Calls are queued through a process-wide semaphore sized by
/// `AR_LOCAL_LLM_MAX_CONCURRENT` (default 1).
pub struct LocalProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

fn local_llm_max_concurrent() -> usize {
    std::env::var("AR_LOCAL_LLM_MAX_CONCURRENT")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(1)
}

fn local_llm_gate() -> Arc<Semaphore> {
    static LOCAL_LLM_GATE: OnceLock<Arc<Semaphore>> = OnceLock::new();
    LOCAL_LLM_GATE
        .get_or_init(|| Arc::new(Semaphore::new(local_llm_max_concurrent())))
        .clone()
}

impl LocalProvider {
    /// `api_key` may be `None`, empty, or `"none"` for servers without auth.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let key = api_key.filter(|k| !k.is_empty() && k != "none");
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(120)) // local inference can be slow
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            api_key: key,
            base_url: base_url.into(),
        }
    }

    async fn send(&self, body: &serde_json::Value) -> Result<reqwest::Response, LlmError> {
        let mut req = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(body);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout
            } else if e.is_connect() {
                LlmError::HttpError(format!(
                    "cannot connect to local inference server at {}: {}",
                    self.base_url, e
                ))
            } else {
                LlmError::HttpError(e.to_string())
            }
        })?;
        check_status(resp).await
    }
}

#[async_trait]
impl LlmProvider for LocalProvider {
    async fn complete(
        &self,
        messages: &[LlmMessage],
        config: &LlmConfig,
    ) -> Result<LlmResponse, LlmError> {
        let _permit = local_llm_gate()
            .acquire_owned()
            .await
            .map_err(|_| LlmError::HttpError("local LLM queue unavailable".into()))?;

        let body = OpenAiProvider::build_request_body(messages, config);
        let resp = self.send(&body).await?;
        let api_resp: ChatCompletionResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::ParseError(e.to_string()))?;
        api_resp.into_response(&config.model)
    }

    async fn stream(
        &self,
        messages: &[LlmMessage],
        config: &LlmConfig,
    ) -> Result<TextStream, LlmError> {
        let _permit = local_llm_gate()
            .acquire_owned()
            .await
            .map_err(|_| LlmError::HttpError("local LLM queue unavailable".into()))?;

        let body = OpenAiProvider::build_stream_body(messages, config);
        let resp = self.send(&body).await?;
        Ok(sse_text_stream(resp))
    }
}

// ---------------------------------------------------------------------------
// MockProvider
// ---------------------------------------------------------------------------

type StreamScript = Vec<Result<String, LlmError>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Provider double for tests.
///
/// Each `complete` pops the next queued response (default `"Mock response"`
/// when the queue is empty). Each `stream` pops the next queued script; with
/// no script queued it reports `Unsupported`. Every request is captured.
pub struct MockProvider {
    responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    streams: Mutex<VecDeque<StreamScript>>,
    captured_requests: Mutex<Vec<(Vec<LlmMessage>, LlmConfig)>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            streams: Mutex::new(VecDeque::new()),
            captured_requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_response(self, response: LlmResponse) -> Self {
        lock(&self.responses).push_back(Ok(response));
        self
    }

    /// Queue a plain-text completion.
    pub fn with_text(self, content: impl Into<String>) -> Self {
        self.with_response(LlmResponse::text(content, "mock-model"))
    }

    pub fn with_error(self, error: LlmError) -> Self {
        lock(&self.responses).push_back(Err(error));
        self
    }

    /// Queue a stream that yields `chunks` in order.
    pub fn with_stream<I, S>(self, chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let script = chunks.into_iter().map(|c| Ok(c.into())).collect();
        lock(&self.streams).push_back(script);
        self
    }

    /// Queue a stream with explicit per-item results (for mid-stream errors).
    pub fn with_stream_items(self, items: Vec<Result<String, LlmError>>) -> Self {
        lock(&self.streams).push_back(items);
        self
    }

    pub fn captured_requests(&self) -> Vec<(Vec<LlmMessage>, LlmConfig)> {
        lock(&self.captured_requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.captured_requests).len()
    }

    fn capture(&self, messages: &[LlmMessage], config: &LlmConfig) {
        lock(&self.captured_requests).push((messages.to_vec(), config.clone()));
    }

    fn default_response(model: &str) -> LlmResponse {
        LlmResponse {
            content: "Mock response".to_string(),
            model: model.to_string(),
            input_tokens: 10,
            output_tokens: 5,
            finish_reason: "end_turn".to_string(),
        }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn complete(
        &self,
        messages: &[LlmMessage],
        config: &LlmConfig,
    ) -> Result<LlmResponse, LlmError> {
        self.capture(messages, config);
        lock(&self.responses)
            .pop_front()
            .unwrap_or_else(|| Ok(Self::default_response(&config.model)))
    }

    async fn stream(
        &self,
        messages: &[LlmMessage],
        config: &LlmConfig,
    ) -> Result<TextStream, LlmError> {
        self.capture(messages, config);
        match lock(&self.streams).pop_front() {
            Some(script) => Ok(Box::pin(futures_util::stream::iter(script))),
            None => {
                warn!("MockProvider has no queued stream");
                Err(LlmError::Unsupported(
                    "no stream queued on MockProvider".into(),
                ))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn default_config() -> LlmConfig {
        LlmConfig {
            model: "test-model".to_string(),
            max_tokens: 512,
            temperature: 0.5,
            system_prompt: None,
        }
    }

    // -- MockProvider --------------------------------------------------------

    #[tokio::test]
    async fn mock_provider_pops_queue_then_defaults() {
        let provider = MockProvider::new().with_text("first");
        let config = default_config();

        let resp = provider
            .complete(&[LlmMessage::user("Hi")], &config)
            .await
            .unwrap();
        assert_eq!(resp.content, "first");

        let resp = provider
            .complete(&[LlmMessage::user("Hi again")], &config)
            .await
            .unwrap();
        assert_eq!(resp.content, "Mock response");
        assert_eq!(resp.model, "test-model");
        assert_eq!(provider.request_count(), 2);
    }

    #[tokio::test]
    async fn mock_provider_returns_queued_error() {
        let provider = MockProvider::new().with_error(LlmError::Timeout);
        let result = provider
            .complete(&[LlmMessage::user("Hi")], &default_config())
            .await;
        assert!(matches!(result, Err(LlmError::Timeout)));
    }

    #[tokio::test]
    async fn mock_provider_streams_queued_chunks_in_order() {
        let provider = MockProvider::new().with_stream(["a", "b", "c"]);
        let stream = provider
            .stream(&[LlmMessage::user("go")], &default_config())
            .await
            .unwrap();
        let chunks: Vec<String> = stream.map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn mock_provider_without_stream_is_unsupported() {
        let provider = MockProvider::new();
        let result = provider
            .stream(&[LlmMessage::user("Hi")], &default_config())
            .await;
        assert!(matches!(result, Err(LlmError::Unsupported(_))));
        assert_eq!(provider.request_count(), 1);
    }

    // -- SSE parsing ---------------------------------------------------------

    #[test]
    fn sse_delta_line_yields_content() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#;
        assert_eq!(parse_sse_line(line), SseLine::Delta("Hel".into()));
    }

    #[test]
    fn sse_done_and_noise_lines() {
        assert_eq!(parse_sse_line("data: [DONE]"), SseLine::Done);
        assert_eq!(parse_sse_line(""), SseLine::Skip);
        assert_eq!(parse_sse_line(": keep-alive"), SseLine::Skip);
        assert_eq!(parse_sse_line("data: not json"), SseLine::Skip);
        // Role-only first delta carries no content.
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            SseLine::Skip
        );
    }

    // -- Request bodies ------------------------------------------------------

    #[test]
    fn anthropic_body_lifts_system_turns() {
        let messages = vec![
            LlmMessage::system("Be concise"),
            LlmMessage::user("Hi"),
            LlmMessage::assistant("Hello!"),
            LlmMessage::user("What is 2+2?"),
        ];
        let mut config = default_config();
        config.system_prompt = Some("Base".into());

        let body = AnthropicProvider::build_request_body(&messages, &config);
        assert_eq!(body["system"], "Base\nBe concise");
        let msgs = body["messages"].as_array().unwrap();
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0]["role"], "user");
    }

    #[test]
    fn openai_body_keeps_system_inline_and_sets_stream_flag() {
        let messages = vec![LlmMessage::system("sys"), LlmMessage::user("Hi")];
        let body = OpenAiProvider::build_request_body(&messages, &default_config());
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["max_tokens"], 512);
        assert!(body.get("stream").is_none());
        let msgs = body["messages"].as_array().unwrap();
        assert_eq!(msgs[0]["role"], "system");
        assert_eq!(msgs[1]["content"], "Hi");

        let streaming = OpenAiProvider::build_stream_body(&messages, &default_config());
        assert_eq!(streaming["stream"], true);
    }

    #[test]
    fn chat_completion_response_tolerates_missing_fields() {
        let json = r#"{"choices":[{"message":{"content":"Hello!"},"finish_reason":null}]}"#;
        let resp: ChatCompletionResponse = serde_json::from_str(json).unwrap();
        let resp = resp.into_response("fallback-model").unwrap();
        assert_eq!(resp.content, "Hello!");
        assert_eq!(resp.model, "fallback-model");
        assert_eq!(resp.input_tokens, 0);
        assert_eq!(resp.finish_reason, "stop");

        let empty: ChatCompletionResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(
            empty.into_response("m"),
            Err(LlmError::ParseError(_))
        ));
    }

    // -- Configuration -------------------------------------------------------

    #[test]
    fn llm_config_defaults_match_pipeline_defaults() {
        let config = LlmConfig::default();
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.max_tokens, 4000);
        assert!((config.temperature - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn llm_config_from_provider_config() {
        let pc = ProviderConfig {
            model: "local-llama".into(),
            max_tokens: 256,
            ..ProviderConfig::default()
        };
        let config = LlmConfig::from(&pc);
        assert_eq!(config.model, "local-llama");
        assert_eq!(config.max_tokens, 256);
        assert!(config.system_prompt.is_none());
    }

    #[test]
    fn build_provider_reports_missing_key_with_configured_var() {
        let pc = ProviderConfig {
            kind: ProviderKind::OpenAi,
            api_key_env: Some("AR_TEST_KEY_THAT_IS_NEVER_SET".into()),
            ..ProviderConfig::default()
        };
        match build_provider(&pc) {
            Err(LlmError::MissingApiKey(var)) => {
                assert_eq!(var, "AR_TEST_KEY_THAT_IS_NEVER_SET")
            }
            Err(other) => panic!("expected MissingApiKey, got {other:?}"),
            Ok(_) => panic!("expected MissingApiKey"),
        }
    }

    #[test]
    fn build_provider_local_needs_no_key() {
        let pc = ProviderConfig {
            kind: ProviderKind::Local,
            base_url: Some("http://127.0.0.1:19998".into()),
            api_key_env: Some("AR_TEST_LOCAL_KEY_NEVER_SET".into()),
            ..ProviderConfig::default()
        };
        assert!(build_provider(&pc).is_ok());
    }

    #[test]
    fn local_provider_normalizes_placeholder_keys() {
        assert!(LocalProvider::new("http://localhost:8000", Some("".into()))
            .api_key
            .is_none());
        assert!(LocalProvider::new("http://localhost:8000", Some("none".into()))
            .api_key
            .is_none());
        assert_eq!(
            LocalProvider::new("http://localhost:8000", Some("k".into())).api_key,
            Some("k".into())
        );
    }

    #[tokio::test]
    async fn local_provider_connection_refused_is_http_error() {
        let provider = LocalProvider::new("http://127.0.0.1:19999", None);
        let result = provider
            .complete(&[LlmMessage::user("Hi")], &default_config())
            .await;
        match result {
            Err(LlmError::HttpError(_)) | Err(LlmError::Timeout) => {}
            other => panic!("expected HttpError or Timeout, got: {other:?}"),
        }
    }
}
