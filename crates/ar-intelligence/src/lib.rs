pub mod llm;

// Re-export canonical LLM types for convenience.
pub use llm::{
    build_provider, AnthropicProvider, LlmConfig, LlmError, LlmMessage, LlmProvider, LlmResponse,
    LlmRole, LocalProvider, MockProvider, OpenAiProvider, TextStream,
};
