//! LLM provider trait and the multi-provider router.
//!
//! Defines the `LlmProvider` trait and the pieces [`LlmRouter`] is built
//! from: provider selection, model-name normalization, the OpenAI-compatible
//! transport and response parsing with text tool-call recovery.

pub mod extract;
pub mod normalize;
pub mod parse;
pub mod registry;
pub mod router;
pub mod selector;
pub mod transport;
pub mod types;

use async_trait::async_trait;

pub use registry::{Credentials, ProviderKind, ProviderRegistry};
pub use router::{LlmRouter, Route};
pub use transport::{ChatTransport, HttpTransport, OutboundRequest};
pub use types::{ChatMessage, LlmResponse, ToolCallRequest, ToolDefinition};

/// Trait for LLM providers.
///
/// Implementations must be safe to call from many tasks at once.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a chat completion request.
    ///
    /// # Arguments
    /// * `messages` - Conversation history
    /// * `tools` - Available tool definitions (empty = no tool calling)
    /// * `model` - Model identifier override (None = use default)
    /// * `max_tokens` - Maximum response tokens
    /// * `temperature` - Sampling temperature
    ///
    /// Never fails: errors come back as a response with
    /// `finish_reason == "error"` and the message in `content`.
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        model: Option<&str>,
        max_tokens: u32,
        temperature: f64,
    ) -> LlmResponse;

    /// Get the default model identifier.
    fn default_model(&self) -> &str;
}
