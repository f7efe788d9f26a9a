use async_trait::async_trait;

use super::types::ChatRequest;
use crate::core::errors::ApiError;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// provider name for logs (e.g. "openai")
    fn name(&self) -> &str;

    /// chat completion (non-streaming); messages are sent in order
    async fn chat(&self, request: ChatRequest) -> Result<String, ApiError>;
}
