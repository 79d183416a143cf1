use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod fake;
pub mod openai;

pub use fake::FakeClient;
pub use openai::OpenAIClient;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub meta: serde_json::Value,
}

/// A chat-completion style judge backend.
///
/// Errors should carry a [`ProviderError`](crate::errors::ProviderError) when the
/// failure is an HTTP-level rejection so callers can classify it.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str, context: Option<&[String]>) -> anyhow::Result<LlmResponse>;

    fn provider_name(&self) -> &'static str;
}
