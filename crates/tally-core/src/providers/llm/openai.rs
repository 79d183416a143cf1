use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::{LlmClient, LlmResponse};
use crate::config::JudgeConfig;
use crate::errors::ProviderError;

const PROVIDER: &str = "openai";

/// OpenAI-compatible chat completions client.
pub struct OpenAIClient {
    pub model: String,
    pub api_key: String,
    pub temperature: f32,
    pub max_tokens: u32,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAIClient {
    pub fn new(model: String, api_key: String, temperature: f32, max_tokens: u32) -> Self {
        Self {
            model,
            api_key,
            temperature,
            max_tokens,
            base_url: "https://api.openai.com/v1".to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Points the client at any OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn from_config(cfg: &JudgeConfig, api_key: String) -> anyhow::Result<Self> {
        // Outer bound only; the judge applies the per-call timeout itself.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.call_timeout_ms.saturating_mul(2)))
            .build()?;
        Ok(Self {
            client,
            ..Self::new(cfg.model.clone(), api_key, cfg.temperature, cfg.max_tokens)
                .with_base_url(cfg.base_url.clone())
        })
    }
}

fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn complete(&self, prompt: &str, context: Option<&[String]>) -> anyhow::Result<LlmResponse> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut messages = Vec::new();
        if let Some(ctx) = context {
            for c in ctx {
                messages.push(json!({ "role": "system", "content": c }));
            }
        }
        messages.push(json!({ "role": "user", "content": prompt }));

        let body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "response_format": { "type": "json_object" },
        });

        debug!(url = %url, model = %self.model, "judge request");
        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status == 429 {
            return Err(ProviderError::RateLimited {
                provider: PROVIDER.into(),
                retry_after: retry_after(resp.headers()),
            }
            .into());
        }
        if !resp.status().is_success() {
            let message = resp.text().await.unwrap_or_default();
            let err = if status >= 500 {
                ProviderError::Server {
                    provider: PROVIDER.into(),
                    status,
                    message,
                }
            } else {
                ProviderError::Rejected {
                    provider: PROVIDER.into(),
                    status,
                    message,
                }
            };
            return Err(err.into());
        }

        let json: serde_json::Value = resp.json().await.map_err(|e| ProviderError::InvalidResponse {
            provider: PROVIDER.into(),
            message: e.to_string(),
        })?;

        let text = json
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProviderError::InvalidResponse {
                provider: PROVIDER.into(),
                message: "response missing choices[0].message.content".into(),
            })?
            .to_string();

        Ok(LlmResponse {
            text,
            provider: PROVIDER.to_string(),
            model: self.model.clone(),
            meta: json!({ "usage": json.get("usage").cloned().unwrap_or(serde_json::Value::Null) }),
        })
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}
