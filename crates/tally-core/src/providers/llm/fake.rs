use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{LlmClient, LlmResponse};
use crate::errors::ProviderError;

#[derive(Debug, Clone)]
enum Step {
    Respond(String),
    Sleep(Duration, String),
    Fail(ProviderError),
    Network(String),
}

/// Scripted judge: plays queued steps in order, then repeats the fixed response.
#[derive(Debug)]
pub struct FakeClient {
    model: String,
    fixed_response: Option<String>,
    script: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl FakeClient {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            fixed_response: None,
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.fixed_response = Some(response.into());
        self
    }

    fn push(self, step: Step) -> Self {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(step);
        self
    }

    pub fn then_respond(self, response: impl Into<String>) -> Self {
        self.push(Step::Respond(response.into()))
    }

    /// Responds only after `delay`; longer than the judge timeout it reads as a hang.
    pub fn then_sleep(self, delay: Duration, response: impl Into<String>) -> Self {
        self.push(Step::Sleep(delay, response.into()))
    }

    pub fn then_fail(self, err: ProviderError) -> Self {
        self.push(Step::Fail(err))
    }

    pub fn then_network_error(self, message: impl Into<String>) -> Self {
        self.push(Step::Network(message.into()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn reply(&self, text: String) -> LlmResponse {
        LlmResponse {
            text,
            provider: "fake".to_string(),
            model: self.model.clone(),
            meta: serde_json::json!({}),
        }
    }
}

#[async_trait]
impl LlmClient for FakeClient {
    async fn complete(&self, prompt: &str, _context: Option<&[String]>) -> anyhow::Result<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt.to_string());

        let step = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();

        match step {
            Some(Step::Respond(text)) => Ok(self.reply(text)),
            Some(Step::Sleep(delay, text)) => {
                tokio::time::sleep(delay).await;
                Ok(self.reply(text))
            }
            Some(Step::Fail(err)) => Err(err.into()),
            Some(Step::Network(message)) => Err(anyhow::anyhow!(message)),
            None => match &self.fixed_response {
                Some(text) => Ok(self.reply(text.clone())),
                None => anyhow::bail!("fake judge script exhausted"),
            },
        }
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn plays_script_then_fixed_response() {
        let client = FakeClient::new("m")
            .with_response("fixed")
            .then_respond("first")
            .then_fail(ProviderError::Server {
                provider: "fake".into(),
                status: 503,
                message: "busy".into(),
            });
        assert_eq!(client.complete("a", None).await.unwrap().text, "first");
        let err = client.complete("b", None).await.unwrap_err();
        assert!(err.downcast_ref::<ProviderError>().is_some());
        assert_eq!(client.complete("c", None).await.unwrap().text, "fixed");
        assert_eq!(client.calls(), 3);
        assert_eq!(client.prompts(), vec!["a", "b", "c"]);
    }
}
