//! Content Judge: README quality verdict from an external LLM judge.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, info};

use crate::admission::AdmissionGates;
use crate::config::JudgeConfig;
use crate::errors::JudgeError;
use crate::model::{StageName, StageResult};
use crate::providers::llm::LlmClient;
use crate::repo::{RepoFetcher, RepoRef};
use crate::retry::{retry, RetryPolicy};

mod prompt;
mod verdict;

pub use prompt::{build_prompt, SYSTEM_PROMPT};
pub use verdict::{parse_verdict, JudgeVerdict};

#[derive(Clone)]
pub struct ContentJudge {
    fetcher: Arc<dyn RepoFetcher>,
    client: Option<Arc<dyn LlmClient>>,
    gates: AdmissionGates,
    config: JudgeConfig,
    fetch_retry: RetryPolicy,
}

impl ContentJudge {
    pub fn new(
        fetcher: Arc<dyn RepoFetcher>,
        client: Option<Arc<dyn LlmClient>>,
        gates: AdmissionGates,
        config: JudgeConfig,
        fetch_retry: RetryPolicy,
    ) -> Self {
        Self {
            fetcher,
            client,
            gates,
            config,
            fetch_retry,
        }
    }

    pub async fn evaluate(&self, repo_url: &str, commit_sha: &str) -> StageResult {
        let readme_path = self.config.readme_path.as_str();
        let repo = match RepoRef::parse(repo_url) {
            Ok(r) => r,
            Err(e) => return StageResult::error(StageName::Judge, e.to_string()),
        };

        let fetcher = self.fetcher.as_ref();
        let repo = &repo;
        let fetched = retry(&self.fetch_retry, "readme", move |_| {
            fetcher.file(repo, commit_sha, readme_path)
        })
        .await;

        let readme = match fetched {
            Ok((Some(text), _)) if !text.trim().is_empty() => text,
            Ok((_, attempts)) => {
                return StageResult::fail(StageName::Judge, format!("{} not found", readme_path))
                    .with_attempts(attempts)
                    .with_details(json!({ "readme_path": readme_path }))
            }
            Err(e) => {
                return StageResult::error(
                    StageName::Judge,
                    format!("{} fetch failed: {}", readme_path, e.error),
                )
                .with_attempts(e.attempts)
                .with_details(json!({ "error_class": format!("{:?}", e.error.class()) }))
            }
        };

        let Some(client) = self.client.as_deref() else {
            return StageResult::error(StageName::Judge, JudgeError::Unavailable.to_string());
        };

        let (prompt, truncated) = build_prompt(readme_path, &readme, self.config.max_readme_bytes);
        let prompt = prompt.as_str();

        match retry(&self.config.retry, "judge call", move |_| self.call_once(client, prompt)).await {
            Ok((verdict, attempts)) => {
                let threshold = self.config.pass_threshold;
                let passed = u32::from(verdict.score) >= threshold;
                info!(score = verdict.score, threshold, attempts, "judge verdict");
                let message = format!("README scored {}/100 (threshold {})", verdict.score, threshold);
                let stage = if passed {
                    StageResult::ok(StageName::Judge, message)
                } else {
                    StageResult::fail(StageName::Judge, message)
                };
                stage
                    .with_score(f64::from(verdict.score))
                    .with_attempts(attempts)
                    .with_details(json!({
                        "rationale": verdict.rationale,
                        "provider": client.provider_name(),
                        "model": self.config.model,
                        "threshold": threshold,
                        "readme_truncated": truncated,
                    }))
            }
            Err(e) => StageResult::error(StageName::Judge, e.error.to_string())
                .with_attempts(e.attempts)
                .with_details(json!({ "error_class": format!("{:?}", e.error.class()) })),
        }
    }

    /// One judge call under a judge permit and the per-call timeout.
    async fn call_once(&self, client: &dyn LlmClient, prompt: &str) -> Result<JudgeVerdict, JudgeError> {
        let _permit = self
            .gates
            .judge()
            .await
            .map_err(|_| JudgeError::Unavailable)?;

        let timeout_ms = self.config.call_timeout_ms;
        let context = [SYSTEM_PROMPT.to_string()];
        let resp = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            client.complete(prompt, Some(&context[..])),
        )
        .await
        .map_err(|_| JudgeError::Timeout {
            after_ms: timeout_ms,
        })?
        .map_err(|e| match JudgeError::from_provider(&e) {
            JudgeError::Timeout { .. } => JudgeError::Timeout {
                after_ms: timeout_ms,
            },
            other => other,
        })?;

        debug!(provider = %resp.provider, model = %resp.model, "judge responded");
        parse_verdict(&resp.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{FetchError, ProviderError};
    use crate::model::StageOutcome;
    use crate::providers::llm::FakeClient;
    use crate::repo::{CommitInfo, RepoEntry};
    use async_trait::async_trait;

    struct ReadmeRepo(Option<&'static str>);

    #[async_trait]
    impl RepoFetcher for ReadmeRepo {
        async fn commit(&self, _: &RepoRef, _: &str) -> Result<CommitInfo, FetchError> {
            unreachable!("judge never reads commits")
        }

        async fn root_entries(&self, _: &RepoRef, _: &str) -> Result<Vec<RepoEntry>, FetchError> {
            unreachable!("judge never lists the root")
        }

        async fn file(&self, _: &RepoRef, _: &str, _: &str) -> Result<Option<String>, FetchError> {
            Ok(self.0.map(str::to_string))
        }
    }

    fn judge(readme: Option<&'static str>, client: Arc<FakeClient>, timeout_ms: u64) -> ContentJudge {
        ContentJudge::new(
            Arc::new(ReadmeRepo(readme)),
            Some(client as Arc<dyn LlmClient>),
            AdmissionGates::new(1, 1, 1),
            JudgeConfig {
                call_timeout_ms: timeout_ms,
                retry: RetryPolicy::immediate(2),
                ..JudgeConfig::default()
            },
            RetryPolicy::immediate(0),
        )
    }

    const URL: &str = "https://github.com/alice/calc";

    #[tokio::test]
    async fn score_at_threshold_is_ok() {
        let client = Arc::new(FakeClient::new("m").with_response(r#"{"score":50,"rationale":"ok"}"#));
        let stage = judge(Some("# Calc"), client, 1_000).evaluate(URL, "abc").await;
        assert_eq!(stage.outcome, StageOutcome::Ok);
        assert_eq!(stage.score, Some(50.0));
        assert_eq!(stage.details["rationale"], "ok");
    }

    #[tokio::test]
    async fn low_score_is_fail() {
        let client = Arc::new(FakeClient::new("m").with_response(r#"{"score":49,"rationale":"thin"}"#));
        let stage = judge(Some("# Calc"), client, 1_000).evaluate(URL, "abc").await;
        assert_eq!(stage.outcome, StageOutcome::Fail);
        assert_eq!(stage.score, Some(49.0));
    }

    #[tokio::test]
    async fn missing_readme_fails_without_judge_call() {
        let client = Arc::new(FakeClient::new("m").with_response(r#"{"score":90,"rationale":"x"}"#));
        let stage = judge(None, client.clone(), 1_000).evaluate(URL, "abc").await;
        assert_eq!(stage.outcome, StageOutcome::Fail);
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn schema_violation_is_error_without_retry() {
        let client = Arc::new(FakeClient::new("m").with_response(r#"{"score":"80","rationale":"x"}"#));
        let stage = judge(Some("# Calc"), client.clone(), 1_000).evaluate(URL, "abc").await;
        assert_eq!(stage.outcome, StageOutcome::Error);
        assert_eq!(client.calls(), 1);
        assert_eq!(stage.attempts, 1);
    }

    #[tokio::test]
    async fn request_rejection_is_not_retried() {
        let client = Arc::new(
            FakeClient::new("m")
                .with_response(r#"{"score":80,"rationale":"x"}"#)
                .then_fail(ProviderError::Rejected {
                    provider: "fake".into(),
                    status: 400,
                    message: "bad request".into(),
                }),
        );
        let stage = judge(Some("# Calc"), client.clone(), 1_000).evaluate(URL, "abc").await;
        assert_eq!(stage.outcome, StageOutcome::Error);
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn timeouts_then_success_is_ok() {
        let client = Arc::new(
            FakeClient::new("m")
                .with_response(r#"{"score":80,"rationale":"good"}"#)
                .then_sleep(Duration::from_secs(5), "late")
                .then_sleep(Duration::from_secs(5), "late"),
        );
        let stage = judge(Some("# Calc"), client.clone(), 50).evaluate(URL, "abc").await;
        assert_eq!(stage.outcome, StageOutcome::Ok);
        assert_eq!(stage.attempts, 3);
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test]
    async fn permits_are_released_between_calls() {
        let gates = AdmissionGates::new(1, 1, 1);
        let client = Arc::new(
            FakeClient::new("m")
                .with_response(r#"{"score":80,"rationale":"good"}"#)
                .then_network_error("reset"),
        );
        let j = ContentJudge::new(
            Arc::new(ReadmeRepo(Some("# Calc"))),
            Some(client as Arc<dyn LlmClient>),
            gates.clone(),
            JudgeConfig {
                retry: RetryPolicy::immediate(1),
                ..JudgeConfig::default()
            },
            RetryPolicy::immediate(0),
        );
        let stage = j.evaluate(URL, "abc").await;
        assert_eq!(stage.outcome, StageOutcome::Ok);
        assert_eq!(gates.available_judge(), 1);
    }
}
