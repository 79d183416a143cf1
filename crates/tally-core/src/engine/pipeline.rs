use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::scoring;
use super::state::{classify, PipelineState};
use crate::admission::AdmissionGates;
use crate::config::{GraderConfig, ScoringConfig};
use crate::inspector::{InspectRequest, RepositoryInspector};
use crate::judge::ContentJudge;
use crate::model::{
    EvaluationResult, StageName, StageOutcome, StageResult, SubmissionRecord, TaskDescriptor,
    Verdict,
};
use crate::providers::llm::{LlmClient, OpenAIClient};
use crate::repo::{GithubFetcher, RepoFetcher};
use crate::site::{BrowserBackend, LiveSiteChecker};
use crate::storage::ResultSink;

/// Sequences Inspector, Judge and Checker for one submission and records
/// exactly one [`EvaluationResult`] per call to [`Pipeline::evaluate`].
pub struct Pipeline {
    inspector: RepositoryInspector,
    judge: ContentJudge,
    checker: LiveSiteChecker,
    sink: Arc<dyn ResultSink>,
    gates: AdmissionGates,
    scoring: ScoringConfig,
    deadline: Duration,
    unpersisted: AtomicUsize,
}

/// Wires a [`Pipeline`] from config, with overridable collaborators.
pub struct PipelineBuilder {
    config: GraderConfig,
    fetcher: Option<Arc<dyn RepoFetcher>>,
    llm: Option<Arc<dyn LlmClient>>,
    browser: Option<Arc<dyn BrowserBackend>>,
    gates: Option<AdmissionGates>,
}

impl PipelineBuilder {
    pub fn new(config: GraderConfig) -> Self {
        Self {
            config,
            fetcher: None,
            llm: None,
            browser: None,
            gates: None,
        }
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn RepoFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn browser(mut self, browser: Arc<dyn BrowserBackend>) -> Self {
        self.browser = Some(browser);
        self
    }

    pub fn gates(mut self, gates: AdmissionGates) -> Self {
        self.gates = Some(gates);
        self
    }

    pub fn build(self, sink: Arc<dyn ResultSink>) -> anyhow::Result<Pipeline> {
        let cfg = self.config;
        cfg.validate()?;

        let gates = self
            .gates
            .unwrap_or_else(|| AdmissionGates::from_config(&cfg.concurrency));
        let fetcher = match self.fetcher {
            Some(f) => f,
            None => Arc::new(GithubFetcher::new(&cfg.github)?),
        };
        let llm = match (self.llm, &cfg.judge.api_key) {
            (Some(l), _) => Some(l),
            (None, Some(key)) => {
                Some(Arc::new(OpenAIClient::from_config(&cfg.judge, key.clone())?) as Arc<dyn LlmClient>)
            }
            (None, None) => {
                warn!("OPENAI_API_KEY not set; judge stage will report ERROR");
                None
            }
        };
        let browser = match self.browser {
            Some(b) => b,
            None => default_browser(&cfg)?,
        };

        Ok(Pipeline {
            inspector: RepositoryInspector::new(fetcher.clone(), cfg.inspector.clone()),
            judge: ContentJudge::new(
                fetcher,
                llm,
                gates.clone(),
                cfg.judge.clone(),
                cfg.inspector.retry,
            ),
            checker: LiveSiteChecker::new(browser, gates.clone(), cfg.site.clone())?,
            sink,
            gates,
            scoring: cfg.scoring.clone(),
            deadline: Duration::from_millis(cfg.concurrency.submission_deadline_ms),
            unpersisted: AtomicUsize::new(0),
        })
    }
}

#[cfg(feature = "chromium")]
fn default_browser(cfg: &GraderConfig) -> anyhow::Result<Arc<dyn BrowserBackend>> {
    Ok(Arc::new(crate::site::ChromiumBackend::from_config(&cfg.site)))
}

#[cfg(not(feature = "chromium"))]
fn default_browser(_cfg: &GraderConfig) -> anyhow::Result<Arc<dyn BrowserBackend>> {
    anyhow::bail!("built without the `chromium` feature: supply a BrowserBackend")
}

fn cancelled_stage(stage: StageName, shutdown: bool) -> StageResult {
    let message = if shutdown {
        "cancelled"
    } else {
        "submission deadline exceeded"
    };
    StageResult::error(stage, message).with_details(json!({ "cancelled": true }))
}

impl Pipeline {
    pub fn builder(config: GraderConfig) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    pub fn from_config(config: &GraderConfig, sink: Arc<dyn ResultSink>) -> anyhow::Result<Self> {
        PipelineBuilder::new(config.clone()).build(sink)
    }

    pub fn gates(&self) -> &AdmissionGates {
        &self.gates
    }

    /// Results the sink rejected since this pipeline was built. Callers must
    /// treat a non-zero count as a failed run: those records are not stored.
    pub fn unpersisted(&self) -> usize {
        self.unpersisted.load(Ordering::SeqCst)
    }

    /// Evaluates one submission. Always yields a result; cancellation and the
    /// per-submission deadline end the stage in flight with ERROR.
    pub async fn evaluate(
        &self,
        submission: &SubmissionRecord,
        task: &TaskDescriptor,
        cancel: &CancellationToken,
    ) -> EvaluationResult {
        let span = info_span!(
            "evaluate",
            submission_id = %submission.submission_id,
            task_id = %task.task_id,
            commit_sha = %submission.commit_sha,
        );
        async move {
            let token = cancel.child_token();
            let timer = {
                let token = token.clone();
                let deadline = self.deadline;
                tokio::spawn(async move {
                    tokio::time::sleep(deadline).await;
                    token.cancel();
                })
            };

            let (stages, disqualified) = self.run_stages(submission, task, &token, cancel).await;
            timer.abort();

            let verdict = scoring::final_verdict(&stages, disqualified);
            let score = scoring::score(&stages, &self.scoring, verdict);
            let result = EvaluationResult {
                evaluation_id: Uuid::new_v4(),
                submission_id: submission.submission_id.clone(),
                task_id: task.task_id.clone(),
                commit_sha: submission.commit_sha.clone(),
                stage_results: stages,
                final_verdict: verdict,
                score,
                evaluated_at: Utc::now(),
            };
            info!(verdict = %verdict, score, "evaluation finished");
            self.persist(&result);
            result
        }
        .instrument(span)
        .await
    }

    /// Records an ERROR result for a submission whose evaluation never
    /// produced one (e.g. the worker panicked).
    pub fn record_failure(
        &self,
        submission: &SubmissionRecord,
        task_id: &str,
        message: &str,
    ) -> EvaluationResult {
        let mut stages = vec![StageResult::error(StageName::Inspector, message)];
        stages.extend(
            StageName::ORDER[1..]
                .iter()
                .map(|s| StageResult::skipped(*s, "evaluation aborted")),
        );
        let result = EvaluationResult {
            evaluation_id: Uuid::new_v4(),
            submission_id: submission.submission_id.clone(),
            task_id: task_id.to_string(),
            commit_sha: submission.commit_sha.clone(),
            stage_results: stages,
            final_verdict: Verdict::Error,
            score: 0.0,
            evaluated_at: Utc::now(),
        };
        self.persist(&result);
        result
    }

    fn persist(&self, result: &EvaluationResult) {
        if let Err(e) = self.sink.append(result) {
            self.unpersisted.fetch_add(1, Ordering::SeqCst);
            error!(error = %format!("{:#}", e), submission_id = %result.submission_id, "failed to persist evaluation");
        }
    }

    async fn run_stages(
        &self,
        submission: &SubmissionRecord,
        task: &TaskDescriptor,
        token: &CancellationToken,
        shutdown: &CancellationToken,
    ) -> (Vec<StageResult>, bool) {
        let mut stages: Vec<StageResult> = Vec::with_capacity(StageName::ORDER.len());
        let mut disqualified = false;
        let mut state = PipelineState::Pending.start();

        while let Some(stage) = state.stage() {
            let started = Instant::now();
            let (result, dq) = if token.is_cancelled() {
                (cancelled_stage(stage, shutdown.is_cancelled()), false)
            } else {
                self.run_stage(stage, submission, task, token, shutdown).await
            };
            let result = result.with_duration_ms(started.elapsed().as_millis() as u64);
            info!(
                stage = %stage,
                outcome = ?result.outcome,
                attempts = result.attempts,
                duration_ms = result.duration_ms,
                "{}",
                result.message
            );
            disqualified |= dq;
            state = state.advance(classify(&result, dq));
            stages.push(result);
        }

        let reason = match state {
            PipelineState::Disqualified => "inspector disqualified the submission",
            _ => "earlier stage errored",
        };
        for stage in StageName::ORDER.iter().skip(stages.len()) {
            stages.push(StageResult::skipped(*stage, reason));
        }
        (stages, disqualified)
    }

    async fn run_stage(
        &self,
        stage: StageName,
        submission: &SubmissionRecord,
        task: &TaskDescriptor,
        token: &CancellationToken,
        shutdown: &CancellationToken,
    ) -> (StageResult, bool) {
        match stage {
            StageName::Inspector => {
                if submission.task_ref != task.task_id {
                    return (
                        StageResult::error(
                            stage,
                            format!(
                                "submission answers task {} but was paired with {}",
                                submission.task_ref, task.task_id
                            ),
                        ),
                        false,
                    );
                }
                let req = InspectRequest {
                    repo_url: &submission.repo_url,
                    commit_sha: &submission.commit_sha,
                    task_created_at: task.created_at,
                    submitted_at: submission.submitted_at,
                };
                tokio::select! {
                    biased;
                    _ = token.cancelled() => (cancelled_stage(stage, shutdown.is_cancelled()), false),
                    out = self.inspector.inspect(req) => (out.stage, out.disqualified),
                }
            }
            StageName::Judge => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => (cancelled_stage(stage, shutdown.is_cancelled()), false),
                    r = self.judge.evaluate(&submission.repo_url, &submission.commit_sha) => (r, false),
                }
            }
            // The checker observes the token itself so the browser session is
            // always closed.
            StageName::Checker => {
                let r = self
                    .checker
                    .check(&submission.pages_url, &task.checks, token)
                    .await;
                if token.is_cancelled() && r.outcome == StageOutcome::Error {
                    let cancelled = cancelled_stage(stage, shutdown.is_cancelled());
                    return (
                        StageResult {
                            message: cancelled.message,
                            details: cancelled.details,
                            ..r
                        },
                        false,
                    );
                }
                (r, false)
            }
        }
    }
}
