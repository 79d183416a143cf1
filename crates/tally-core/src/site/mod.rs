//! Live-Site Checker: runs declarative checks against the deployed page in an
//! isolated, ephemeral browser session.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::admission::AdmissionGates;
use crate::config::SiteConfig;
use crate::errors::SiteError;
use crate::model::{CheckOutcome, CheckResult, CheckSpec, StageName, StageResult};

mod checks;
#[cfg(feature = "chromium")]
mod chromium;

pub use checks::{js_string, truthy};
#[cfg(feature = "chromium")]
pub use chromium::ChromiumBackend;

/// Launches isolated browser sessions.
#[async_trait]
pub trait BrowserBackend: Send + Sync {
    /// A fresh session with its own throwaway profile.
    async fn open(&self) -> Result<Box<dyn BrowserSession>, SiteError>;
}

/// One page in one browser profile. `close` must be safe to call more than once.
#[async_trait]
pub trait BrowserSession: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), SiteError>;

    async fn evaluate(&mut self, expression: &str) -> Result<serde_json::Value, SiteError>;

    async fn close(&mut self);
}

pub struct LiveSiteChecker {
    backend: Arc<dyn BrowserBackend>,
    http: reqwest::Client,
    gates: AdmissionGates,
    config: SiteConfig,
}

impl LiveSiteChecker {
    pub fn new(
        backend: Arc<dyn BrowserBackend>,
        gates: AdmissionGates,
        config: SiteConfig,
    ) -> Result<Self, SiteError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.page_load_timeout_ms))
            .build()
            .map_err(|e| SiteError::Browser {
                message: format!("failed to create HTTP client: {}", e),
            })?;
        Ok(Self {
            backend,
            http,
            gates,
            config,
        })
    }

    /// Runs every check against `pages_url`. Retries the whole stage on
    /// retryable ERROR only; a FAIL is final.
    pub async fn check(
        &self,
        pages_url: &str,
        checks: &[CheckSpec],
        cancel: &CancellationToken,
    ) -> StageResult {
        let max_attempts = 1 + self.config.stage_retries;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.run_once(pages_url, checks, cancel).await {
                Ok(results) => return aggregate(results).with_attempts(attempt),
                Err(e) if e.is_retryable() && attempt < max_attempts && !cancel.is_cancelled() => {
                    warn!(error = %e, retry = attempt, max_retries = self.config.stage_retries, "retrying live-site stage");
                }
                Err(e) => {
                    info!(error = %e, attempts = attempt, "live-site stage error");
                    return errored(&e, checks).with_attempts(attempt);
                }
            }
        }
    }

    async fn run_once(
        &self,
        pages_url: &str,
        checks: &[CheckSpec],
        cancel: &CancellationToken,
    ) -> Result<Vec<CheckResult>, SiteError> {
        let url = url::Url::parse(pages_url).map_err(|e| SiteError::InvalidUrl {
            url: pages_url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SiteError::InvalidUrl {
                url: pages_url.to_string(),
                reason: "unsupported scheme".into(),
            });
        }

        let load_budget = Duration::from_millis(self.config.page_load_timeout_ms);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SiteError::Cancelled),
            r = self.ensure_reachable(&url, load_budget) => r?,
        }

        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SiteError::Cancelled),
            p = self.gates.browser() => p.map_err(|_| SiteError::Cancelled)?,
        };
        // Queueing for a browser is bounded by the submission deadline, not the load budget.
        let started = Instant::now();

        let mut session = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SiteError::Cancelled),
            s = tokio::time::timeout(load_budget.saturating_sub(started.elapsed()), self.backend.open()) => {
                s.map_err(|_| SiteError::Timeout { after_ms: self.config.page_load_timeout_ms })??
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SiteError::Cancelled),
            r = self.drive(&mut *session, &url, checks, load_budget, started) => r,
        };
        session.close().await;
        debug!(url = %url, "browser session closed");
        outcome
    }

    /// Reachability: plain GET must answer with status < 400.
    async fn ensure_reachable(&self, url: &url::Url, budget: Duration) -> Result<(), SiteError> {
        let resp = tokio::time::timeout(budget, self.http.get(url.clone()).send())
            .await
            .map_err(|_| SiteError::Timeout {
                after_ms: budget.as_millis() as u64,
            })?
            .map_err(|e| {
                if e.is_timeout() {
                    SiteError::Timeout {
                        after_ms: budget.as_millis() as u64,
                    }
                } else {
                    SiteError::Load {
                        message: e.to_string(),
                    }
                }
            })?;
        let status = resp.status().as_u16();
        if status >= 400 {
            return Err(SiteError::Unreachable { status });
        }
        Ok(())
    }

    async fn drive(
        &self,
        session: &mut dyn BrowserSession,
        url: &url::Url,
        checks: &[CheckSpec],
        load_budget: Duration,
        started: Instant,
    ) -> Result<Vec<CheckResult>, SiteError> {
        let remaining = load_budget.saturating_sub(started.elapsed());
        tokio::time::timeout(remaining, session.navigate(url.as_str()))
            .await
            .map_err(|_| SiteError::Timeout {
                after_ms: self.config.page_load_timeout_ms,
            })??;

        let mut results = Vec::with_capacity(checks.len());
        for spec in checks {
            let timeout = Duration::from_millis(spec.timeout_ms.unwrap_or(self.config.check_timeout_ms));
            let poll = Duration::from_millis(self.config.poll_interval_ms.max(1));
            let ctx = checks::CheckContext {
                http: &self.http,
                page_url: url,
                timeout,
                poll,
            };
            let result = checks::run_check(session, spec, &ctx).await;
            debug!(check = %result.name, outcome = ?result.outcome, "check finished");
            results.push(result);
        }
        Ok(results)
    }
}

fn aggregate(results: Vec<CheckResult>) -> StageResult {
    if results.is_empty() {
        return StageResult::ok(StageName::Checker, "no checks declared").with_score(1.0);
    }
    let total = results.len();
    let passed = results
        .iter()
        .filter(|r| r.outcome == CheckOutcome::Ok)
        .count();
    let fraction = passed as f64 / total as f64;
    let message = format!("{}/{} checks passed", passed, total);
    let stage = if passed == total {
        StageResult::ok(StageName::Checker, message)
    } else {
        StageResult::fail(StageName::Checker, message)
    };
    stage
        .with_score(fraction)
        .with_details(json!({ "passed": passed, "total": total }))
        .with_checks(results)
}

fn errored(e: &SiteError, checks: &[CheckSpec]) -> StageResult {
    let skipped = checks
        .iter()
        .map(|c| CheckResult::skipped(c, format!("not run: {}", e)))
        .collect();
    StageResult::error(StageName::Checker, e.to_string())
        .with_checks(skipped)
        .with_details(json!({ "error_class": format!("{:?}", e.class()) }))
}
