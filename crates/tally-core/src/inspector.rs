//! Repository Inspector: commit timing (anti-backdating) and license gate.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::json;
use tracing::{debug, info};

use crate::config::InspectorConfig;
use crate::errors::FetchError;
use crate::license;
use crate::model::{StageName, StageResult};
use crate::repo::{RepoFetcher, RepoRef};
use crate::retry::{retry, RetryError};

/// Stage result plus the disqualification flag the pipeline acts on.
#[derive(Debug, Clone, PartialEq)]
pub struct Inspection {
    pub stage: StageResult,
    pub disqualified: bool,
}

impl Inspection {
    fn graded(stage: StageResult) -> Self {
        Self {
            stage,
            disqualified: false,
        }
    }

    fn disqualified(stage: StageResult) -> Self {
        Self {
            stage,
            disqualified: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct InspectRequest<'a> {
    pub repo_url: &'a str,
    pub commit_sha: &'a str,
    pub task_created_at: DateTime<Utc>,
    pub submitted_at: DateTime<Utc>,
}

pub struct RepositoryInspector {
    fetcher: Arc<dyn RepoFetcher>,
    config: InspectorConfig,
}

impl RepositoryInspector {
    pub fn new(fetcher: Arc<dyn RepoFetcher>, config: InspectorConfig) -> Self {
        Self { fetcher, config }
    }

    fn tolerance(&self) -> ChronoDuration {
        ChronoDuration::milliseconds(i64::try_from(self.config.tolerance_ms).unwrap_or(i64::MAX / 2))
    }

    pub async fn inspect(&self, req: InspectRequest<'_>) -> Inspection {
        let tolerance = self.tolerance();

        // No network access when the submission itself predates the task.
        let submitted_late_enough = req
            .submitted_at
            .checked_add_signed(tolerance)
            .map_or(true, |t| t >= req.task_created_at);
        if !submitted_late_enough {
            info!(
                submitted_at = %req.submitted_at,
                created_at = %req.task_created_at,
                "submission predates task issuance"
            );
            return Inspection::disqualified(
                StageResult::fail(StageName::Inspector, "submitted before task was issued")
                    .with_details(json!({
                        "disqualified": true,
                        "reason": "submitted_before_issuance",
                        "submitted_at": req.submitted_at,
                        "task_created_at": req.task_created_at,
                    })),
            );
        }

        let repo = match RepoRef::parse(req.repo_url) {
            Ok(r) => r,
            Err(e) => return Inspection::graded(StageResult::error(StageName::Inspector, e.to_string())),
        };

        let policy = self.config.retry;
        let fetcher = self.fetcher.as_ref();
        let repo = &repo;
        let sha = req.commit_sha;
        let mut attempts = 0u32;

        let commit = match retry(&policy, "commit", move |_| fetcher.commit(repo, sha)).await {
            Ok((c, n)) => {
                attempts = attempts.max(n);
                c
            }
            Err(e) => return fetch_error(e, "commit lookup"),
        };

        let commit_time = commit.commit_time();
        debug!(repo = %repo, sha, commit_time = %commit_time, "resolved commit");
        let backdated = req
            .task_created_at
            .checked_sub_signed(tolerance)
            .is_some_and(|bound| commit_time < bound);
        if backdated {
            return Inspection::disqualified(
                StageResult::fail(StageName::Inspector, "commit predates task issuance")
                    .with_attempts(attempts)
                    .with_details(json!({
                        "disqualified": true,
                        "reason": "commit_before_issuance",
                        "commit_time": commit_time,
                        "task_created_at": req.task_created_at,
                    })),
            );
        }

        let entries = match retry(&policy, "root listing", move |_| fetcher.root_entries(repo, sha)).await {
            Ok((e, n)) => {
                attempts = attempts.max(n);
                e
            }
            Err(e) => return fetch_error(e, "root listing"),
        };

        let timing = json!({ "commit_time": commit_time, "task_created_at": req.task_created_at });

        let Some(entry) = license::find_license_file(&entries) else {
            return Inspection::graded(
                StageResult::fail(StageName::Inspector, "no LICENSE file at repository root")
                    .with_attempts(attempts)
                    .with_details(json!({ "timing": timing, "license_file": null })),
            );
        };
        let license_path = entry.path.clone();
        let path = license_path.as_str();

        let text = match retry(&policy, "license file", move |_| fetcher.file(repo, sha, path)).await {
            Ok((Some(t), n)) => {
                attempts = attempts.max(n);
                t
            }
            Ok((None, n)) => {
                return Inspection::graded(
                    StageResult::fail(StageName::Inspector, "LICENSE file listed but not readable")
                        .with_attempts(attempts.max(n))
                        .with_details(json!({ "timing": timing, "license_file": license_path })),
                )
            }
            Err(e) => return fetch_error(e, "license fetch"),
        };

        let details = |spdx: Option<&str>| {
            json!({ "timing": timing, "license_file": license_path, "license": spdx })
        };

        let stage = match license::identify(&text) {
            None => StageResult::fail(StageName::Inspector, "license text not recognized")
                .with_details(details(None)),
            Some(spdx) if !license::is_allowed(&spdx, &self.config.license_allow) => {
                StageResult::fail(
                    StageName::Inspector,
                    format!("license {} is not allowed", spdx),
                )
                .with_details(details(Some(&spdx)))
            }
            Some(spdx) => StageResult::ok(StageName::Inspector, format!("{} license, timing ok", spdx))
                .with_details(details(Some(&spdx))),
        };
        Inspection::graded(stage.with_attempts(attempts))
    }
}

fn fetch_error(e: RetryError<FetchError>, what: &str) -> Inspection {
    Inspection::graded(
        StageResult::error(StageName::Inspector, format!("{} failed: {}", what, e.error))
            .with_attempts(e.attempts)
            .with_details(json!({ "error_class": format!("{:?}", e.error.class()) })),
    )
}
