//! Records that flow through the pipeline: tasks, submissions, stage and check results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod task;

pub use task::{select_template, seed_for, Notification, NotificationError, TaskDescriptor, TaskTemplate};

/// A declarative check executed against the live page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckSpec {
    pub name: String,
    #[serde(flatten)]
    pub kind: CheckKind,
    /// Per-check timeout; falls back to `site.check_timeout_ms`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl CheckSpec {
    pub fn new(name: impl Into<String>, kind: CheckKind) -> Self {
        Self {
            name: name.into(),
            kind,
            timeout_ms: None,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// Closed set of check kinds. Each variant has exactly one evaluation arm in
/// `site::checks::run_check`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckKind {
    /// An element matching `selector` exists.
    DomExists { selector: String },
    /// The text of the first element matching `selector` contains `expected`.
    DomText { selector: String, expected: String },
    /// A JavaScript expression evaluates truthy.
    JsTruthy { expression: String },
    /// `document.title` contains `expected`.
    TitleContains { expected: String },
    /// The rendered page text matches the regex `pattern`.
    ContentMatch { pattern: String },
    /// GET `path` relative to the page URL answers with status `expected`.
    HttpStatus { path: String, expected: u16 },
}

impl CheckKind {
    pub fn label(&self) -> &'static str {
        match self {
            CheckKind::DomExists { .. } => "dom_exists",
            CheckKind::DomText { .. } => "dom_text",
            CheckKind::JsTruthy { .. } => "js_truthy",
            CheckKind::TitleContains { .. } => "title_contains",
            CheckKind::ContentMatch { .. } => "content_match",
            CheckKind::HttpStatus { .. } => "http_status",
        }
    }
}

/// Read-only input describing one submitted piece of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub submission_id: String,
    pub repo_url: String,
    pub commit_sha: String,
    pub pages_url: String,
    pub submitted_at: DateTime<Utc>,
    /// `task_id` of the descriptor this submission answers.
    pub task_ref: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Inspector,
    Judge,
    Checker,
}

impl StageName {
    pub const ORDER: [StageName; 3] = [StageName::Inspector, StageName::Judge, StageName::Checker];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Inspector => "inspector",
            StageName::Judge => "judge",
            StageName::Checker => "checker",
        }
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StageOutcome {
    Ok,
    Fail,
    Skipped,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckOutcome {
    Ok,
    Fail,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Fail,
    Disqualified,
    Error,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Pass => "PASS",
            Verdict::Fail => "FAIL",
            Verdict::Disqualified => "DISQUALIFIED",
            Verdict::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PASS" => Some(Verdict::Pass),
            "FAIL" => Some(Verdict::Fail),
            "DISQUALIFIED" => Some(Verdict::Disqualified),
            "ERROR" => Some(Verdict::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub kind: String,
    pub outcome: CheckOutcome,
    pub detail: String,
    pub duration_ms: u64,
}

impl CheckResult {
    pub fn skipped(spec: &CheckSpec, detail: impl Into<String>) -> Self {
        Self {
            name: spec.name.clone(),
            kind: spec.kind.label().to_string(),
            outcome: CheckOutcome::Skipped,
            detail: detail.into(),
            duration_ms: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: StageName,
    pub outcome: StageOutcome,
    pub message: String,
    #[serde(default)]
    pub details: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default)]
    pub checks: Vec<CheckResult>,
    pub attempts: u32,
    pub duration_ms: u64,
}

impl StageResult {
    pub fn new(stage: StageName, outcome: StageOutcome, message: impl Into<String>) -> Self {
        Self {
            stage,
            outcome,
            message: message.into(),
            details: serde_json::Value::Null,
            score: None,
            checks: Vec::new(),
            attempts: 1,
            duration_ms: 0,
        }
    }

    pub fn ok(stage: StageName, message: impl Into<String>) -> Self {
        Self::new(stage, StageOutcome::Ok, message)
    }

    pub fn fail(stage: StageName, message: impl Into<String>) -> Self {
        Self::new(stage, StageOutcome::Fail, message)
    }

    pub fn error(stage: StageName, message: impl Into<String>) -> Self {
        Self::new(stage, StageOutcome::Error, message)
    }

    /// A stage that never ran. Attempts are zero.
    pub fn skipped(stage: StageName, reason: impl Into<String>) -> Self {
        Self {
            attempts: 0,
            ..Self::new(stage, StageOutcome::Skipped, reason)
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_checks(mut self, checks: Vec<CheckResult>) -> Self {
        self.checks = checks;
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

/// One evaluation run. Never mutated after it is handed to a sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub evaluation_id: Uuid,
    pub submission_id: String,
    pub task_id: String,
    pub commit_sha: String,
    pub stage_results: Vec<StageResult>,
    pub final_verdict: Verdict,
    pub score: f64,
    pub evaluated_at: DateTime<Utc>,
}

impl EvaluationResult {
    pub fn stage(&self, stage: StageName) -> Option<&StageResult> {
        self.stage_results.iter().find(|s| s.stage == stage)
    }
}
