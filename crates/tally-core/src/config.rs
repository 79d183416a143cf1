//! Grader configuration (`tally.yaml`).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::retry::RetryPolicy;

pub const SUPPORTED_CONFIG_VERSION: u32 = 1;

const SAMPLE_CONFIG: &str = include_str!("../../../tally.yaml");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraderConfig {
    pub version: u32,
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
    #[serde(default)]
    pub inspector: InspectorConfig,
    #[serde(default)]
    pub judge: JudgeConfig,
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub github: GithubConfig,
}

impl Default for GraderConfig {
    fn default() -> Self {
        Self {
            version: SUPPORTED_CONFIG_VERSION,
            concurrency: ConcurrencyConfig::default(),
            inspector: InspectorConfig::default(),
            judge: JudgeConfig::default(),
            site: SiteConfig::default(),
            scoring: ScoringConfig::default(),
            github: GithubConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    #[serde(default = "default_max_pipelines")]
    pub max_pipelines: usize,
    #[serde(default = "default_max_judge_calls")]
    pub max_judge_calls: usize,
    #[serde(default = "default_max_browser_sessions")]
    pub max_browser_sessions: usize,
    /// Wall-clock budget for one submission across all stages.
    #[serde(default = "default_submission_deadline_ms")]
    pub submission_deadline_ms: u64,
}

fn default_max_pipelines() -> usize {
    8
}

fn default_max_judge_calls() -> usize {
    4
}

fn default_max_browser_sessions() -> usize {
    2
}

fn default_submission_deadline_ms() -> u64 {
    300_000
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_pipelines: default_max_pipelines(),
            max_judge_calls: default_max_judge_calls(),
            max_browser_sessions: default_max_browser_sessions(),
            submission_deadline_ms: default_submission_deadline_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectorConfig {
    #[serde(default)]
    pub tolerance_ms: u64,
    #[serde(default = "default_license_allow")]
    pub license_allow: Vec<String>,
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_license_allow() -> Vec<String> {
    vec!["MIT".to_string()]
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            tolerance_ms: 0,
            license_allow: default_license_allow(),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeConfig {
    #[serde(default = "default_judge_model")]
    pub model: String,
    #[serde(default = "default_judge_base_url")]
    pub base_url: String,
    #[serde(default = "default_readme_path")]
    pub readme_path: String,
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: u32,
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// README text beyond this many bytes is truncated before judging.
    #[serde(default = "default_max_readme_bytes")]
    pub max_readme_bytes: usize,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_judge_retry")]
    pub retry: RetryPolicy,
    /// From `OPENAI_API_KEY`; never read from or written to the file.
    #[serde(skip)]
    pub api_key: Option<String>,
}

fn default_judge_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_judge_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_readme_path() -> String {
    "README.md".to_string()
}

fn default_pass_threshold() -> u32 {
    50
}

fn default_call_timeout_ms() -> u64 {
    30_000
}

fn default_max_readme_bytes() -> usize {
    20_000
}

fn default_max_tokens() -> u32 {
    400
}

fn default_judge_retry() -> RetryPolicy {
    RetryPolicy::new(3, 1_000, 30_000)
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            model: default_judge_model(),
            base_url: default_judge_base_url(),
            readme_path: default_readme_path(),
            pass_threshold: default_pass_threshold(),
            call_timeout_ms: default_call_timeout_ms(),
            max_readme_bytes: default_max_readme_bytes(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            retry: default_judge_retry(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_page_load_timeout_ms")]
    pub page_load_timeout_ms: u64,
    #[serde(default = "default_check_timeout_ms")]
    pub check_timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Whole-stage retries on ERROR (never on FAIL).
    #[serde(default = "default_stage_retries")]
    pub stage_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chrome_executable: Option<String>,
}

fn default_page_load_timeout_ms() -> u64 {
    30_000
}

fn default_check_timeout_ms() -> u64 {
    5_000
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_stage_retries() -> u32 {
    1
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            page_load_timeout_ms: default_page_load_timeout_ms(),
            check_timeout_ms: default_check_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            stage_retries: default_stage_retries(),
            chrome_executable: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_weight")]
    pub judge_weight: f64,
    #[serde(default = "default_weight")]
    pub checks_weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            judge_weight: default_weight(),
            checks_weight: default_weight(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GithubConfig {
    #[serde(default = "default_github_api_url")]
    pub api_url: String,
    #[serde(default = "default_github_timeout_ms")]
    pub timeout_ms: u64,
    /// From `TALLY_GITHUB_TOKEN` or `GITHUB_TOKEN`.
    #[serde(skip)]
    pub token: Option<String>,
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_github_timeout_ms() -> u64 {
    15_000
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: default_github_api_url(),
            timeout_ms: default_github_timeout_ms(),
            token: None,
        }
    }
}

impl GraderConfig {
    /// Applies environment overrides.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `TALLY_GITHUB_TOKEN` | GitHub token (falls back to `GITHUB_TOKEN`) |
    /// | `TALLY_GITHUB_API_URL` | GitHub API base URL |
    /// | `OPENAI_API_KEY` | Judge API key |
    pub fn with_env(self) -> Self {
        self.with_env_from(|k| std::env::var(k).ok())
    }

    pub fn with_env_from(mut self, get: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |k: &str| get(k).filter(|v| !v.trim().is_empty());
        if let Some(token) = non_empty("TALLY_GITHUB_TOKEN").or_else(|| non_empty("GITHUB_TOKEN")) {
            self.github.token = Some(token);
        }
        if let Some(url) = non_empty("TALLY_GITHUB_API_URL") {
            self.github.api_url = url;
        }
        if let Some(key) = non_empty("OPENAI_API_KEY") {
            self.judge.api_key = Some(key);
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != SUPPORTED_CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion(self.version));
        }
        let c = &self.concurrency;
        if c.max_pipelines == 0 || c.max_judge_calls == 0 || c.max_browser_sessions == 0 {
            return Err(ConfigError::Invalid(
                "concurrency limits must be at least 1".into(),
            ));
        }
        if c.submission_deadline_ms == 0 {
            return Err(ConfigError::Invalid(
                "concurrency.submission_deadline_ms must be positive".into(),
            ));
        }
        if self.inspector.license_allow.iter().all(|l| l.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "inspector.license_allow must name at least one license".into(),
            ));
        }
        if self.judge.pass_threshold > 100 {
            return Err(ConfigError::Invalid(format!(
                "judge.pass_threshold must be within 0..=100 (got {})",
                self.judge.pass_threshold
            )));
        }
        if self.judge.call_timeout_ms == 0
            || self.site.page_load_timeout_ms == 0
            || self.site.check_timeout_ms == 0
            || self.github.timeout_ms == 0
        {
            return Err(ConfigError::Invalid("timeouts must be positive".into()));
        }
        let s = &self.scoring;
        let finite = s.judge_weight.is_finite() && s.checks_weight.is_finite();
        if !finite || s.judge_weight < 0.0 || s.checks_weight < 0.0 {
            return Err(ConfigError::Invalid(
                "scoring weights must be finite and non-negative".into(),
            ));
        }
        if s.judge_weight + s.checks_weight <= 0.0 {
            return Err(ConfigError::Invalid(
                "scoring weights must not sum to zero".into(),
            ));
        }
        Ok(())
    }
}

pub fn parse_config(raw: &str, origin: &str) -> Result<GraderConfig, ConfigError> {
    let cfg: GraderConfig = serde_yaml::from_str(raw).map_err(|e| ConfigError::Parse {
        path: origin.to_string(),
        message: e.to_string(),
    })?;
    cfg.validate()?;
    Ok(cfg)
}

/// Reads, parses and validates a config file. Environment overrides are not applied.
pub fn load_config(path: &Path) -> Result<GraderConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_config(&raw, &path.display().to_string())
}

pub fn sample_config() -> &'static str {
    SAMPLE_CONFIG
}

pub fn write_sample_config(path: &Path) -> Result<(), ConfigError> {
    std::fs::write(path, SAMPLE_CONFIG).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}
