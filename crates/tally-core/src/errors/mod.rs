//! Error taxonomy shared by the stages.
//!
//! Every component error maps to one [`ErrorClass`]. Only `TransientInfra` errors
//! are retried; everything else is reported as-is on the first occurrence.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Submission is disqualified (backdated work). Never retried.
    Disqualifying,
    /// The submission was graded and did not meet the bar. Never retried.
    GradedFail,
    /// Network, timeout, 429, 5xx. Retried with backoff.
    TransientInfra,
    /// Bad URL, 404, auth, malformed responses, schema violations.
    PermanentInfra,
}

impl ErrorClass {
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorClass::TransientInfra)
    }
}

/// Repository host errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("invalid repository url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("rate limited: retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("server error: HTTP {status}")]
    Server { status: u16 },

    #[error("request timed out")]
    Timeout,

    #[error("network error: {message}")]
    Network { message: String },

    #[error("invalid response: {message}")]
    InvalidResponse { message: String },
}

impl FetchError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::RateLimited { .. } | Self::Server { .. } | Self::Timeout | Self::Network { .. } => {
                ErrorClass::TransientInfra
            }
            Self::InvalidUrl { .. }
            | Self::NotFound { .. }
            | Self::Unauthorized { .. }
            | Self::InvalidResponse { .. } => ErrorClass::PermanentInfra,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class().is_retryable()
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::InvalidResponse {
                message: err.to_string(),
            }
        } else {
            Self::Network {
                message: err.to_string(),
            }
        }
    }
}

/// Errors raised by an LLM provider, carried through `anyhow` and classified by the judge.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("{provider} rate limited (HTTP 429)")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("{provider} server error (HTTP {status}): {message}")]
    Server {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("{provider} rejected request (HTTP {status}): {message}")]
    Rejected {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("{provider} returned malformed response: {message}")]
    InvalidResponse { provider: String, message: String },
}

/// Content judge errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JudgeError {
    #[error("judge call timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("judge rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("judge server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("judge rejected request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("judge network error: {message}")]
    Network { message: String },

    #[error("judge verdict violates schema: {message}")]
    Schema { message: String },

    #[error("no judge client configured")]
    Unavailable,
}

impl JudgeError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Timeout { .. }
            | Self::RateLimited { .. }
            | Self::Server { .. }
            | Self::Network { .. } => ErrorClass::TransientInfra,
            Self::Rejected { .. } | Self::Schema { .. } | Self::Unavailable => {
                ErrorClass::PermanentInfra
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class().is_retryable()
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Classifies an error returned by an [`LlmClient`](crate::providers::llm::LlmClient).
    pub fn from_provider(err: &anyhow::Error) -> Self {
        if let Some(p) = err.downcast_ref::<ProviderError>() {
            return match p {
                ProviderError::RateLimited { retry_after, .. } => Self::RateLimited {
                    retry_after: *retry_after,
                },
                ProviderError::Server {
                    status, message, ..
                } => Self::Server {
                    status: *status,
                    message: message.clone(),
                },
                ProviderError::Rejected {
                    status, message, ..
                } => Self::Rejected {
                    status: *status,
                    message: message.clone(),
                },
                ProviderError::InvalidResponse { message, .. } => Self::Schema {
                    message: message.clone(),
                },
            };
        }
        if let Some(e) = err.downcast_ref::<reqwest::Error>() {
            if e.is_timeout() {
                return Self::Timeout { after_ms: 0 };
            }
        }
        Self::Network {
            message: format!("{:#}", err),
        }
    }
}

impl From<FetchError> for JudgeError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::RateLimited { retry_after } => Self::RateLimited { retry_after },
            FetchError::Server { status } => Self::Server {
                status,
                message: "artifact fetch".into(),
            },
            FetchError::Timeout => Self::Timeout { after_ms: 0 },
            other => Self::Network {
                message: other.to_string(),
            },
        }
    }
}

/// Live-site errors. All of them end the stage in ERROR.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SiteError {
    #[error("invalid page url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("page unreachable: HTTP {status}")]
    Unreachable { status: u16 },

    #[error("page load failed: {message}")]
    Load { message: String },

    #[error("page load timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("browser error: {message}")]
    Browser { message: String },

    #[error("cancelled")]
    Cancelled,
}

impl SiteError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidUrl { .. } | Self::Cancelled => ErrorClass::PermanentInfra,
            Self::Unreachable { status } if *status < 500 && *status != 429 => {
                ErrorClass::PermanentInfra
            }
            _ => ErrorClass::TransientInfra,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class().is_retryable()
    }
}

/// Configuration load errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    Parse { path: String, message: String },

    #[error("unsupported config version {0} (supported: 1)")]
    UnsupportedVersion(u32),

    #[error("invalid config: {0}")]
    Invalid(String),
}
