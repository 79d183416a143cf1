//! GitHub REST implementation of [`RepoFetcher`].
//!
//! All status code handling lives in `request_once`. Only GET requests are issued.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::Deserialize;
use tracing::debug;

use super::{CommitInfo, EntryKind, RepoEntry, RepoFetcher, RepoRef};
use crate::config::GithubConfig;
use crate::errors::FetchError;

const USER_AGENT_VALUE: &str = concat!("tally/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct GithubFetcher {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct CommitResponse {
    commit: CommitBody,
}

#[derive(Deserialize)]
struct CommitBody {
    author: Option<Signature>,
    committer: Option<Signature>,
}

#[derive(Deserialize)]
struct Signature {
    date: DateTime<Utc>,
}

#[derive(Deserialize)]
struct ContentEntry {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct FileContent {
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

impl GithubFetcher {
    pub fn new(config: &GithubConfig) -> Result<Self, FetchError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        default_headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        default_headers.insert(
            "x-github-api-version",
            HeaderValue::from_static("2022-11-28"),
        );

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .default_headers(default_headers)
            .build()
            .map_err(|e| FetchError::Network {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn repo_url(&self, repo: &RepoRef) -> String {
        format!("{}/repos/{}/{}", self.api_url, repo.owner, repo.name)
    }

    async fn request_once(&self, url: &str, what: &str) -> Result<reqwest::Response, FetchError> {
        debug!(url = %url, "GET");
        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = request.send().await?;
        let status = response.status().as_u16();

        match status {
            200..=299 => Ok(response),

            401 => Err(FetchError::Unauthorized {
                message: "invalid or expired token".to_string(),
            }),

            403 | 429 if status == 429 || rate_limit_exhausted(response.headers()) => {
                Err(FetchError::RateLimited {
                    retry_after: retry_after(response.headers()),
                })
            }

            403 => Err(FetchError::Unauthorized {
                message: "forbidden".to_string(),
            }),

            404 | 422 => Err(FetchError::NotFound {
                what: what.to_string(),
            }),

            500..=599 => Err(FetchError::Server { status }),

            _ => Err(FetchError::InvalidResponse {
                message: format!("unexpected status {}", status),
            }),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        what: &str,
    ) -> Result<T, FetchError> {
        let response = self.request_once(url, what).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| FetchError::InvalidResponse {
            message: format!("{}: {}", what, e),
        })
    }
}

fn rate_limit_exhausted(headers: &HeaderMap) -> bool {
    headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim() == "0")
        .unwrap_or(false)
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    if let Some(secs) = headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
    {
        return Some(Duration::from_secs(secs));
    }
    let reset = headers
        .get("x-ratelimit-reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<i64>().ok())?;
    let wait = reset - Utc::now().timestamp();
    Some(Duration::from_secs(wait.max(1) as u64))
}

#[async_trait]
impl RepoFetcher for GithubFetcher {
    async fn commit(&self, repo: &RepoRef, sha: &str) -> Result<CommitInfo, FetchError> {
        let url = format!("{}/commits/{}", self.repo_url(repo), sha);
        let resp: CommitResponse = self.get_json(&url, &format!("commit {}", sha)).await?;
        let author = resp.commit.author.map(|s| s.date);
        let committer = resp.commit.committer.map(|s| s.date);
        match (author, committer) {
            (Some(author_date), Some(committer_date)) => Ok(CommitInfo {
                author_date,
                committer_date,
            }),
            (Some(d), None) | (None, Some(d)) => Ok(CommitInfo {
                author_date: d,
                committer_date: d,
            }),
            (None, None) => Err(FetchError::InvalidResponse {
                message: format!("commit {} has no timestamps", sha),
            }),
        }
    }

    async fn root_entries(&self, repo: &RepoRef, sha: &str) -> Result<Vec<RepoEntry>, FetchError> {
        let url = format!("{}/contents/?ref={}", self.repo_url(repo), sha);
        let entries: Vec<ContentEntry> = self.get_json(&url, "repository root").await?;
        Ok(entries
            .into_iter()
            .map(|e| RepoEntry {
                kind: match e.kind.as_str() {
                    "file" => EntryKind::File,
                    "dir" => EntryKind::Dir,
                    _ => EntryKind::Other,
                },
                name: e.name,
                path: e.path,
            })
            .collect())
    }

    async fn file(
        &self,
        repo: &RepoRef,
        sha: &str,
        path: &str,
    ) -> Result<Option<String>, FetchError> {
        let path = path.trim_start_matches('/');
        let url = format!("{}/contents/{}?ref={}", self.repo_url(repo), path, sha);
        let content: FileContent = match self.get_json(&url, path).await {
            Ok(c) => c,
            Err(FetchError::NotFound { .. }) => {
                debug!(path, "file not found");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        if content.encoding != "base64" {
            return Err(FetchError::InvalidResponse {
                message: format!("{}: unsupported encoding '{}'", path, content.encoding),
            });
        }
        let compact: String = content.content.split_whitespace().collect();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(compact)
            .map_err(|e| FetchError::InvalidResponse {
                message: format!("{}: invalid base64: {}", path, e),
            })?;
        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_headers() {
        let mut h = HeaderMap::new();
        assert!(!rate_limit_exhausted(&h));
        h.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        assert!(rate_limit_exhausted(&h));
        h.insert("retry-after", HeaderValue::from_static("7"));
        assert_eq!(retry_after(&h), Some(Duration::from_secs(7)));
    }
}
