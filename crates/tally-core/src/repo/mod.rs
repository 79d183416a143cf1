//! Read-only access to a submission's repository at a fixed revision.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::FetchError;

mod github;
mod reference;

pub use github::GithubFetcher;
pub use reference::RepoRef;

/// Timestamps recorded on a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitInfo {
    pub author_date: DateTime<Utc>,
    pub committer_date: DateTime<Utc>,
}

impl CommitInfo {
    /// The earlier of author and committer date.
    pub fn commit_time(&self) -> DateTime<Utc> {
        self.author_date.min(self.committer_date)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Other,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoEntry {
    pub name: String,
    pub path: String,
    pub kind: EntryKind,
}

impl RepoEntry {
    pub fn file(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            path: name.clone(),
            name,
            kind: EntryKind::File,
        }
    }
}

/// Single-attempt repository operations. Retries are applied by the caller.
#[async_trait]
pub trait RepoFetcher: Send + Sync {
    async fn commit(&self, repo: &RepoRef, sha: &str) -> Result<CommitInfo, FetchError>;

    async fn root_entries(&self, repo: &RepoRef, sha: &str) -> Result<Vec<RepoEntry>, FetchError>;

    /// `Ok(None)` when the file does not exist at `sha`.
    async fn file(&self, repo: &RepoRef, sha: &str, path: &str)
        -> Result<Option<String>, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn commit_time_is_earliest_timestamp() {
        let early = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
        let rebased = CommitInfo {
            author_date: early,
            committer_date: late,
        };
        assert_eq!(rebased.commit_time(), early);
        let amended = CommitInfo {
            author_date: late,
            committer_date: early,
        };
        assert_eq!(amended.commit_time(), early);
    }
}
