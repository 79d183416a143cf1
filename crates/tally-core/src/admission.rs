//! Shared admission gates for scarce external resources.

use std::sync::Arc;

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

use crate::config::ConcurrencyConfig;

/// Semaphores shared by every pipeline in a process. Cloning shares the gates.
#[derive(Debug, Clone)]
pub struct AdmissionGates {
    pipelines: Arc<Semaphore>,
    judge: Arc<Semaphore>,
    browser: Arc<Semaphore>,
}

impl AdmissionGates {
    pub fn new(max_pipelines: usize, max_judge_calls: usize, max_browser_sessions: usize) -> Self {
        Self {
            pipelines: Arc::new(Semaphore::new(max_pipelines.max(1))),
            judge: Arc::new(Semaphore::new(max_judge_calls.max(1))),
            browser: Arc::new(Semaphore::new(max_browser_sessions.max(1))),
        }
    }

    pub fn from_config(cfg: &ConcurrencyConfig) -> Self {
        Self::new(cfg.max_pipelines, cfg.max_judge_calls, cfg.max_browser_sessions)
    }

    pub async fn pipeline(&self) -> Result<OwnedSemaphorePermit, AcquireError> {
        self.pipelines.clone().acquire_owned().await
    }

    pub async fn judge(&self) -> Result<OwnedSemaphorePermit, AcquireError> {
        self.judge.clone().acquire_owned().await
    }

    pub async fn browser(&self) -> Result<OwnedSemaphorePermit, AcquireError> {
        self.browser.clone().acquire_owned().await
    }

    pub fn available_judge(&self) -> usize {
        self.judge.available_permits()
    }

    pub fn available_browser(&self) -> usize {
        self.browser.available_permits()
    }
}

impl Default for AdmissionGates {
    fn default() -> Self {
        Self::from_config(&ConcurrencyConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn permits_are_shared_between_clones() {
        let gates = AdmissionGates::new(2, 1, 1);
        let other = gates.clone();
        let permit = gates.judge().await.unwrap();
        assert_eq!(other.available_judge(), 0);
        drop(permit);
        assert_eq!(other.available_judge(), 1);
    }

    #[test]
    fn zero_is_clamped_to_one() {
        let gates = AdmissionGates::new(0, 0, 0);
        assert_eq!(gates.available_browser(), 1);
    }
}
