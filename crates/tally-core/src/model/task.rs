//! Task issuance: deterministic per-submitter task ids and notification intake.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::{CheckSpec, SubmissionRecord};

/// Length (hex chars) of the per-submitter seed.
pub const SEED_LEN: usize = 6;

/// A task template from the template registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTemplate {
    pub id: String,
    pub brief: String,
    #[serde(default)]
    pub checks: Vec<CheckSpec>,
}

/// Immutable record identifying one issued task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub task_id: String,
    pub submitter_identity: String,
    pub task_template: String,
    pub seed: String,
    pub nonce: Uuid,
    pub round: u32,
    pub brief: String,
    #[serde(default)]
    pub checks: Vec<CheckSpec>,
    pub created_at: DateTime<Utc>,
}

/// `seed` is a pure function of `(submitter, template)`. The NUL separator keeps
/// `("ab", "c")` and `("a", "bc")` apart.
pub fn seed_for(submitter: &str, template: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(submitter.as_bytes());
    hasher.update([0u8]);
    hasher.update(template.as_bytes());
    let mut seed = hex::encode(hasher.finalize());
    seed.truncate(SEED_LEN);
    seed
}

/// Deterministically assigns one of `templates` to `submitter`.
pub fn select_template<'a>(submitter: &str, templates: &'a [TaskTemplate]) -> Option<&'a TaskTemplate> {
    if templates.is_empty() {
        return None;
    }
    let digest = Sha256::digest(submitter.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    let idx = (u64::from_be_bytes(head) % templates.len() as u64) as usize;
    templates.get(idx)
}

impl TaskDescriptor {
    pub fn issue(submitter: &str, template: &TaskTemplate, round: u32, now: DateTime<Utc>) -> Self {
        let seed = seed_for(submitter, &template.id);
        Self {
            task_id: format!("{}-{}", template.id, seed),
            submitter_identity: submitter.to_string(),
            task_template: template.id.clone(),
            seed,
            nonce: Uuid::new_v4(),
            round,
            brief: template.brief.clone(),
            checks: template.checks.clone(),
            created_at: now,
        }
    }
}

/// Completion notification as posted by the submitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub email: String,
    pub task: String,
    pub round: u32,
    pub nonce: String,
    pub repo_url: String,
    pub commit_sha: String,
    pub pages_url: String,
    /// When the notification reached the intake endpoint. Grading may happen much
    /// later, so this, not the grading time, is the submission time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotificationError {
    #[error("notification for unknown task {got} (expected {expected})")]
    TaskMismatch { expected: String, got: String },
    #[error("notification from {got} does not match task owner")]
    SubmitterMismatch { got: String },
    #[error("round mismatch: expected {expected}, got {got}")]
    RoundMismatch { expected: u32, got: u32 },
    #[error("nonce does not match issued task")]
    NonceMismatch,
    #[error("missing field: {0}")]
    MissingField(&'static str),
}

impl Notification {
    /// Accepts the notification only if it answers `task` exactly. `now` stands in
    /// for a missing `received_at`.
    pub fn into_submission(
        self,
        task: &TaskDescriptor,
        now: DateTime<Utc>,
    ) -> Result<SubmissionRecord, NotificationError> {
        if self.task != task.task_id {
            return Err(NotificationError::TaskMismatch {
                expected: task.task_id.clone(),
                got: self.task,
            });
        }
        if self.email != task.submitter_identity {
            return Err(NotificationError::SubmitterMismatch { got: self.email });
        }
        if self.round != task.round {
            return Err(NotificationError::RoundMismatch {
                expected: task.round,
                got: self.round,
            });
        }
        match Uuid::parse_str(self.nonce.trim()) {
            Ok(nonce) if nonce == task.nonce => {}
            _ => return Err(NotificationError::NonceMismatch),
        }
        for (field, value) in [
            ("repo_url", &self.repo_url),
            ("commit_sha", &self.commit_sha),
            ("pages_url", &self.pages_url),
        ] {
            if value.trim().is_empty() {
                return Err(NotificationError::MissingField(field));
            }
        }

        Ok(SubmissionRecord {
            submission_id: format!("{}-r{}", task.task_id, task.round),
            repo_url: self.repo_url,
            commit_sha: self.commit_sha,
            pages_url: self.pages_url,
            submitted_at: self.received_at.unwrap_or(now),
            task_ref: task.task_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CheckKind;
    use chrono::TimeZone;

    fn template(id: &str) -> TaskTemplate {
        TaskTemplate {
            id: id.into(),
            brief: format!("build {id}"),
            checks: vec![CheckSpec::new(
                "title",
                CheckKind::TitleContains {
                    expected: id.into(),
                },
            )],
        }
    }

    fn notification_for(task: &TaskDescriptor) -> Notification {
        Notification {
            email: task.submitter_identity.clone(),
            task: task.task_id.clone(),
            round: task.round,
            nonce: task.nonce.to_string(),
            repo_url: "https://github.com/alice/calc".into(),
            commit_sha: "abc123".into(),
            pages_url: "https://alice.github.io/calc/".into(),
            received_at: None,
        }
    }

    #[test]
    fn issue_derives_task_id_from_seed() {
        let now = Utc.with_ymd_and_hms(2025, 10, 1, 12, 0, 0).unwrap();
        let t = TaskDescriptor::issue("alice@example.com", &template("calculator"), 1, now);
        assert_eq!(t.seed.len(), SEED_LEN);
        assert_eq!(t.task_id, format!("calculator-{}", t.seed));
        assert_eq!(t.seed, seed_for("alice@example.com", "calculator"));
        assert_eq!(t.created_at, now);
        assert_eq!(t.checks.len(), 1);
    }

    #[test]
    fn nonce_differs_between_issues() {
        let now = Utc::now();
        let a = TaskDescriptor::issue("alice@example.com", &template("calculator"), 1, now);
        let b = TaskDescriptor::issue("alice@example.com", &template("calculator"), 1, now);
        assert_eq!(a.task_id, b.task_id);
        assert_ne!(a.nonce, b.nonce);
    }

    #[test]
    fn select_template_is_stable() {
        let templates = vec![template("a"), template("b"), template("c")];
        let first = select_template("bob@example.com", &templates).unwrap().id.clone();
        for _ in 0..10 {
            assert_eq!(select_template("bob@example.com", &templates).unwrap().id, first);
        }
        assert!(select_template("bob@example.com", &[]).is_none());
    }

    #[test]
    fn notification_round_trip_accepts_matching_fields() {
        let task = TaskDescriptor::issue("alice@example.com", &template("calculator"), 1, Utc::now());
        let received = Utc::now();
        let sub = notification_for(&task).into_submission(&task, received).unwrap();
        assert_eq!(sub.task_ref, task.task_id);
        assert_eq!(sub.submitted_at, received);
        assert_eq!(sub.submission_id, format!("{}-r1", task.task_id));
    }

    #[test]
    fn notification_keeps_its_own_receipt_time() {
        let issued = Utc.with_ymd_and_hms(2025, 10, 1, 12, 0, 0).unwrap();
        let task = TaskDescriptor::issue("alice@example.com", &template("calculator"), 1, issued);
        let mut n = notification_for(&task);
        n.received_at = Some(issued - chrono::Duration::minutes(5));

        let sub = n.into_submission(&task, Utc::now()).unwrap();
        assert_eq!(sub.submitted_at, issued - chrono::Duration::minutes(5));
    }

    #[test]
    fn seed_separates_submitter_from_template() {
        assert_ne!(seed_for("ab", "c"), seed_for("a", "bc"));
        assert_ne!(seed_for("alice@example.com", "calc"), seed_for("alice@example.comc", "alc"));
    }

    #[test]
    fn notification_with_wrong_nonce_is_rejected() {
        let task = TaskDescriptor::issue("alice@example.com", &template("calculator"), 1, Utc::now());
        let mut n = notification_for(&task);
        n.nonce = Uuid::new_v4().to_string();
        assert_eq!(
            n.into_submission(&task, Utc::now()),
            Err(NotificationError::NonceMismatch)
        );
    }

    #[test]
    fn notification_with_wrong_round_is_rejected() {
        let task = TaskDescriptor::issue("alice@example.com", &template("calculator"), 1, Utc::now());
        let mut n = notification_for(&task);
        n.round = 2;
        assert!(matches!(
            n.into_submission(&task, Utc::now()),
            Err(NotificationError::RoundMismatch { expected: 1, got: 2 })
        ));
    }

    #[test]
    fn notification_missing_pages_url_is_rejected() {
        let task = TaskDescriptor::issue("alice@example.com", &template("calculator"), 1, Utc::now());
        let mut n = notification_for(&task);
        n.pages_url = "  ".into();
        assert_eq!(
            n.into_submission(&task, Utc::now()),
            Err(NotificationError::MissingField("pages_url"))
        );
    }
}
