//! Evaluation pipeline for graded code submissions.
//!
//! A submission is graded by three stages run strictly in order:
//!
//! 1. [`inspector::RepositoryInspector`]: commit timing (anti-backdating) and license.
//! 2. [`judge::ContentJudge`]: README quality verdict from an external LLM judge.
//! 3. [`site::LiveSiteChecker`]: declarative checks against the deployed page.
//!
//! [`engine::Pipeline`] sequences the stages, aggregates a verdict and appends one
//! [`model::EvaluationResult`] per run to a [`storage::ResultSink`].
//! [`engine::run_batch`] evaluates many submissions under bounded concurrency.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tally_core::config::GraderConfig;
//! use tally_core::engine::Pipeline;
//! use tally_core::storage::Store;
//!
//! # async fn example(
//! #     submission: tally_core::model::SubmissionRecord,
//! #     task: tally_core::model::TaskDescriptor,
//! # ) -> anyhow::Result<()> {
//! let config = GraderConfig::default();
//! let store = Store::open(std::path::Path::new("results.db"))?;
//! store.init_schema()?;
//!
//! let pipeline = Pipeline::from_config(&config, Arc::new(store))?;
//! let result = pipeline
//!     .evaluate(&submission, &task, &tokio_util::sync::CancellationToken::new())
//!     .await;
//! println!("{} -> {:?} ({:.1})", result.submission_id, result.final_verdict, result.score);
//! # Ok(())
//! # }
//! ```

pub mod admission;
pub mod config;
pub mod engine;
pub mod errors;
pub mod inspector;
pub mod judge;
pub mod license;
pub mod model;
pub mod providers;
pub mod repo;
pub mod retry;
pub mod site;
pub mod storage;

pub use errors::ErrorClass;
pub use model::{
    CheckKind, CheckOutcome, CheckResult, CheckSpec, EvaluationResult, StageName, StageOutcome,
    StageResult, SubmissionRecord, TaskDescriptor, Verdict,
};
