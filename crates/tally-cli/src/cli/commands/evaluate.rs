use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use tally_core::config::{load_config, GraderConfig};
use tally_core::engine::{run_batch, Pipeline};
use tally_core::model::{EvaluationResult, Notification, SubmissionRecord, TaskDescriptor};
use tally_core::storage::Store;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::history::print_summary;
use super::read_document;
use crate::cli::args::EvaluateArgs;
use crate::exit_codes;

pub async fn run(args: EvaluateArgs) -> anyhow::Result<i32> {
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GraderConfig::default(),
    }
    .with_env();
    config.validate()?;

    let tasks: Vec<TaskDescriptor> = read_document(&args.tasks)?;
    let by_id: HashMap<&str, &TaskDescriptor> =
        tasks.iter().map(|t| (t.task_id.as_str(), t)).collect();

    let submissions = match (&args.submissions, &args.notifications) {
        (Some(path), _) => read_document::<Vec<SubmissionRecord>>(path)?,
        (None, Some(path)) => accept_notifications(read_document(path)?, &by_id),
        (None, None) => anyhow::bail!("one of --submissions or --notifications is required"),
    };

    let mut items = Vec::with_capacity(submissions.len());
    for submission in submissions {
        let task = by_id.get(submission.task_ref.as_str()).ok_or_else(|| {
            anyhow::anyhow!(
                "submission {} answers unknown task {}",
                submission.submission_id,
                submission.task_ref
            )
        })?;
        items.push((submission, (*task).clone()));
    }

    let store = Store::open(&args.db)?;
    store
        .init_schema()
        .with_context(|| format!("failed to prepare {}", args.db.display()))?;
    let pipeline = Arc::new(Pipeline::from_config(&config, Arc::new(store))?);

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; cancelling evaluations in flight");
                cancel.cancel();
            }
        })
    };
    let results = run_batch(pipeline.clone(), items, cancel).await;
    interrupt.abort();

    report(&results, args.json)?;
    let unpersisted = pipeline.unpersisted();
    if unpersisted > 0 {
        error!(db = %args.db.display(), unpersisted, "evaluations were not stored");
        return Ok(exit_codes::INTERNAL_ERROR);
    }
    info!(db = %args.db.display(), evaluated = results.len(), "results stored");
    Ok(exit_codes::for_results(&results))
}

/// Keeps notifications that answer an issued task; rejected ones are logged and dropped.
/// A notification without `received_at` is timed at intake.
fn accept_notifications(
    notifications: Vec<Notification>,
    tasks: &HashMap<&str, &TaskDescriptor>,
) -> Vec<SubmissionRecord> {
    let now = Utc::now();
    notifications
        .into_iter()
        .filter_map(|n| {
            let Some(task) = tasks.get(n.task.as_str()) else {
                warn!(task = %n.task, email = %n.email, "notification for unknown task rejected");
                return None;
            };
            if n.received_at.is_none() {
                warn!(task_id = %task.task_id, "notification has no received_at; using intake time");
            }
            match n.into_submission(task, now) {
                Ok(s) => Some(s),
                Err(e) => {
                    warn!(task_id = %task.task_id, error = %e, "notification rejected");
                    None
                }
            }
        })
        .collect()
}

fn report(results: &[EvaluationResult], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
    } else {
        print_summary(results);
    }
    Ok(())
}
