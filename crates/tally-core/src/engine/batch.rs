use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::Pipeline;
use crate::model::{EvaluationResult, SubmissionRecord, TaskDescriptor};

/// Evaluates a batch with at most `concurrency.max_pipelines` submissions in
/// flight. Yields exactly one result per input, sorted by `submission_id`.
///
/// A panicking evaluation is recorded as ERROR and does not affect the rest of
/// the batch. Results the sink rejected are still returned; check
/// [`Pipeline::unpersisted`] afterwards.
pub async fn run_batch(
    pipeline: Arc<Pipeline>,
    items: Vec<(SubmissionRecord, TaskDescriptor)>,
    cancel: CancellationToken,
) -> Vec<EvaluationResult> {
    let total = items.len();
    info!(total, "starting batch");
    let mut set = JoinSet::new();

    for (submission, task) in items {
        let pipeline = pipeline.clone();
        let cancel = cancel.clone();
        set.spawn(async move {
            let permit = pipeline.gates().pipeline().await;
            let worker = {
                let pipeline = pipeline.clone();
                let submission = submission.clone();
                let task = task.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move { pipeline.evaluate(&submission, &task, &cancel).await })
            };
            let outcome = worker.await;
            drop(permit);
            match outcome {
                Ok(result) => result,
                Err(e) => {
                    error!(submission_id = %submission.submission_id, error = %e, "evaluation task failed");
                    pipeline.record_failure(
                        &submission,
                        &task.task_id,
                        &format!("evaluation aborted: {}", e),
                    )
                }
            }
        });
    }

    let mut results = Vec::with_capacity(total);
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(result) => results.push(result),
            // The outer task only awaits and builds records.
            Err(e) => error!(error = %e, "batch worker failed"),
        }
    }
    results.sort_by(|a, b| a.submission_id.cmp(&b.submission_id));
    info!(
        total,
        evaluated = results.len(),
        unpersisted = pipeline.unpersisted(),
        "batch finished"
    );
    results
}
