use anyhow::Context;
use chrono::Utc;
use tally_core::model::{select_template, TaskDescriptor, TaskTemplate};

use super::read_document;
use crate::cli::args::IssueArgs;
use crate::exit_codes;

pub fn run(args: IssueArgs) -> anyhow::Result<i32> {
    let templates: Vec<TaskTemplate> = read_document(&args.templates)?;
    let template = match &args.template {
        Some(id) => templates
            .iter()
            .find(|t| &t.id == id)
            .ok_or_else(|| anyhow::anyhow!("unknown template '{}' in {}", id, args.templates.display()))?,
        None => select_template(&args.submitter, &templates)
            .ok_or_else(|| anyhow::anyhow!("{} defines no templates", args.templates.display()))?,
    };

    let task = TaskDescriptor::issue(&args.submitter, template, args.round, Utc::now());
    tracing::info!(task_id = %task.task_id, submitter = %task.submitter_identity, round = task.round, "issued task");

    let json = serde_json::to_string_pretty(&task)?;
    match &args.out {
        Some(path) => std::fs::write(path, json + "\n")
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{}", json),
    }
    Ok(exit_codes::SUCCESS)
}
