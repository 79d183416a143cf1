use tally_core::model::EvaluationResult;
use tally_core::storage::Store;

use crate::cli::args::HistoryArgs;
use crate::exit_codes;

pub fn run(args: HistoryArgs) -> anyhow::Result<i32> {
    if !args.db.exists() {
        anyhow::bail!("result store {} does not exist", args.db.display());
    }
    let store = Store::open(&args.db)?;
    store.init_schema()?;

    let Some(submission_id) = args.submission_id else {
        let ids = store.graded_submissions()?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&ids)?);
        } else {
            for id in ids {
                println!("{}", id);
            }
        }
        return Ok(exit_codes::SUCCESS);
    };

    let history = store.history(&submission_id)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&history)?);
    } else if history.is_empty() {
        eprintln!("no evaluations for {}", submission_id);
    } else {
        for r in &history {
            println!(
                "{}  {:<12} {:>6.2}  {}",
                r.evaluated_at.format("%Y-%m-%dT%H:%M:%SZ"),
                r.final_verdict.as_str(),
                r.score,
                stage_line(r)
            );
        }
    }
    Ok(exit_codes::SUCCESS)
}

fn stage_line(r: &EvaluationResult) -> String {
    r.stage_results
        .iter()
        .map(|s| {
            let outcome = format!("{:?}", s.outcome).to_uppercase();
            format!("{}={}", s.stage, outcome)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn print_summary(results: &[EvaluationResult]) {
    println!("{:<32} {:<12} {:>6}  STAGES", "SUBMISSION", "VERDICT", "SCORE");
    for r in results {
        println!(
            "{:<32} {:<12} {:>6.2}  {}",
            r.submission_id,
            r.final_verdict.as_str(),
            r.score,
            stage_line(r)
        );
    }
}
