use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "tally",
    version,
    about = "Grade code submissions: repository inspection, README judging and live-site checks"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Issue a task to a submitter and print its descriptor as JSON
    Issue(IssueArgs),
    /// Write a sample tally.yaml
    Init(InitArgs),
    /// Evaluate submissions and append the results to the store
    Evaluate(EvaluateArgs),
    /// Show stored evaluations
    History(HistoryArgs),
    Version,
}

#[derive(Parser, Debug)]
pub struct IssueArgs {
    /// Submitter identity (email)
    #[arg(long)]
    pub submitter: String,

    /// Template registry (YAML or JSON list of templates)
    #[arg(long, default_value = "templates.yaml")]
    pub templates: PathBuf,

    /// Use this template instead of the deterministic assignment
    #[arg(long)]
    pub template: Option<String>,

    #[arg(long, default_value_t = 1)]
    pub round: u32,

    /// Write the descriptor here instead of stdout
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    #[arg(long, default_value = "tally.yaml")]
    pub config: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
pub struct EvaluateArgs {
    /// Config file; defaults apply when omitted
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// JSON list of issued task descriptors
    #[arg(long)]
    pub tasks: PathBuf,

    /// JSON list of submission records
    #[arg(long, conflicts_with = "notifications", required_unless_present = "notifications")]
    pub submissions: Option<PathBuf>,

    /// JSON list of completion notifications; each must answer an issued task
    #[arg(long)]
    pub notifications: Option<PathBuf>,

    #[arg(long, default_value = "tally.db")]
    pub db: PathBuf,

    /// Print full results as JSON instead of a summary
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct HistoryArgs {
    /// Submission to show; lists graded submissions when omitted
    pub submission_id: Option<String>,

    #[arg(long, default_value = "tally.db")]
    pub db: PathBuf,

    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn evaluate_requires_an_input_list() {
        assert!(Cli::try_parse_from(["tally", "evaluate", "--tasks", "t.json"]).is_err());
        assert!(Cli::try_parse_from([
            "tally",
            "evaluate",
            "--tasks",
            "t.json",
            "--submissions",
            "s.json",
            "--notifications",
            "n.json",
        ])
        .is_err());
        let cli = Cli::try_parse_from([
            "tally",
            "evaluate",
            "--tasks",
            "t.json",
            "--notifications",
            "n.json",
        ])
        .unwrap();
        match cli.cmd {
            Command::Evaluate(a) => {
                assert_eq!(a.db, PathBuf::from("tally.db"));
                assert!(a.submissions.is_none());
            }
            _ => panic!("expected evaluate"),
        }
    }
}
