pub mod evaluate;
pub mod history;
pub mod init;
pub mod issue;

use std::path::Path;

use anyhow::Context;

use super::args::{Cli, Command};
use crate::exit_codes::SUCCESS;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Issue(args) => issue::run(args),
        Command::Init(args) => init::run(args),
        Command::Evaluate(args) => evaluate::run(args).await,
        Command::History(args) => history::run(args),
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(SUCCESS)
        }
    }
}

/// Reads a `.json` document, or YAML for any other extension.
pub(crate) fn read_document<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let parsed = if path.extension().is_some_and(|e| e == "json") {
        serde_json::from_str(&raw).map_err(anyhow::Error::from)
    } else {
        serde_yaml::from_str(&raw).map_err(anyhow::Error::from)
    };
    parsed.with_context(|| format!("failed to parse {}", path.display()))
}
