use tally_core::config::write_sample_config;

use crate::cli::args::InitArgs;
use crate::exit_codes;

pub fn run(args: InitArgs) -> anyhow::Result<i32> {
    if args.config.exists() && !args.force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            args.config.display()
        );
    }
    write_sample_config(&args.config)?;
    println!("Created {}", args.config.display());
    println!("Set OPENAI_API_KEY and TALLY_GITHUB_TOKEN before running `tally evaluate`.");
    Ok(exit_codes::SUCCESS)
}
