use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

fn main() -> ExitCode {
    if let Err(err) = try_main() {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn try_main() -> anyhow::Result<()> {
    let cli = jobsheet::cli::Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    jobsheet::logging::init(level).context("init logging")?;
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        jobsheet::cli::Command::Fetch(args) => {
            jobsheet::fetch::run(args).context("fetch")?;
        }
        jobsheet::cli::Command::Export(args) => {
            jobsheet::export::run(args).context("export")?;
        }
    }

    Ok(())
}
