//! symclone CLI
//!
//! Converges a destination directory onto a source tree of symlinks and
//! reports whether anything changed.

mod cli;
mod error;
mod logging;
mod task;

use clap::Parser;
use colored::Colorize;
use symclone_core::{ConvergeReport, Converger};
use symclone_fs::OsFs;

use cli::Cli;
use error::{CliError, Result};
use task::Task;

fn main() {
    if let Err(e) = run() {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    logging::init(cli.verbose)
        .map_err(|e| CliError::user(format!("Failed to initialise logging: {}", e)))?;
    tracing::debug!("Verbose mode enabled");

    let task = match &cli.task {
        Some(path) => Task::load(path)?,
        None => Task::default(),
    };
    let invocation = task.with_overrides(&cli)?.into_invocation()?;
    let desired = invocation.request.resolve()?;

    let outcome = Converger::new(&OsFs).converge(
        &invocation.source,
        &invocation.destination,
        &desired,
    )?;
    let report = ConvergeReport::new(&invocation.source, outcome);

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }
    Ok(())
}

fn print_summary(report: &ConvergeReport) {
    let status = if report.changed {
        "changed".yellow().bold()
    } else {
        "ok".green().bold()
    };
    println!(
        "{} {} {} {}",
        status,
        report.path.path.display(),
        "<-".dimmed(),
        report.src.display()
    );
    for item in &report.drift {
        let path = if item.path.as_os_str().is_empty() {
            ".".to_string()
        } else {
            item.path.display().to_string()
        };
        println!("  {} {}: {}", item.kind.to_string().cyan(), path, item.description);
    }
}
