//! Command-line interface for the patch reporter
//!
//! Provides the main CLI structure using clap with subcommands for:
//! - `run`: Full verification run against the live host
//! - `report`: Re-render a report from a recorded transcript
//! - `init`: Write a default `reporter.toml`

mod init;
mod report;
mod run;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

use crate::config::ReportConfig;
use crate::report::{render_text, webhook, Report, WebhookPayload};

pub use init::InitCommand;
pub use report::ReportCommand;
pub use run::RunCommand;

/// Patch Reporter - verifies client mod patches against the live host
#[derive(Parser, Debug)]
#[command(name = "patch-reporter")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to reporter.toml config file
    #[arg(short, long, global = true, default_value = "reporter.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Launch the browser and verify every patch and find
    Run(RunCommand),

    /// Render a report from a recorded transcript
    Report(ReportCommand),

    /// Write a default reporter.toml
    Init(InitCommand),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<ExitCode> {
        print_banner();

        match &self.command {
            Commands::Run(cmd) => cmd.execute(&self.config).await,
            Commands::Report(cmd) => cmd.execute(&self.config).await,
            Commands::Init(cmd) => cmd.execute().await,
        }
    }
}

/// Where a finished report goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Output {
    Markdown,
    Json,
}

/// Print the report, post it if a webhook is configured, and map it to the
/// process exit code
pub(crate) async fn deliver(report: &Report, config: &ReportConfig, output: Output) -> Result<ExitCode> {
    match output {
        Output::Markdown => print!("{}", render_text(report)),
        Output::Json => println!("{}", serde_json::to_string_pretty(report)?),
    }

    if let Some(url) = &config.webhook_url {
        webhook::post(url, &WebhookPayload::new(report, config)).await;
    }

    print_summary(report);
    Ok(ExitCode::from(report.exit_code()))
}

fn print_summary(report: &Report) {
    eprintln!();
    if let Some(fatal) = &report.fatal {
        eprintln!("{} {}", "✗ Fatal:".red().bold(), fatal);
    }

    if report.has_failures() {
        eprintln!(
            "{} {} bad patches, {} bad finds, {} bad starts, {} host errors",
            "✗".red().bold(),
            report.bad_patches.len(),
            report.bad_webpack_finds.len(),
            report.bad_starts.len(),
            report.other_errors.len(),
        );
    } else if report.fatal.is_none() {
        eprintln!("{} {}", "✓".green().bold(), "All patches verified".green());
    }

    if !report.ignored_errors.is_empty() {
        eprintln!("  {} ignored host errors", report.ignored_errors.len().to_string().dimmed());
    }
}

/// Print the banner
fn print_banner() {
    eprintln!(
        "\n{} {} {}\n",
        "⚡".cyan(),
        "Patch Reporter".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}
