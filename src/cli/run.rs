//! Live verification run

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::{deliver, Output};
use crate::config::{Channel, Config, Secrets};
use crate::harness::{Harness, RunOptions};

/// Verify every patch against the live host
#[derive(Args, Debug)]
pub struct RunCommand {
    /// Release channel to test against
    #[arg(long, value_enum)]
    pub channel: Option<Channel>,

    /// Browser bundle of the client mod build
    #[arg(short, long)]
    pub bundle: Option<String>,

    /// Record relayed console lines to a JSON-lines transcript
    #[arg(long)]
    pub record: Option<PathBuf>,

    /// Post the report to this webhook
    #[arg(long, env = "DISCORD_WEBHOOK", hide_env_values = true)]
    pub webhook: Option<String>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

impl RunCommand {
    pub async fn execute(&self, config_path: &str) -> Result<ExitCode> {
        // Secrets first; nothing else runs without them
        let secrets = Secrets::from_env()?;

        let mut config = Config::load_or_default(config_path)?;
        if let Some(channel) = self.channel {
            config.host.channel = channel;
        }
        if let Some(bundle) = &self.bundle {
            config.host.bundle = bundle.clone();
        }
        if let Some(webhook) = &self.webhook {
            config.report.webhook_url = Some(webhook.clone());
        }

        eprintln!(
            "{} Verifying {} against {}...\n",
            "→".blue(),
            config.bundle_path().display().to_string().cyan(),
            config.host.channel.login_url().cyan()
        );

        let options = RunOptions {
            record: self.record.clone(),
        };
        let report = Harness::new(config.clone(), secrets).run(&options).await?;

        let output = if self.json { Output::Json } else { Output::Markdown };
        deliver(&report, &config.report, output).await
    }
}
