//! Offline report rendering from a recorded transcript

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use tracing::{info, warn};

use super::{deliver, Output};
use crate::bridge::read_transcript;
use crate::config::{Channel, Config};
use crate::report::{IgnoreList, ReportAggregator};

/// Render a report from a transcript written by `run --record`
#[derive(Args, Debug)]
pub struct ReportCommand {
    /// Transcript file
    pub transcript: PathBuf,

    /// Release channel the transcript was recorded on
    #[arg(long, value_enum)]
    pub channel: Option<Channel>,

    /// Post the report to this webhook
    #[arg(long, env = "DISCORD_WEBHOOK", hide_env_values = true)]
    pub webhook: Option<String>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

impl ReportCommand {
    pub async fn execute(&self, config_path: &str) -> Result<ExitCode> {
        let mut config = Config::load_or_default(config_path)?;
        if let Some(webhook) = &self.webhook {
            config.report.webhook_url = Some(webhook.clone());
        }

        let lines = read_transcript(&self.transcript)?;
        info!("Read {} lines from {}", lines.len(), self.transcript.display());

        let channel = self.channel.unwrap_or(config.host.channel);
        let mut aggregator = ReportAggregator::new(channel, IgnoreList::from_config(&config.ignore)?);

        let mut done = false;
        for line in &lines {
            if aggregator.consume(line) {
                done = true;
                break;
            }
        }
        if !done {
            warn!("Transcript ends without a done signal; the run may have been cut short");
        }

        let report = aggregator.finish();
        let output = if self.json { Output::Json } else { Output::Markdown };
        deliver(&report, &config.report, output).await
    }
}
