//! Config initialization command

use std::fs;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use crate::config::{Channel, DiscoveryConfig};

/// Write a default reporter.toml
#[derive(Args, Debug)]
pub struct InitCommand {
    /// Directory to write reporter.toml into
    #[arg(default_value = ".")]
    pub dir: String,

    /// Release channel to test against
    #[arg(long, value_enum, default_value = "stable")]
    pub channel: Channel,

    /// Overwrite an existing reporter.toml
    #[arg(short, long)]
    pub force: bool,
}

impl InitCommand {
    pub async fn execute(&self) -> Result<ExitCode> {
        let dir = Path::new(&self.dir);
        let path = dir.join("reporter.toml");

        if path.exists() && !self.force {
            bail!("{} already exists (use --force to overwrite)", path.display());
        }

        if self.dir != "." {
            fs::create_dir_all(dir).context("Failed to create config directory")?;
        }

        fs::write(&path, self.generate_config()).context("Failed to write reporter.toml")?;
        eprintln!("  {} Created {}", "✓".green(), path.display().to_string().cyan());

        eprintln!("\n  Next steps:");
        eprintln!("    {} export DISCORD_TOKEN=... CHROMIUM_BIN=...", "→".dimmed());
        eprintln!("    {} patch-reporter run", "→".dimmed());
        eprintln!();

        Ok(ExitCode::SUCCESS)
    }

    fn generate_config(&self) -> String {
        let discovery = DiscoveryConfig::default();
        let channel = match self.channel {
            Channel::Stable => "stable",
            Channel::Canary => "canary",
        };

        format!(
r#"# Patch Reporter configuration
# Secrets are read from the environment only: DISCORD_TOKEN, CHROMIUM_BIN,
# and optionally DISCORD_WEBHOOK.

[host]
channel = "{channel}"
domain = "discord.com"
bundle = "dist/browser.js"

[discovery]
poll_interval_ms = {poll}
scan_concurrency = {concurrency}
# Entry points of factories containing any of these are required last
defer_markers = {defer:?}

[browser]
args = ["--no-sandbox", "--disable-dev-shm-usage"]
ready_timeout_secs = 120
run_timeout_secs = 600
done_timeout_secs = 30

[report]
username = "Vencord Reporter"

[ignore]
# Extra host errors to ignore, on top of the built-in list
substrings = []
patterns = []
"#,
            poll = discovery.poll_interval_ms,
            concurrency = discovery.scan_concurrency,
            defer = discovery.defer_markers,
        )
    }
}
