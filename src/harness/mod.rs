//! Harness orchestration
//!
//! Launches the browser, injects the client mod and the reporter runtime,
//! drives discovery and replay, and collects everything the bridge relays
//! into a [`Report`].

mod session;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use colored::Colorize;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use url::Url;

use crate::bridge::{self, BridgeReceiver, BridgeSender, Transcript};
use crate::config::{Config, Secrets};
use crate::discovery::DiscoveryEngine;
use crate::host::{runtime, CdpHost, HostLoader, PatchSystem};
use crate::replay::Replayer;
use crate::report::{IgnoreList, Report, ReportAggregator};
use crate::utils::{format_duration, plural};

pub use session::BrowserSession;

/// Per-invocation options
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Write every relayed console line to this JSON-lines file
    pub record: Option<PathBuf>,
}

/// Drives one verification run
pub struct Harness {
    config: Config,
    secrets: Secrets,
}

impl Harness {
    pub fn new(config: Config, secrets: Secrets) -> Self {
        Self { config, secrets }
    }

    /// Run the whole pipeline and return the finished report
    pub async fn run(&self, options: &RunOptions) -> Result<Report> {
        let start = Instant::now();
        let bundle_path = self.config.bundle_path();
        let bundle = fs::read_to_string(&bundle_path)
            .with_context(|| format!("Failed to read bundle: {}", bundle_path.display()))?;

        let login_url = self.config.host.channel.login_url();
        check_domain(login_url, &self.config.host.domain)?;

        let ignore = IgnoreList::from_config(&self.config.ignore)?;
        let aggregator = ReportAggregator::new(self.config.host.channel, ignore);
        let transcript = options.record.as_deref().map(Transcript::create).transpose()?;

        let (sender, rx) = bridge::channel();
        let mut collector = tokio::spawn(collect(rx, aggregator, transcript));

        let mut session = BrowserSession::launch(&self.secrets.browser_path, &self.config.browser).await?;
        session
            .inject(runtime::document_script(&bundle, &self.secrets.token, &self.config.host.domain)?)
            .await?;
        session.relay_console(sender.clone()).await?;

        info!("Opening {}", login_url);
        session.goto(login_url).await?;

        let host = Arc::new(CdpHost::new(session.page().clone()));
        let run_limit = Duration::from_secs(self.config.browser.run_timeout_secs);

        match timeout(run_limit, self.drive(host.clone(), sender.clone())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => sender.fatal(format!("{e:#}")),
            Err(_) => sender.fatal(format!("run timed out after {}", format_duration(run_limit))),
        }

        if let Err(e) = host.signal_done().await {
            warn!("Page did not take the done signal ({}), ending from here", e);
            sender.done();
        }

        let report = self.await_report(&mut collector, &sender).await?;
        session.close().await;

        info!("Run finished in {}", format_duration(start.elapsed()));
        Ok(report)
    }

    /// Wait for the host, then discover and replay
    async fn drive(&self, host: Arc<CdpHost>, sender: BridgeSender) -> Result<()> {
        self.wait_ready(&host).await?;

        let loader: Arc<dyn HostLoader> = host.clone();
        let outcome = DiscoveryEngine::new(loader, self.config.discovery.clone())
            .run()
            .await?;

        eprintln!(
            "  {} {} valid, {} invalid, {} required in {}",
            "Chunks".green().bold(),
            plural(outcome.valid_chunks.len(), "chunk", "chunks"),
            outcome.invalid_chunks.len(),
            plural(outcome.required.len(), "entry point", "entry points"),
            format_duration(outcome.elapsed)
        );

        let patches: Arc<dyn PatchSystem> = host;
        let summary = Replayer::new(patches, sender).run().await?;

        eprintln!(
            "  {} {} replayed, {} failed, {} unmatched",
            "Finds".green().bold(),
            plural(summary.searches, "search", "searches"),
            summary.failed_searches,
            plural(summary.unmatched_patches, "patch", "patches"),
        );

        Ok(())
    }

    async fn wait_ready(&self, host: &CdpHost) -> Result<()> {
        let limit = Duration::from_secs(self.config.browser.ready_timeout_secs);
        let poll = Duration::from_millis(self.config.discovery.poll_interval_ms);
        let deadline = Instant::now() + limit;

        loop {
            match host.is_ready().await {
                Ok(true) => {
                    info!("Host module system is ready");
                    return Ok(());
                }
                Ok(false) => {}
                // Navigation tears down the execution context while logging in
                Err(e) => debug!("readiness check failed: {}", e),
            }

            if Instant::now() >= deadline {
                bail!("host did not become ready within {}", format_duration(limit));
            }
            sleep(poll).await;
        }
    }

    async fn await_report(
        &self,
        collector: &mut JoinHandle<Report>,
        sender: &BridgeSender,
    ) -> Result<Report> {
        let limit = Duration::from_secs(self.config.browser.done_timeout_secs);

        match timeout(limit, &mut *collector).await {
            Ok(report) => Ok(report?),
            Err(_) => {
                warn!("No done signal after {}, finishing the report", format_duration(limit));
                sender.done();
                Ok(collector.await?)
            }
        }
    }
}

/// The runtime only activates on the host domain, so the login page must be on it
fn check_domain(login_url: &str, domain: &str) -> Result<()> {
    let url = Url::parse(login_url)?;
    match url.host_str() {
        Some(host) if host.ends_with(domain) => Ok(()),
        _ => bail!("login page {} is not on the configured host domain {}", login_url, domain),
    }
}

/// Feed bridge lines to the aggregator until the done signal
async fn collect(
    mut rx: BridgeReceiver,
    mut aggregator: ReportAggregator,
    mut transcript: Option<Transcript>,
) -> Report {
    while let Some(line) = rx.recv().await {
        if let Some(writer) = transcript.as_mut() {
            if let Err(e) = writer.append(&line) {
                warn!("Stopped recording transcript: {}", e);
                transcript = None;
            }
        }

        if aggregator.consume(&line) {
            break;
        }
    }

    if let Some(writer) = transcript {
        if let Err(e) = writer.finish() {
            warn!("Failed to flush transcript: {}", e);
        }
    }

    aggregator.finish()
}
