//! Webhook delivery of a report

use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use super::render::code_block;
use super::Report;
use crate::config::ReportConfig;
use crate::utils::truncate_chars;

pub const COLOR_FAILED: u32 = 0xff0000;
pub const COLOR_PASSED: u32 = 0x00ff00;

/// Hard cap the webhook API puts on one embed description
const EMBED_DESCRIPTION_LIMIT: usize = 4096;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookPayload {
    pub description: String,
    pub username: String,
    pub avatar_url: String,
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embed {
    pub title: String,
    pub color: u32,
    pub description: String,
}

impl Embed {
    fn section(title: &str, entries: Vec<String>, separator: &str) -> Self {
        let color = if entries.is_empty() { COLOR_PASSED } else { COLOR_FAILED };
        let description = if entries.is_empty() {
            "None".to_string()
        } else {
            truncate_chars(&entries.join(separator), EMBED_DESCRIPTION_LIMIT).to_string()
        };

        Self {
            title: title.to_string(),
            color,
            description,
        }
    }
}

impl WebhookPayload {
    /// Build the four-panel payload for `report`
    pub fn new(report: &Report, config: &ReportConfig) -> Self {
        let patches = report
            .bad_patches
            .iter()
            .map(|p| {
                let mut entry = format!(
                    "**__{} ({}):__**\nID: `{}`\nMatch: {}",
                    p.plugin,
                    p.kind,
                    p.id,
                    code_block(&p.match_text, 0)
                );
                if let Some(error) = &p.error {
                    entry.push_str(&format!("\nError: {}", code_block(error, 0)));
                }
                entry
            })
            .collect();

        let finds = report
            .bad_webpack_finds
            .iter()
            .map(|f| code_block(f, 0))
            .collect();

        let starts = report
            .bad_starts
            .iter()
            .map(|s| format!("**__{}:__**\n{}", s.plugin, code_block(&s.error, 0)))
            .collect();

        let errors = if report.other_errors.is_empty() {
            Vec::new()
        } else {
            vec![code_block(&report.other_errors.join("\n"), 0)]
        };

        let mut description = config.description.clone();
        if let Some(fatal) = &report.fatal {
            description.push_str(&format!("\n\n**Fatal error:**\n{}", code_block(fatal, 0)));
        }

        Self {
            description,
            username: format!("{}{}", config.username, report.channel.suffix()),
            avatar_url: config.avatar_url.clone(),
            embeds: vec![
                Embed::section("Bad Patches", patches, "\n\n"),
                Embed::section("Bad Webpack Finds", finds, "\n"),
                Embed::section("Bad Starts", starts, "\n\n"),
                Embed::section("Discord Errors", errors, "\n"),
            ],
        }
    }
}

/// Post `payload`. Failures are logged and otherwise ignored.
pub async fn post(url: &str, payload: &WebhookPayload) -> bool {
    let client = match reqwest::Client::builder().timeout(Duration::from_secs(30)).build() {
        Ok(client) => client,
        Err(e) => {
            warn!("Failed to build webhook client: {}", e);
            return false;
        }
    };

    let result = client
        .post(url)
        .json(payload)
        .send()
        .await
        .and_then(|response| response.error_for_status());

    match result {
        Ok(response) => {
            info!("Report posted to webhook ({})", response.status());
            true
        }
        Err(e) => {
            warn!("Failed to post report to webhook: {}", e);
            false
        }
    }
}
