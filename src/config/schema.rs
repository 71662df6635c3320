//! Configuration schema definitions

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Release channel of the host application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    #[default]
    Stable,
    Canary,
}

impl Channel {
    /// Login page the harness navigates to
    pub fn login_url(&self) -> &'static str {
        match self {
            Channel::Stable => "https://discord.com/login",
            Channel::Canary => "https://canary.discord.com/login",
        }
    }

    /// Suffix appended to report titles and the webhook username
    pub fn suffix(&self) -> &'static str {
        match self {
            Channel::Stable => "",
            Channel::Canary => " (Canary)",
        }
    }
}

/// Host application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Release channel to test against
    #[serde(default)]
    pub channel: Channel,

    /// The runtime only activates on hosts ending with this domain
    #[serde(default = "default_domain")]
    pub domain: String,

    /// Browser bundle of the client mod build
    #[serde(default = "default_bundle")]
    pub bundle: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            channel: Channel::default(),
            domain: default_domain(),
            bundle: default_bundle(),
        }
    }
}

fn default_domain() -> String {
    "discord.com".to_string()
}

fn default_bundle() -> String {
    "dist/browser.js".to_string()
}

/// Chunk discovery tuning and host-specific markers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Delay between convergence sweeps
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Factory scans allowed in flight at once
    #[serde(default = "default_scan_concurrency")]
    pub scan_concurrency: usize,

    /// Asset path the loader returns for ids it cannot map
    #[serde(default = "default_unresolved_sentinel")]
    pub unresolved_sentinel: String,

    /// Chunks containing this are WASM loaders, not bundles
    #[serde(default = "default_wasm_marker")]
    pub wasm_marker: String,

    /// Every real bundle registers its modules through this idiom
    #[serde(default = "default_bundle_marker")]
    pub bundle_marker: String,

    /// Factories containing any of these have their entry points required
    /// only after the chunk graph settles
    #[serde(default = "default_defer_markers")]
    pub defer_markers: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            scan_concurrency: default_scan_concurrency(),
            unresolved_sentinel: default_unresolved_sentinel(),
            wasm_marker: default_wasm_marker(),
            bundle_marker: default_bundle_marker(),
            defer_markers: default_defer_markers(),
        }
    }
}

fn default_poll_interval() -> u64 {
    100
}

fn default_scan_concurrency() -> usize {
    16
}

fn default_unresolved_sentinel() -> String {
    "undefined.js".to_string()
}

fn default_wasm_marker() -> String {
    ".module.wasm".to_string()
}

fn default_bundle_marker() -> String {
    "(this.webpackChunkdiscord_app=this.webpackChunkdiscord_app||[]).push".to_string()
}

fn default_defer_markers() -> Vec<String> {
    vec![".Messages.GUILD_FEED_UNFEATURE_BUTTON_TEXT".to_string()]
}

/// Browser session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSettings {
    /// Extra command-line flags for Chromium
    #[serde(default = "default_browser_args")]
    pub args: Vec<String>,

    /// How long to wait for the host's module system to come up
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_secs: u64,

    /// Hard limit for the whole run
    #[serde(default = "default_run_timeout")]
    pub run_timeout_secs: u64,

    /// How long to wait for the end-of-test signal after the run finished
    #[serde(default = "default_done_timeout")]
    pub done_timeout_secs: u64,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            args: default_browser_args(),
            ready_timeout_secs: default_ready_timeout(),
            run_timeout_secs: default_run_timeout(),
            done_timeout_secs: default_done_timeout(),
        }
    }
}

fn default_browser_args() -> Vec<String> {
    vec!["--no-sandbox".to_string(), "--disable-dev-shm-usage".to_string()]
}

fn default_ready_timeout() -> u64 {
    120
}

fn default_run_timeout() -> u64 {
    600
}

fn default_done_timeout() -> u64 {
    30
}

/// Report delivery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Webhook to post the report to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,

    #[serde(default = "default_username")]
    pub username: String,

    #[serde(default = "default_avatar_url")]
    pub avatar_url: String,

    #[serde(default = "default_description")]
    pub description: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            username: default_username(),
            avatar_url: default_avatar_url(),
            description: default_description(),
        }
    }
}

fn default_username() -> String {
    "Vencord Reporter".to_string()
}

fn default_avatar_url() -> String {
    "https://cdn.discordapp.com/embed/avatars/0.png".to_string()
}

fn default_description() -> String {
    "Here's the latest Vencord Report!".to_string()
}

/// Extra known-benign host errors, on top of the built-in list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IgnoreConfig {
    /// Errors containing any of these are ignored
    #[serde(default)]
    pub substrings: Vec<String>,

    /// Errors matching any of these regexes are ignored
    #[serde(default)]
    pub patterns: Vec<String>,
}
