//! Configuration handling for the reporter
//!
//! Tuning lives in an optional `reporter.toml`; secrets only ever come from
//! the environment (see [`Secrets`]).

mod schema;
mod secrets;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use schema::*;
pub use secrets::{ConfigError, Secrets};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Host application and build artifact
    #[serde(default)]
    pub host: HostConfig,

    /// Chunk discovery settings
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Browser session settings
    #[serde(default)]
    pub browser: BrowserSettings,

    /// Report delivery
    #[serde(default)]
    pub report: ReportConfig,

    /// Additional ignored host errors
    #[serde(default)]
    pub ignore: IgnoreConfig,

    /// Root directory (computed from config file location)
    #[serde(skip)]
    pub root: PathBuf,
}

impl Config {
    /// Load configuration from a file path
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let canonical_path = absolute(path.as_ref())?;

        let content = fs::read_to_string(&canonical_path)
            .with_context(|| format!("Failed to read config file: {}", canonical_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", canonical_path.display()))?;

        // Set root directory to the directory containing the config file
        config.root = canonical_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        config.validate()?;

        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults rooted at the
    /// current directory
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load(path);
        }

        debug!("No config at {}, using defaults", path.display());
        Ok(Self {
            root: std::env::current_dir()?,
            ..Self::default()
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.discovery.poll_interval_ms == 0 {
            anyhow::bail!("discovery.poll_interval_ms must be greater than zero");
        }

        if self.discovery.scan_concurrency == 0 {
            anyhow::bail!("discovery.scan_concurrency must be greater than zero");
        }

        if self.discovery.bundle_marker.is_empty() {
            anyhow::bail!("discovery.bundle_marker must not be empty");
        }

        for pattern in &self.ignore.patterns {
            Regex::new(pattern)
                .with_context(|| format!("Invalid ignore pattern: {pattern}"))?;
        }

        Ok(())
    }

    /// Absolute path of the client mod's browser bundle
    pub fn bundle_path(&self) -> PathBuf {
        self.root.join(&self.host.bundle)
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_partial_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reporter.toml");
        fs::write(
            &path,
            r#"
[host]
channel = "canary"

[discovery]
poll_interval_ms = 250

[ignore]
patterns = ["^Noise \\d+$"]
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();

        assert_eq!(config.host.channel, Channel::Canary);
        assert_eq!(config.host.domain, "discord.com");
        assert_eq!(config.discovery.poll_interval_ms, 250);
        assert_eq!(config.discovery.scan_concurrency, 16);
        assert_eq!(config.root, dir.path());
        assert_eq!(config.bundle_path(), dir.path().join("dist/browser.js"));
    }

    #[test]
    fn test_rejects_bad_ignore_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reporter.toml");
        fs::write(&path, "[ignore]\npatterns = [\"(unclosed\"]\n").unwrap();

        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = Config::load_or_default("/definitely/not/here/reporter.toml").unwrap();

        assert_eq!(config.host.channel, Channel::Stable);
        assert_eq!(config.discovery.unresolved_sentinel, "undefined.js");
    }
}
