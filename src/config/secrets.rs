//! Environment-provided secrets

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Configuration problems that abort the run before any browser work
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingSecret(&'static str),
}

/// Secrets required before the harness does anything
#[derive(Clone)]
pub struct Secrets {
    /// Host account token used for login
    pub token: String,

    /// Chromium executable
    pub browser_path: PathBuf,
}

impl Secrets {
    pub const TOKEN_VAR: &'static str = "DISCORD_TOKEN";
    pub const BROWSER_VAR: &'static str = "CHROMIUM_BIN";

    /// Read both secrets from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read both secrets through `lookup`; blank values count as missing
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let require = |name: &'static str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .ok_or(ConfigError::MissingSecret(name))
        };

        Ok(Self {
            token: require(Self::TOKEN_VAR)?,
            browser_path: PathBuf::from(require(Self::BROWSER_VAR)?),
        })
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("token", &"<redacted>")
            .field("browser_path", &self.browser_path)
            .finish()
    }
}
