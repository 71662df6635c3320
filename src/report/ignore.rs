//! Known-benign host console errors

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::IgnoreConfig;

const BUILTIN_SUBSTRINGS: &[&str] = &[
    "KeybindStore: Looking for callback action",
    "Unable to process domain list delta: Client revision number is null",
    "Downloading the full bad domains file",
    "search for 'name' in undefined",
    "Attempting to set fast connect zstd when unsupported",
];

static BUILTIN_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"\[GatewaySocket\].{0,110}Cannot access '"]
        .iter()
        .map(|p| Regex::new(p).expect("builtin ignore pattern is valid"))
        .collect()
});

/// Browser noise for failed resource loads
const RESOURCE_FAILURE_PREFIX: &str = "Failed to load resource: the server responded with a status of";

/// Whether an untagged console error is a host error at all.
/// Module-system chatter is reported through its own channels.
pub fn is_host_error(text: &str) -> bool {
    !text.is_empty() && !text.starts_with(RESOURCE_FAILURE_PREFIX) && !text.contains("Webpack")
}

/// Substring and regex filters for host errors
#[derive(Debug, Clone)]
pub struct IgnoreList {
    substrings: Vec<String>,
    patterns: Vec<Regex>,
}

impl Default for IgnoreList {
    fn default() -> Self {
        Self {
            substrings: BUILTIN_SUBSTRINGS.iter().map(|s| s.to_string()).collect(),
            patterns: BUILTIN_PATTERNS.clone(),
        }
    }
}

impl IgnoreList {
    /// Built-in list extended with the configured entries
    pub fn from_config(config: &IgnoreConfig) -> Result<Self, regex::Error> {
        let mut list = Self::default();
        list.substrings.extend(config.substrings.iter().cloned());
        for pattern in &config.patterns {
            list.patterns.push(Regex::new(pattern)?);
        }
        Ok(list)
    }

    pub fn is_ignored(&self, text: &str) -> bool {
        self.substrings.iter().any(|s| text.contains(s.as_str()))
            || self.patterns.iter().any(|re| re.is_match(text))
    }

    pub fn len(&self) -> usize {
        self.substrings.len() + self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
