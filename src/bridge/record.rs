//! Verification records decoded from the console protocol

use serde::{Deserialize, Serialize};

/// Regex source the host's patch system uses for minified identifiers
pub const ANONYMOUS_IDENT: &str = r"[A-Za-z_$][\w$]*";

/// Stable token substituted for [`ANONYMOUS_IDENT`] in reports
pub const IDENT_PLACEHOLDER: &str = r"\i";

/// A patch that errored, had no effect, or found no module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadPatch {
    pub plugin: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    #[serde(rename = "match")]
    pub match_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BadPatch {
    /// Build a record, normalizing the host's identifier idiom in the match text
    pub fn new(
        plugin: impl Into<String>,
        kind: impl Into<String>,
        id: impl Into<String>,
        match_text: &str,
        error: Option<String>,
    ) -> Self {
        Self {
            plugin: plugin.into(),
            kind: kind.into(),
            id: id.into(),
            match_text: match_text.replace(ANONYMOUS_IDENT, IDENT_PLACEHOLDER),
            error,
        }
    }
}

/// A plugin that failed to start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadStart {
    pub plugin: String,
    pub error: String,
}

/// One reportable finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum VerificationRecord {
    BadPatch(BadPatch),
    BadWebpackFind { description: String },
    BadStart(BadStart),
    OtherError { text: String },
}
