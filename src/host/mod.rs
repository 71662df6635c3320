//! Host application capability seams
//!
//! The reporter never touches the host's module system directly. Everything it
//! needs is expressed as two narrow traits:
//! - [`HostLoader`]: the bundler runtime (module table, chunk URLs, require)
//! - [`PatchSystem`]: the client mod's search history and patch bookkeeping
//!
//! [`CdpHost`] implements both over the DevTools protocol against the runtime
//! script injected by [`runtime::document_script`].

mod cdp;
pub mod runtime;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use cdp::CdpHost;

/// Errors raised while talking to the host page
#[derive(Debug, Error)]
pub enum HostError {
    /// DevTools transport or protocol failure
    #[error("devtools protocol error: {0}")]
    Protocol(String),

    /// The page-side call threw
    #[error("page script threw: {0}")]
    Script(String),

    /// The page returned a value of an unexpected shape
    #[error("unexpected value from page: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Identifier of a module factory in the host's module table
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(String);

/// Identifier of a lazily loaded chunk
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(String);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(ModuleId);
string_id!(ChunkId);

/// A factory reported by the host's factory-load listener
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoadedFactory {
    pub id: ModuleId,
    pub source: String,
}

/// Module loader primitives of the host application
#[async_trait]
pub trait HostLoader: Send + Sync {
    /// Ids in the host's module table right now
    async fn registered_factories(&self) -> Result<Vec<ModuleId>, HostError>;

    /// Source text of one factory, `None` if the id is not registered
    async fn factory_source(&self, id: &ModuleId) -> Result<Option<String>, HostError>;

    /// Factories loaded since the previous call (factory-load listener queue)
    async fn drain_loaded_factories(&self) -> Result<Vec<LoadedFactory>, HostError>;

    /// Raw asset path the loader maps a chunk id to
    async fn chunk_asset_path(&self, id: &ChunkId) -> Result<Option<String>, HostError>;

    /// Prefix prepended to asset paths
    async fn public_path(&self) -> Result<String, HostError>;

    /// Fetch an asset's text
    async fn fetch_asset(&self, url: &str) -> Result<String, HostError>;

    /// Fetch and execute a chunk
    async fn load_chunk(&self, id: &ChunkId) -> Result<(), HostError>;

    /// Require a module. Returns `false` when no factory is registered for it.
    async fn require(&self, id: &ModuleId) -> Result<bool, HostError>;

    /// Source of the loader's chunk id -> asset path function
    async fn chunk_map_source(&self) -> Result<String, HostError>;
}

/// One argument of a recorded module search, rendered page-side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SearchArg {
    String {
        value: String,
    },
    Strings {
        values: Vec<String>,
    },
    Filter {
        source: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        props: Option<Vec<String>>,
    },
    Regex {
        source: String,
        #[serde(default)]
        default: bool,
    },
    Mapper {
        entries: Vec<MapperEntry>,
    },
    Other {
        repr: String,
    },
}

/// A `key: filter` pair of a mangled-module mapper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapperEntry {
    pub key: String,
    pub value: SearchArg,
}

impl SearchArg {
    /// What JavaScript's `String(arg)` would produce
    pub fn to_js_string(&self) -> String {
        match self {
            SearchArg::String { value } => value.clone(),
            SearchArg::Strings { values } => values.join(","),
            SearchArg::Filter { source, .. } => source.clone(),
            SearchArg::Regex { source, .. } => source.clone(),
            SearchArg::Mapper { .. } => "[object Object]".to_string(),
            SearchArg::Other { repr } => repr.clone(),
        }
    }
}

/// One entry of the patch system's search history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRecord {
    pub index: usize,
    pub kind: String,
    pub args: Vec<SearchArg>,
}

/// A registered patch that never matched any module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmatchedPatch {
    pub plugin: String,
    pub find: String,
}

/// Patch system bookkeeping exposed by the client mod
#[async_trait]
pub trait PatchSystem: Send + Sync {
    /// Every search the patch system recorded during startup
    async fn search_history(&self) -> Result<Vec<SearchRecord>, HostError>;

    /// Re-run one recorded search with `method`. `true` when it now resolves.
    async fn replay_search(&self, index: usize, method: &str) -> Result<bool, HostError>;

    /// Patches whose "did it ever match" flag is still unset
    async fn unmatched_patches(&self) -> Result<Vec<UnmatchedPatch>, HostError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_arg_decodes_page_shape() {
        let json = r#"[
            {"type": "string", "value": "getUser"},
            {"type": "filter", "source": "m=>m.foo", "props": ["foo", "bar"]},
            {"type": "regex", "source": "/x/", "default": true},
            {"type": "mapper", "entries": [{"key": "a", "value": {"type": "other", "repr": "1"}}]}
        ]"#;

        let args: Vec<SearchArg> = serde_json::from_str(json).unwrap();
        assert_eq!(args.len(), 4);
        assert_eq!(args[0].to_js_string(), "getUser");
        assert!(matches!(&args[1], SearchArg::Filter { props: Some(p), .. } if p.len() == 2));
        assert!(matches!(&args[2], SearchArg::Regex { default: true, .. }));
        assert_eq!(args[3].to_js_string(), "[object Object]");
    }

    #[test]
    fn test_ids_are_transparent_strings() {
        let id: ModuleId = serde_json::from_str("\"789\"").unwrap();
        assert_eq!(id, ModuleId::from("789"));
        assert_eq!(serde_json::to_string(&ChunkId::new("12")).unwrap(), "\"12\"");
    }
}
