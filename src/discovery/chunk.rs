//! Chunk groups and the per-chunk classification ledger

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;

use crate::config::DiscoveryConfig;
use crate::host::{ChunkId, ModuleId};

/// Classification of a chunk's asset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkClass {
    /// A script bundle that registers modules when loaded
    Valid,
    /// A WASM or otherwise non-bundle asset; poisons its group
    Invalid,
    /// Not a real network chunk (unresolved URL, sentinel URL, fetch failure)
    Skipped,
}

/// The chunk ids of one lazy-load expression plus the module it requires
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkGroup {
    /// Chunk ids in source order
    pub chunks: Vec<ChunkId>,

    /// Module required once every chunk has loaded
    pub entry_point: ModuleId,
}

impl ChunkGroup {
    pub fn new(chunks: Vec<ChunkId>, entry_point: ModuleId) -> Self {
        Self { chunks, entry_point }
    }
}

/// Classify fetched asset text
pub fn classify_asset(text: &str, config: &DiscoveryConfig) -> ChunkClass {
    if text.contains(&config.wasm_marker) || !text.contains(&config.bundle_marker) {
        ChunkClass::Invalid
    } else {
        ChunkClass::Valid
    }
}

/// Memoized chunk classifications and loads.
///
/// Each id gets one cell; the first caller runs the classification and every
/// concurrent or later caller observes that outcome.
#[derive(Debug, Default)]
pub struct ChunkLedger {
    classes: DashMap<ChunkId, Arc<OnceCell<ChunkClass>>>,
    loads: DashMap<ChunkId, Arc<OnceCell<bool>>>,
}

impl ChunkLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify `id`, running `classify` only if no outcome is recorded yet
    pub async fn classify<F, Fut>(&self, id: &ChunkId, classify: F) -> ChunkClass
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ChunkClass>,
    {
        let cell = self.classes.entry(id.clone()).or_default().clone();
        *cell.get_or_init(classify).await
    }

    /// Load `id` at most once; later callers get the first load's result
    pub async fn load_once<F, Fut>(&self, id: &ChunkId, load: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = bool>,
    {
        let cell = self.loads.entry(id.clone()).or_default().clone();
        *cell.get_or_init(load).await
    }

    /// Recorded classification, if finished
    pub fn class_of(&self, id: &ChunkId) -> Option<ChunkClass> {
        self.classes.get(id).and_then(|cell| cell.get().copied())
    }

    /// Whether `id` is already known to be valid or invalid
    pub fn is_decided(&self, id: &ChunkId) -> bool {
        matches!(
            self.class_of(id),
            Some(ChunkClass::Valid) | Some(ChunkClass::Invalid)
        )
    }

    pub fn valid(&self) -> BTreeSet<ChunkId> {
        self.with_class(ChunkClass::Valid)
    }

    pub fn invalid(&self) -> BTreeSet<ChunkId> {
        self.with_class(ChunkClass::Invalid)
    }

    fn with_class(&self, class: ChunkClass) -> BTreeSet<ChunkId> {
        self.classes
            .iter()
            .filter(|entry| entry.value().get() == Some(&class))
            .map(|entry| entry.key().clone())
            .collect()
    }
}
