//! Chunk discovery engine
//!
//! Forces the host to load every lazily loaded chunk it owns:
//! 1. scan each factory's source for lazy-load expressions
//! 2. classify every referenced chunk (memoized, one fetch per id)
//! 3. load surviving groups and require their entry points
//! 4. keep scanning newly defined factories until the search converges
//! 5. drain deferred requires, then reconcile against the loader's manifest

mod chunk;
mod extract;
mod pending;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashSet;
use futures_util::future::join_all;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{OnceCell, Semaphore};
use tracing::{debug, info, warn};

use crate::config::DiscoveryConfig;
use crate::host::{ChunkId, HostError, HostLoader, ModuleId};

pub use chunk::{classify_asset, ChunkClass, ChunkGroup, ChunkLedger};
pub use extract::{manifest_chunk_ids, ChunkExtractor, LazyChunkPattern};
pub use pending::{CompletionCheck, DeferredRequires, PendingScans};

/// Errors that abort discovery
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The loader's chunk manifest yielded no ids at all
    #[error("failed to get all chunks")]
    NoChunks,

    #[error(transparent)]
    Host(#[from] HostError),
}

/// What a discovery run did
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOutcome {
    /// Chunks classified as script bundles
    pub valid_chunks: BTreeSet<ChunkId>,

    /// Chunks classified as WASM or non-bundle assets
    pub invalid_chunks: BTreeSet<ChunkId>,

    /// Entry points required, in require order (deferred ones included)
    pub required: Vec<ModuleId>,

    /// Deferred entry points drained after convergence
    pub deferred: Vec<ModuleId>,

    /// Factory scans performed
    pub scanned: usize,

    /// Sweep rounds until convergence
    pub sweeps: usize,

    /// Manifest chunks the lazy-load scan never reached but were loaded afterwards
    pub reconciled: usize,

    pub elapsed: Duration,
}

/// Shared engine state; scans run as independent tasks holding an `Arc` of it
struct EngineState {
    host: Arc<dyn HostLoader>,
    config: DiscoveryConfig,
    extractor: Box<dyn ChunkExtractor>,
    ledger: ChunkLedger,
    public_path: OnceCell<String>,
    seen: DashSet<ModuleId>,
    pending: Mutex<PendingScans>,
    deferred: Mutex<DeferredRequires>,
    required: Mutex<Vec<ModuleId>>,
    permits: Semaphore,
}

/// The chunk discovery engine
pub struct DiscoveryEngine {
    state: Arc<EngineState>,
}

impl DiscoveryEngine {
    /// Create an engine using the default lazy-chunk pattern
    pub fn new(host: Arc<dyn HostLoader>, config: DiscoveryConfig) -> Self {
        Self::with_extractor(host, config, Box::new(LazyChunkPattern))
    }

    /// Create an engine with a custom extraction strategy
    pub fn with_extractor(
        host: Arc<dyn HostLoader>,
        config: DiscoveryConfig,
        extractor: Box<dyn ChunkExtractor>,
    ) -> Self {
        let permits = Semaphore::new(config.scan_concurrency.max(1));

        Self {
            state: Arc::new(EngineState {
                host,
                config,
                extractor,
                ledger: ChunkLedger::new(),
                public_path: OnceCell::new(),
                seen: DashSet::new(),
                pending: Mutex::new(PendingScans::new()),
                deferred: Mutex::new(DeferredRequires::new()),
                required: Mutex::new(Vec::new()),
                permits,
            }),
        }
    }

    /// Run discovery to convergence, then drain deferred requires and reconcile
    pub async fn run(&self) -> Result<DiscoveryOutcome, DiscoveryError> {
        let start = Instant::now();
        let state = &self.state;

        // Ahead-of-time pass over the factories already registered
        let registered = state.host.registered_factories().await?;
        info!("Scanning {} registered factories", registered.len());
        for id in registered {
            EngineState::spawn_scan(state, id, None);
        }

        let sweeps = self.converge().await?;
        info!(
            "Lazy chunk search converged after {} sweep(s), {} factories scanned",
            sweeps,
            state.pending.lock().registered()
        );

        // An entry point another factory already required is not required again
        let deferred: Vec<ModuleId> = {
            let drained = state.deferred.lock().drain();
            let required = state.required.lock();
            drained
                .into_iter()
                .filter(|id| !required.contains(id))
                .collect()
        };
        if !deferred.is_empty() {
            info!("Requiring {} deferred entry point(s)", deferred.len());
        }
        for id in &deferred {
            state.require(id).await;
        }

        let reconciled = state.reconcile().await?;

        Ok(DiscoveryOutcome {
            valid_chunks: state.ledger.valid(),
            invalid_chunks: state.ledger.invalid(),
            required: state.required.lock().clone(),
            deferred,
            scanned: state.pending.lock().registered(),
            sweeps,
            reconciled,
            elapsed: start.elapsed(),
        })
    }

    /// Poll until every scan is done and a drain of the factory queue taken
    /// after that sweep turns up nothing new
    async fn converge(&self) -> Result<usize, DiscoveryError> {
        let state = &self.state;
        let interval = Duration::from_millis(state.config.poll_interval_ms);
        let mut sweeps = 0;

        loop {
            tokio::time::sleep(interval).await;

            let appeared = self.scan_loaded_factories().await?;
            let remaining = state.pending.lock().sweep();
            sweeps += 1;

            // Scans that finished before the sweep have already queued their
            // factories, so this drain sees them
            if remaining == 0 && !appeared && !self.scan_loaded_factories().await? {
                return Ok(sweeps);
            }

            if remaining > 0 {
                let pending = state.pending.lock();
                let waiting: Vec<&str> = pending.waiting_on().take(5).map(ModuleId::as_str).collect();
                debug!(remaining, appeared, "lazy chunk search waiting on {:?}", waiting);
            }
        }
    }

    /// Spawn scans for factories loaded since the last drain. `true` if any appeared.
    async fn scan_loaded_factories(&self) -> Result<bool, DiscoveryError> {
        let loaded = self.state.host.drain_loaded_factories().await?;
        let appeared = !loaded.is_empty();
        for factory in loaded {
            EngineState::spawn_scan(&self.state, factory.id, Some(factory.source));
        }
        Ok(appeared)
    }
}

impl EngineState {
    /// Spawn a scan of `id` unless it was already scanned
    fn spawn_scan(this: &Arc<Self>, id: ModuleId, source: Option<String>) {
        if !this.seen.insert(id.clone()) {
            return;
        }

        let state = Arc::clone(this);
        let scan_id = id.clone();
        let handle = tokio::spawn(async move { state.scan(scan_id, source).await });

        this.pending
            .lock()
            .register(id, Box::new(move || handle.is_finished()));
    }

    async fn scan(&self, id: ModuleId, source: Option<String>) {
        let Ok(_permit) = self.permits.acquire().await else {
            return;
        };

        let source = match source {
            Some(source) => source,
            None => match self.host.factory_source(&id).await {
                Ok(Some(source)) => source,
                Ok(None) => return,
                Err(e) => {
                    warn!("Failed to read factory {}: {}", id, e);
                    return;
                }
            },
        };

        let groups = self.extractor.extract(&source);
        if groups.is_empty() {
            return;
        }

        let defer = self.should_defer(&source);
        debug!("Factory {} references {} chunk group(s)", id, groups.len());

        let vetted = join_all(groups.into_iter().map(|group| self.vet_group(group))).await;
        let surviving: Vec<ChunkGroup> = vetted.into_iter().flatten().collect();

        let loads = join_all(surviving.iter().map(|group| async move {
            let results = join_all(group.chunks.iter().map(|chunk| self.load_chunk(chunk))).await;
            results.into_iter().all(|loaded| loaded)
        }))
        .await;

        for (group, loaded) in surviving.into_iter().zip(loads) {
            if !loaded {
                debug!("Skipping entry point {}: a chunk failed to load", group.entry_point);
                continue;
            }

            if defer {
                self.deferred.lock().push(group.entry_point);
            } else {
                self.require(&group.entry_point).await;
            }
        }
    }

    /// Keep a group only if none of its chunks is invalid; drop skipped members
    async fn vet_group(&self, group: ChunkGroup) -> Option<ChunkGroup> {
        let classes = join_all(group.chunks.iter().map(|chunk| self.classify(chunk))).await;

        if classes.contains(&ChunkClass::Invalid) {
            debug!(
                "Discarding chunk group for {}: contains an invalid chunk",
                group.entry_point
            );
            return None;
        }

        let chunks = group
            .chunks
            .into_iter()
            .zip(classes)
            .filter(|(_, class)| *class == ChunkClass::Valid)
            .map(|(chunk, _)| chunk)
            .collect();

        Some(ChunkGroup::new(chunks, group.entry_point))
    }

    async fn classify(&self, id: &ChunkId) -> ChunkClass {
        self.ledger
            .classify(id, || async {
                let path = match self.host.chunk_asset_path(id).await {
                    Ok(Some(path)) if path != self.config.unresolved_sentinel => path,
                    Ok(_) => return ChunkClass::Skipped,
                    Err(e) => {
                        debug!("Could not resolve chunk {}: {}", id, e);
                        return ChunkClass::Skipped;
                    }
                };

                let prefix = match self
                    .public_path
                    .get_or_try_init(|| self.host.public_path())
                    .await
                {
                    Ok(prefix) => prefix.as_str(),
                    Err(e) => {
                        debug!("Could not read public path: {}", e);
                        return ChunkClass::Skipped;
                    }
                };

                match self.host.fetch_asset(&format!("{prefix}{path}")).await {
                    Ok(text) => classify_asset(&text, &self.config),
                    Err(e) => {
                        debug!("Fetching chunk {} failed: {}", id, e);
                        ChunkClass::Skipped
                    }
                }
            })
            .await
    }

    async fn load_chunk(&self, id: &ChunkId) -> bool {
        self.ledger
            .load_once(id, || async {
                match self.host.load_chunk(id).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("Loading chunk {} failed: {}", id, e);
                        false
                    }
                }
            })
            .await
    }

    /// Require a module; a throwing require is logged and otherwise ignored
    async fn require(&self, id: &ModuleId) {
        match self.host.require(id).await {
            Ok(true) => self.required.lock().push(id.clone()),
            Ok(false) => debug!("No factory registered for entry point {}", id),
            Err(e) => warn!("Requiring {} threw: {}", id, e),
        }
    }

    fn should_defer(&self, source: &str) -> bool {
        self.config
            .defer_markers
            .iter()
            .any(|marker| !marker.is_empty() && source.contains(marker.as_str()))
    }

    /// Load manifest chunks the lazy-load scan never reached
    async fn reconcile(&self) -> Result<usize, DiscoveryError> {
        let manifest = manifest_chunk_ids(&self.host.chunk_map_source().await?);
        if manifest.is_empty() {
            return Err(DiscoveryError::NoChunks);
        }

        let leftovers: Vec<ChunkId> = manifest
            .into_iter()
            .filter(|id| !self.ledger.is_decided(id))
            .collect();
        info!("Reconciling {} chunk(s) missed by the lazy-load scan", leftovers.len());

        let loaded = join_all(leftovers.iter().map(|id| async move {
            self.classify(id).await == ChunkClass::Valid && self.load_chunk(id).await
        }))
        .await
        .into_iter()
        .filter(|loaded| *loaded)
        .count();

        for factory in self.host.drain_loaded_factories().await? {
            if self.seen.insert(factory.id.clone()) {
                self.require(&factory.id).await;
            }
        }

        Ok(loaded)
    }
}

#[cfg(test)]
mod tests;
