use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use super::*;
use crate::host::LoadedFactory;

const PUBLIC_PATH: &str = "https://cdn.test/assets/";
const DEFER_MARKER: &str = ".Messages.GUILD_FEED_UNFEATURE_BUTTON_TEXT";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Load(ChunkId),
    Require(ModuleId),
}

/// In-memory host: chunks define factories when loaded, like webpack's push
#[derive(Default)]
struct FakeHost {
    factories: Mutex<BTreeMap<ModuleId, String>>,
    queue: Mutex<Vec<LoadedFactory>>,
    paths: HashMap<ChunkId, String>,
    assets: HashMap<String, String>,
    chunk_modules: HashMap<ChunkId, Vec<(ModuleId, String)>>,
    throwing: HashSet<ModuleId>,
    manifest: String,
    events: Mutex<Vec<Event>>,
    fetches: Mutex<HashMap<String, usize>>,
    drain_latency: Duration,
    load_latency: Duration,
}

impl FakeHost {
    fn new() -> Self {
        Self::default()
    }

    fn factory(mut self, id: &str, source: &str) -> Self {
        self.factories
            .get_mut()
            .insert(ModuleId::from(id), source.to_string());
        self
    }

    fn chunk(mut self, id: &str, text: &str) -> Self {
        let path = format!("{id}.js");
        self.assets.insert(format!("{PUBLIC_PATH}{path}"), text.to_string());
        self.paths.insert(ChunkId::from(id), path);
        self
    }

    fn chunk_path(mut self, id: &str, path: &str) -> Self {
        self.paths.insert(ChunkId::from(id), path.to_string());
        self
    }

    fn chunk_defines(mut self, chunk: &str, module: &str, source: &str) -> Self {
        self.chunk_modules
            .entry(ChunkId::from(chunk))
            .or_default()
            .push((ModuleId::from(module), source.to_string()));
        self
    }

    fn throws_on(mut self, module: &str) -> Self {
        self.throwing.insert(ModuleId::from(module));
        self
    }

    fn manifest(mut self, ids: &[&str]) -> Self {
        let entries: Vec<String> = ids.iter().map(|id| format!("{id}:\"{id}\"")).collect();
        self.manifest = format!("e=>({{{}}})[e]+\".js\"", entries.join(","));
        self
    }

    /// Make queue drains and chunk loads take real time, like DevTools round trips
    fn latency(mut self, drain: Duration, load: Duration) -> Self {
        self.drain_latency = drain;
        self.load_latency = load;
        self
    }

    fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    fn fetch_count(&self, chunk: &str) -> usize {
        let url = format!("{PUBLIC_PATH}{chunk}.js");
        self.fetches.lock().get(&url).copied().unwrap_or(0)
    }

    fn total_fetches(&self) -> usize {
        self.fetches.lock().values().sum()
    }
}

#[async_trait]
impl HostLoader for FakeHost {
    async fn registered_factories(&self) -> Result<Vec<ModuleId>, HostError> {
        Ok(self.factories.lock().keys().cloned().collect())
    }

    async fn factory_source(&self, id: &ModuleId) -> Result<Option<String>, HostError> {
        Ok(self.factories.lock().get(id).cloned())
    }

    async fn drain_loaded_factories(&self) -> Result<Vec<LoadedFactory>, HostError> {
        let loaded = std::mem::take(&mut *self.queue.lock());
        if !self.drain_latency.is_zero() {
            tokio::time::sleep(self.drain_latency).await;
        }
        Ok(loaded)
    }

    async fn chunk_asset_path(&self, id: &ChunkId) -> Result<Option<String>, HostError> {
        Ok(self.paths.get(id).cloned())
    }

    async fn public_path(&self) -> Result<String, HostError> {
        Ok(PUBLIC_PATH.to_string())
    }

    async fn fetch_asset(&self, url: &str) -> Result<String, HostError> {
        *self.fetches.lock().entry(url.to_string()).or_default() += 1;
        self.assets
            .get(url)
            .cloned()
            .ok_or_else(|| HostError::Script(format!("HTTP 404 for {url}")))
    }

    async fn load_chunk(&self, id: &ChunkId) -> Result<(), HostError> {
        self.events.lock().push(Event::Load(id.clone()));
        if !self.load_latency.is_zero() {
            tokio::time::sleep(self.load_latency).await;
        }

        for (module, source) in self.chunk_modules.get(id).into_iter().flatten() {
            self.factories.lock().insert(module.clone(), source.clone());
            self.queue.lock().push(LoadedFactory {
                id: module.clone(),
                source: source.clone(),
            });
        }
        Ok(())
    }

    async fn require(&self, id: &ModuleId) -> Result<bool, HostError> {
        if self.throwing.contains(id) {
            return Err(HostError::Script(format!("TypeError: cannot require {id}")));
        }
        if !self.factories.lock().contains_key(id) {
            return Ok(false);
        }
        self.events.lock().push(Event::Require(id.clone()));
        Ok(true)
    }

    async fn chunk_map_source(&self) -> Result<String, HostError> {
        Ok(self.manifest.clone())
    }
}

fn bundle(body: &str) -> String {
    format!("{}([[0],{{{body}}}]);", DiscoveryConfig::default().bundle_marker)
}

fn config() -> DiscoveryConfig {
    DiscoveryConfig {
        poll_interval_ms: 1,
        defer_markers: vec![DEFER_MARKER.to_string()],
        ..DiscoveryConfig::default()
    }
}

async fn discover(host: &Arc<FakeHost>) -> DiscoveryOutcome {
    DiscoveryEngine::new(host.clone(), config())
        .run()
        .await
        .expect("discovery should succeed")
}

fn ids<T: ToString>(items: &[T]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

#[tokio::test]
async fn test_valid_group_requires_entry_after_loads() {
    let host = Arc::new(
        FakeHost::new()
            .factory("1", r#"Promise.all([e("123"),e("456")]).then(e.bind(e,"789"))"#)
            .chunk("123", &bundle("1:()=>{}"))
            .chunk("456", &bundle("789:()=>{}"))
            .chunk_defines("456", "789", "function(e,t,n){}")
            .manifest(&["123", "456"]),
    );

    let outcome = discover(&host).await;

    assert_eq!(
        host.events(),
        vec![
            Event::Load(ChunkId::from("123")),
            Event::Load(ChunkId::from("456")),
            Event::Require(ModuleId::from("789")),
        ]
    );
    assert_eq!(ids(&outcome.required), vec!["789"]);
    assert_eq!(outcome.valid_chunks.len(), 2);
    assert!(outcome.invalid_chunks.is_empty());
    assert_eq!(outcome.reconciled, 0);
}

#[tokio::test]
async fn test_wasm_chunk_discards_group() {
    let host = Arc::new(
        FakeHost::new()
            .factory("1", r#"Promise.all([e("123"),e("456")]).then(e.bind(e,"789"))"#)
            .factory("789", "function(e,t,n){}")
            .chunk("123", &bundle("1:()=>{}"))
            .chunk("456", &bundle(r#"2:e=>e.exports=n.p+"abc.module.wasm""#))
            .manifest(&["123", "456"]),
    );

    let outcome = discover(&host).await;

    assert!(outcome.required.is_empty());
    assert!(host.events().is_empty());
    assert!(outcome.valid_chunks.contains(&ChunkId::from("123")));
    assert!(outcome.invalid_chunks.contains(&ChunkId::from("456")));
    assert!(!outcome.valid_chunks.contains(&ChunkId::from("456")));
}

#[tokio::test]
async fn test_no_lazy_references_converge_in_one_sweep() {
    let host = Arc::new(
        FakeHost::new()
            .factory("1", "function(e,t,n){n.d(t,{Z:()=>r})}")
            .factory("2", "function(e){e.exports={}}")
            .manifest(&["5"]),
    );

    let outcome = discover(&host).await;

    assert_eq!(outcome.sweeps, 1);
    assert_eq!(outcome.scanned, 2);
    assert!(outcome.required.is_empty());
    assert_eq!(host.total_fetches(), 0);
}

#[tokio::test]
async fn test_shared_chunk_is_fetched_and_loaded_once() {
    let host = Arc::new(
        FakeHost::new()
            .factory("1", r#"n.e("5").then(n.bind(n,"a"))"#)
            .factory("2", r#"n.e("5").then(n.bind(n,"b"))"#)
            .factory("a", "function(){}")
            .factory("b", "function(){}")
            .chunk("5", &bundle("a:()=>{}"))
            .manifest(&["5"]),
    );

    let outcome = discover(&host).await;

    assert_eq!(host.fetch_count("5"), 1);
    let loads = host
        .events()
        .into_iter()
        .filter(|event| matches!(event, Event::Load(_)))
        .count();
    assert_eq!(loads, 1);

    let mut required = ids(&outcome.required);
    required.sort();
    assert_eq!(required, vec!["a", "b"]);
}

#[tokio::test]
async fn test_deferred_requires_drain_once_after_convergence() {
    let deferred_source = format!(r#"{DEFER_MARKER};r.e("10").then(r.bind(r,"100"))"#);
    let host = Arc::new(
        FakeHost::new()
            .factory("1", &deferred_source)
            .factory("2", &format!(r#"{DEFER_MARKER};r.e("11").then(r.bind(r,"100"))"#))
            .factory("3", r#"r.e("12").then(r.bind(r,"300"))"#)
            .chunk("10", &bundle("100:()=>{}"))
            .chunk("11", &bundle("101:()=>{}"))
            .chunk("12", &bundle("300:()=>{}"))
            .chunk_defines("10", "100", "function(){}")
            .chunk_defines("12", "300", "function(){}")
            .manifest(&["10", "11", "12"]),
    );

    let outcome = discover(&host).await;

    assert_eq!(ids(&outcome.deferred), vec!["100"]);
    assert_eq!(ids(&outcome.required), vec!["300", "100"]);
}

#[tokio::test]
async fn test_throwing_require_does_not_stop_discovery() {
    let host = Arc::new(
        FakeHost::new()
            .factory("1", r#"x=()=>r.e("1").then(r.bind(r,"bad")),y=()=>r.e("2").then(r.bind(r,"good"))"#)
            .chunk("1", &bundle("bad:()=>{}"))
            .chunk("2", &bundle("good:()=>{}"))
            .chunk_defines("1", "bad", "function(){throw 1}")
            .chunk_defines("2", "good", "function(){}")
            .throws_on("bad")
            .manifest(&["1", "2"]),
    );

    let outcome = discover(&host).await;

    assert_eq!(ids(&outcome.required), vec!["good"]);
}

#[tokio::test]
async fn test_new_factories_are_scanned_until_converged() {
    let host = Arc::new(
        FakeHost::new()
            .factory("1", r#"r.e("1").then(r.bind(r,"10"))"#)
            .chunk("1", &bundle("10:()=>{}"))
            .chunk("2", &bundle("20:()=>{}"))
            .chunk_defines("1", "10", r#"function(e,t,r){r.e("2").then(r.bind(r,"20"))}"#)
            .chunk_defines("2", "20", "function(){}")
            .manifest(&["1", "2"]),
    );

    let outcome = discover(&host).await;

    assert_eq!(ids(&outcome.required), vec!["10", "20"]);
    assert_eq!(outcome.valid_chunks.len(), 2);
    assert!(outcome.sweeps >= 2);
}

#[tokio::test]
async fn test_unresolved_chunk_is_skipped_without_fetch() {
    let host = Arc::new(
        FakeHost::new()
            .factory("1", r#"r.e("7").then(r.bind(r,"70"))"#)
            .factory("70", "function(){}")
            .chunk_path("7", "undefined.js")
            .manifest(&["7"]),
    );

    let outcome = discover(&host).await;

    assert_eq!(host.total_fetches(), 0);
    assert_eq!(ids(&outcome.required), vec!["70"]);
    assert!(outcome.valid_chunks.is_empty());
    assert!(outcome.invalid_chunks.is_empty());
}

#[tokio::test]
async fn test_reconciliation_loads_unreferenced_manifest_chunks() {
    let host = Arc::new(
        FakeHost::new()
            .factory("1", "function(){}")
            .chunk("900", &bundle("901:()=>{}"))
            .chunk("901", "self.importScripts(\"worker.js\")")
            .chunk_defines("900", "901", "function(){}")
            .manifest(&["900", "901"]),
    );

    let outcome = discover(&host).await;

    assert_eq!(outcome.reconciled, 1);
    assert_eq!(ids(&outcome.required), vec!["901"]);
    assert!(outcome.invalid_chunks.contains(&ChunkId::from("901")));
}

#[tokio::test]
async fn test_empty_manifest_is_fatal() {
    let host = Arc::new(FakeHost::new().factory("1", "function(){}"));

    let result = DiscoveryEngine::new(host, config()).run().await;

    assert!(matches!(result, Err(DiscoveryError::NoChunks)));
}

#[tokio::test]
async fn test_factories_queued_during_a_slow_drain_are_scanned() {
    let host = Arc::new(
        FakeHost::new()
            .factory("1", r#"r.e("1").then(r.bind(r,"10"))"#)
            .chunk("1", &bundle("10:()=>{}"))
            .chunk("2", &bundle("20:()=>{}"))
            .chunk_defines("1", "10", &format!(r#"{DEFER_MARKER};r.e("2").then(r.bind(r,"20"))"#))
            .chunk_defines("2", "20", "function(){}")
            .latency(Duration::from_millis(20), Duration::from_millis(5))
            .manifest(&["1", "2"]),
    );

    let outcome = discover(&host).await;

    assert_eq!(outcome.scanned, 3);
    assert_eq!(ids(&outcome.deferred), vec!["20"]);
    assert_eq!(ids(&outcome.required), vec!["10", "20"]);
    assert_eq!(outcome.reconciled, 0);
}

#[tokio::test]
async fn test_defer_marker_on_listener_factory() {
    let host = Arc::new(
        FakeHost::new()
            .factory("1", r#"r.e("1").then(r.bind(r,"10"))"#)
            .factory("3", r#"r.e("3").then(r.bind(r,"30"))"#)
            .chunk("1", &bundle("10:()=>{}"))
            .chunk("2", &bundle("20:()=>{}"))
            .chunk("3", &bundle("30:()=>{}"))
            .chunk_defines("1", "10", &format!(r#"{DEFER_MARKER};r.e("2").then(r.bind(r,"20"))"#))
            .chunk_defines("2", "20", "function(){}")
            .chunk_defines("3", "30", "function(){}")
            .manifest(&["1", "2", "3"]),
    );

    let outcome = discover(&host).await;

    assert_eq!(ids(&outcome.deferred), vec!["20"]);
    let required = ids(&outcome.required);
    assert_eq!(required.last().map(String::as_str), Some("20"));

    let mut immediate = required[..required.len() - 1].to_vec();
    immediate.sort();
    assert_eq!(immediate, vec!["10", "30"]);
}

#[tokio::test]
async fn test_deferred_entry_already_required_is_not_required_again() {
    let host = Arc::new(
        FakeHost::new()
            .factory("1", &format!(r#"{DEFER_MARKER};r.e("5").then(r.bind(r,"50"))"#))
            .factory("2", r#"r.e("5").then(r.bind(r,"50"))"#)
            .factory("50", "function(){}")
            .chunk("5", &bundle("50:()=>{}"))
            .manifest(&["5"]),
    );

    let outcome = discover(&host).await;

    assert_eq!(ids(&outcome.required), vec!["50"]);
    assert!(outcome.deferred.is_empty());
    let requires = host
        .events()
        .into_iter()
        .filter(|event| matches!(event, Event::Require(_)))
        .count();
    assert_eq!(requires, 1);
}
