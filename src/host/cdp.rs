//! DevTools-backed host implementation

use async_trait::async_trait;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::trace;

use super::runtime::BRIDGE_GLOBAL;
use super::{
    ChunkId, HostError, HostLoader, LoadedFactory, ModuleId, PatchSystem, SearchRecord,
    UnmatchedPatch,
};

/// Host capabilities reached through the injected runtime of one page
#[derive(Clone)]
pub struct CdpHost {
    page: Page,
}

impl CdpHost {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// Whether the injected runtime reports the host's module system as ready
    pub async fn is_ready(&self) -> Result<bool, HostError> {
        let present: bool = self
            .eval(&format!("typeof window.{BRIDGE_GLOBAL} === \"object\""))
            .await?;
        if !present {
            return Ok(false);
        }
        self.call("isReady", json!([])).await
    }

    /// Emit the end-of-test signal from inside the page
    pub async fn signal_done(&self) -> Result<(), HostError> {
        let _: bool = self.call("signalDone", json!([])).await?;
        Ok(())
    }

    /// Invoke `window.__patchReporter.<method>(...args)` and decode the result
    async fn call<T: DeserializeOwned>(&self, method: &str, args: Value) -> Result<T, HostError> {
        let expression = format!(
            "window.{BRIDGE_GLOBAL}.{method}(...{})",
            serde_json::to_string(&args)?
        );
        trace!("evaluate {}", method);
        self.eval(&expression).await
    }

    async fn eval<T: DeserializeOwned>(&self, expression: &str) -> Result<T, HostError> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(HostError::Protocol)?;

        let result = self.page.evaluate_expression(params).await.map_err(map_cdp_error)?;
        Ok(result.into_value()?)
    }
}

fn map_cdp_error(err: CdpError) -> HostError {
    match err {
        CdpError::JavascriptException(details) => HostError::Script(
            details
                .exception
                .as_ref()
                .and_then(|exception| exception.description.clone())
                .unwrap_or_else(|| details.text.clone()),
        ),
        other => HostError::Protocol(other.to_string()),
    }
}

#[async_trait]
impl HostLoader for CdpHost {
    async fn registered_factories(&self) -> Result<Vec<ModuleId>, HostError> {
        self.call("registeredFactories", json!([])).await
    }

    async fn factory_source(&self, id: &ModuleId) -> Result<Option<String>, HostError> {
        self.call("factorySource", json!([id])).await
    }

    async fn drain_loaded_factories(&self) -> Result<Vec<LoadedFactory>, HostError> {
        self.call("drainLoadedFactories", json!([])).await
    }

    async fn chunk_asset_path(&self, id: &ChunkId) -> Result<Option<String>, HostError> {
        self.call("chunkAssetPath", json!([id])).await
    }

    async fn public_path(&self) -> Result<String, HostError> {
        self.call("publicPath", json!([])).await
    }

    async fn fetch_asset(&self, url: &str) -> Result<String, HostError> {
        self.call("fetchAsset", json!([url])).await
    }

    async fn load_chunk(&self, id: &ChunkId) -> Result<(), HostError> {
        let _: bool = self.call("loadChunk", json!([id])).await?;
        Ok(())
    }

    async fn require(&self, id: &ModuleId) -> Result<bool, HostError> {
        self.call("require", json!([id])).await
    }

    async fn chunk_map_source(&self) -> Result<String, HostError> {
        self.call("chunkMapSource", json!([])).await
    }
}

#[async_trait]
impl PatchSystem for CdpHost {
    async fn search_history(&self) -> Result<Vec<SearchRecord>, HostError> {
        self.call("searchHistory", json!([])).await
    }

    async fn replay_search(&self, index: usize, method: &str) -> Result<bool, HostError> {
        self.call("replaySearch", json!([index, method])).await
    }

    async fn unmatched_patches(&self) -> Result<Vec<UnmatchedPatch>, HostError> {
        self.call("unmatchedPatches", json!([])).await
    }
}
