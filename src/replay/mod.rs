//! Verification replay
//!
//! Once discovery has converged every module the host owns is loaded, so each
//! search the patch system recorded during startup should now resolve. The
//! [`Replayer`] re-runs them and reports the ones that do not, along with any
//! patch that never matched a module.

mod describe;

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::bridge::BridgeSender;
use crate::host::{HostError, PatchSystem};

pub use describe::{describe, resolve_method, DEFAULT_EXTRACT_REGEX_NAME};

/// Patch kind reported for patches that never matched
pub const NO_MODULE: &str = "found no module";

/// Module id reported for patches that never matched
pub const NO_MODULE_ID: &str = "-";

/// Counts from one replay pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub unmatched_patches: usize,
    pub searches: usize,
    pub failed_searches: usize,
}

/// Replays recorded searches against the patch system
pub struct Replayer {
    patches: Arc<dyn PatchSystem>,
    bridge: BridgeSender,
}

impl Replayer {
    pub fn new(patches: Arc<dyn PatchSystem>, bridge: BridgeSender) -> Self {
        Self { patches, bridge }
    }

    /// Report unmatched patches, then replay every recorded search
    pub async fn run(&self) -> Result<ReplaySummary, HostError> {
        let unmatched_patches = self.report_unmatched_patches().await?;
        let (searches, failed_searches) = self.replay_searches().await?;

        let summary = ReplaySummary {
            unmatched_patches,
            searches,
            failed_searches,
        };
        info!(
            "Replay finished: {} unmatched patches, {}/{} searches failed",
            summary.unmatched_patches, summary.failed_searches, summary.searches
        );
        Ok(summary)
    }

    /// Emit a bad patch for every patch whose match flag is still unset
    pub async fn report_unmatched_patches(&self) -> Result<usize, HostError> {
        let unmatched = self.patches.unmatched_patches().await?;

        for patch in &unmatched {
            self.bridge
                .bad_patch(&patch.plugin, NO_MODULE, NO_MODULE_ID, &patch.find);
        }

        Ok(unmatched.len())
    }

    /// Returns `(replayed, failed)`
    pub async fn replay_searches(&self) -> Result<(usize, usize), HostError> {
        let history = self.patches.search_history().await?;
        let mut failed = 0;

        for record in &history {
            let method = resolve_method(&record.kind, &record.args);

            let resolved = match self.patches.replay_search(record.index, method).await {
                Ok(resolved) => resolved,
                Err(HostError::Script(err)) => {
                    debug!("search {} threw: {}", record.index, err);
                    false
                }
                Err(err) => return Err(err),
            };

            if !resolved {
                failed += 1;
                let description = describe(record);
                warn!("Webpack find failed: {}", description);
                self.bridge.webpack_find_fail(description);
            }
        }

        Ok((history.len(), failed))
    }
}
