//! Convergence bookkeeping for the open-ended factory search

use std::collections::HashSet;

use crate::host::ModuleId;

/// A poll-able "is this scan done?" check
pub type CompletionCheck = Box<dyn Fn() -> bool + Send + Sync>;

/// Registry of in-flight factory scans.
///
/// The total number of scans is unknown up front because loading chunks makes
/// the host define new factories, so scans are tracked as completion checks
/// that a periodic sweep polls and prunes.
#[derive(Default)]
pub struct PendingScans {
    checks: Vec<(ModuleId, CompletionCheck)>,
    registered: usize,
}

impl PendingScans {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a scan until its check reports completion
    pub fn register(&mut self, id: ModuleId, check: CompletionCheck) {
        self.registered += 1;
        self.checks.push((id, check));
    }

    /// Drop completed scans and return how many are still running
    pub fn sweep(&mut self) -> usize {
        self.checks.retain(|(_, done)| !done());
        self.checks.len()
    }

    /// Scans registered over the registry's lifetime
    pub fn registered(&self) -> usize {
        self.registered
    }

    /// Ids of scans still running, for progress logging
    pub fn waiting_on(&self) -> impl Iterator<Item = &ModuleId> {
        self.checks.iter().map(|(id, _)| id)
    }
}

/// Entry points whose require waits until the chunk graph settles
#[derive(Debug, Default)]
pub struct DeferredRequires {
    queue: Vec<ModuleId>,
    queued: HashSet<ModuleId>,
    drained: bool,
}

impl DeferredRequires {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `id`; returns `false` if it was already queued or the queue was drained
    pub fn push(&mut self, id: ModuleId) -> bool {
        if self.drained || !self.queued.insert(id.clone()) {
            return false;
        }
        self.queue.push(id);
        true
    }

    /// Take every queued id in insertion order. Only the first call yields ids.
    pub fn drain(&mut self) -> Vec<ModuleId> {
        self.drained = true;
        std::mem::take(&mut self.queue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_sweep_removes_finished_checks() {
        let mut pending = PendingScans::new();
        let flag = Arc::new(AtomicBool::new(false));

        let watched = flag.clone();
        pending.register(ModuleId::from("1"), Box::new(move || watched.load(Ordering::SeqCst)));
        pending.register(ModuleId::from("2"), Box::new(|| true));

        assert_eq!(pending.sweep(), 1);
        assert_eq!(pending.waiting_on().next(), Some(&ModuleId::from("1")));

        flag.store(true, Ordering::SeqCst);
        assert_eq!(pending.sweep(), 0);
        assert_eq!(pending.registered(), 2);
    }

    #[test]
    fn test_deferred_requires_dedup_and_drain_once() {
        let mut deferred = DeferredRequires::new();

        assert!(deferred.push(ModuleId::from("b")));
        assert!(deferred.push(ModuleId::from("a")));
        assert!(!deferred.push(ModuleId::from("b")));

        assert_eq!(deferred.drain(), vec![ModuleId::from("b"), ModuleId::from("a")]);
        assert!(deferred.drain().is_empty());
        assert!(!deferred.push(ModuleId::from("c")));
    }
}
