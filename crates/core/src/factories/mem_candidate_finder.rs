//! The mem candidate finder implementation provided by lassie.

use lassie_api::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// The mem candidate finder implementation provided by lassie.
///
/// The finders it constructs start out with no announcements, so every
/// retrieval through them fails with [LassieError::NoCandidates]. You
/// likely want to construct a [MemCandidateFinder] directly and
/// announce to it, or supply a finder backed by a real indexer.
#[derive(Debug)]
pub struct MemCandidateFinderFactory {}

impl MemCandidateFinderFactory {
    /// Construct a new MemCandidateFinderFactory.
    pub fn create() -> DynCandidateFinderFactory {
        let out: DynCandidateFinderFactory =
            Arc::new(MemCandidateFinderFactory {});
        out
    }
}

impl CandidateFinderFactory for MemCandidateFinderFactory {
    fn create(&self) -> BoxFut<'static, LassieResult<DynCandidateFinder>> {
        Box::pin(async move {
            let out: DynCandidateFinder = MemCandidateFinder::create();
            Ok(out)
        })
    }
}

/// An in-memory table of `root -> candidates` announcements.
#[derive(Debug, Default)]
pub struct MemCandidateFinder(Mutex<HashMap<Cid, Vec<Candidate>>>);

impl MemCandidateFinder {
    /// Construct a new finder with no announcements.
    pub fn create() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Announce a candidate for its root. A previous announcement by the
    /// same provider for the same root is replaced.
    pub fn announce(&self, candidate: Candidate) {
        let mut lock = self.0.lock().unwrap();
        let list = lock.entry(candidate.root.clone()).or_default();
        list.retain(|c| c.provider != candidate.provider);
        list.push(candidate);
    }

    /// Withdraw the announcement of `provider` for `root`.
    pub fn withdraw(&self, root: &Cid, provider: &ProviderId) {
        let mut lock = self.0.lock().unwrap();
        if let Some(list) = lock.get_mut(root) {
            list.retain(|c| &c.provider != provider);
            if list.is_empty() {
                lock.remove(root);
            }
        }
    }
}

impl CandidateFinder for MemCandidateFinder {
    fn find_candidates(
        &self,
        root: Cid,
    ) -> BoxFut<'_, LassieResult<Vec<Candidate>>> {
        Box::pin(async move {
            Ok(self.0.lock().unwrap().get(&root).cloned().unwrap_or_default())
        })
    }
}
