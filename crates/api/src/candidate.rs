//! Candidate discovery types.

use crate::*;
use std::sync::Arc;

/// A provider believed able to serve a root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// The root the provider announced.
    pub root: Cid,

    /// The provider.
    pub provider: ProviderId,

    /// Addresses the provider can be reached at. Interpretation is up to
    /// the protocol retriever (multiaddrs or URLs).
    pub addrs: Vec<String>,

    /// Protocols the provider announced for this root.
    pub protocols: Vec<ProtocolCode>,
}

impl Candidate {
    /// Returns true if the provider announced `protocol`.
    pub fn supports(&self, protocol: ProtocolCode) -> bool {
        self.protocols.contains(&protocol)
    }
}

/// Locates retrieval candidates for a root.
pub trait CandidateFinder: 'static + Send + Sync + std::fmt::Debug {
    /// Find candidates for `root`. An empty list is not an error.
    fn find_candidates(
        &self,
        root: Cid,
    ) -> BoxFut<'_, LassieResult<Vec<Candidate>>>;
}

/// Trait-object [CandidateFinder].
pub type DynCandidateFinder = Arc<dyn CandidateFinder>;

/// A factory for constructing [CandidateFinder] instances.
pub trait CandidateFinderFactory: 'static + Send + Sync + std::fmt::Debug {
    /// Construct a candidate finder.
    fn create(&self) -> BoxFut<'static, LassieResult<DynCandidateFinder>>;
}

/// Trait-object [CandidateFinderFactory].
pub type DynCandidateFinderFactory = Arc<dyn CandidateFinderFactory>;
