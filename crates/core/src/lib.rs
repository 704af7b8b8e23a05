#![deny(missing_docs)]
//! Lassie multi-protocol content retrieval client.
//!
//! [Lassie] is the client-visible facade. It is constructed from a
//! [Builder] of collaborator factories and a resolved [LassieConfig],
//! and fetches content through the [Fetcher] trait.

use lassie_api::*;

/// Construct a default builder.
///
/// - `candidate_finder` - The default finder is
///   [factories::MemCandidateFinderFactory], it has no announcements.
///   You likely want to supply your own through
///   [LassieOption::CandidateFinder].
/// - `host` - The default host is [factories::MemHostFactory], which
///   connects to an in-process network.
/// - `session` - The default session is [factories::CoreSessionFactory].
/// - `retriever` - The default orchestrator is
///   [factories::CoreRetrieverFactory].
/// - `bitswap` - [factories::BitswapRetrieverFactory].
/// - `graphsync` - [factories::GraphsyncRetrieverFactory].
/// - `http` - [factories::HttpRetrieverFactory].
pub fn default_builder() -> Builder {
    Builder {
        candidate_finder: factories::MemCandidateFinderFactory::create(),
        host: factories::MemHostFactory::create(),
        session: factories::CoreSessionFactory::create(),
        retriever: factories::CoreRetrieverFactory::create(),
        bitswap: factories::BitswapRetrieverFactory::create(),
        graphsync: factories::GraphsyncRetrieverFactory::create(),
        http: factories::HttpRetrieverFactory::create(),
    }
}

pub mod factories;

mod lassie;
pub use lassie::*;
