//! Retriever related types.
//!
//! There are two layers of retriever:
//!
//! - A [CandidateRetriever] implements one transport protocol. Given a
//!   request and a list of candidates that support its protocol, it moves
//!   the content into the request sink.
//! - The [Retriever] is the orchestrator. It finds candidates, applies
//!   session policy, picks protocol retrievers and reports events.

use crate::*;
use std::collections::HashMap;
use std::sync::Arc;

/// A transport-specific retriever.
pub trait CandidateRetriever: 'static + Send + Sync + std::fmt::Debug {
    /// The protocol this retriever implements.
    fn protocol(&self) -> ProtocolCode;

    /// Retrieve `request` from `candidates`, all of which announced
    /// [CandidateRetriever::protocol]. Candidates are given in order of
    /// preference.
    fn retrieve(
        &self,
        ctx: Context,
        request: RetrievalRequest,
        candidates: Vec<Candidate>,
        events: EventsCallback,
    ) -> BoxFut<'_, LassieResult<RetrievalStats>>;
}

/// Trait-object [CandidateRetriever].
pub type DynCandidateRetriever = Arc<dyn CandidateRetriever>;

/// Protocol retrievers by protocol.
pub type ProtocolRetrievers = HashMap<ProtocolCode, DynCandidateRetriever>;

/// Everything a protocol retriever may be built from.
#[derive(Debug, Clone)]
pub struct ProtocolRetrieverDeps {
    /// The resolved instance configuration.
    pub config: Arc<LassieConfig>,

    /// The instance session.
    pub session: DynSession,

    /// The instance network host.
    pub host: DynHost,
}

/// A factory for constructing [CandidateRetriever] instances.
pub trait CandidateRetrieverFactory:
    'static + Send + Sync + std::fmt::Debug
{
    /// Construct a protocol retriever. This may wait for the retriever
    /// to become ready and fails if it cannot.
    fn create(
        &self,
        deps: ProtocolRetrieverDeps,
    ) -> BoxFut<'static, LassieResult<DynCandidateRetriever>>;
}

/// Trait-object [CandidateRetrieverFactory].
pub type DynCandidateRetrieverFactory = Arc<dyn CandidateRetrieverFactory>;

/// The retrieval orchestrator.
pub trait Retriever: 'static + Send + Sync + std::fmt::Debug {
    /// Start the orchestrator. Must be called exactly once before
    /// [Retriever::retrieve].
    fn start(&self) -> LassieResult<()>;

    /// Run a retrieval to completion.
    fn retrieve(
        &self,
        ctx: Context,
        request: RetrievalRequest,
        events: EventsCallback,
    ) -> BoxFut<'_, LassieResult<RetrievalStats>>;

    /// Register a subscriber for the events of every retrieval.
    /// Invoking the returned function unregisters it.
    fn register_subscriber(
        &self,
        subscriber: RetrievalEventSubscriber,
    ) -> Unregister;
}

/// Trait-object [Retriever].
pub type DynRetriever = Arc<dyn Retriever>;

/// A factory for constructing [Retriever] instances.
pub trait RetrieverFactory: 'static + Send + Sync + std::fmt::Debug {
    /// Construct an orchestrator. The orchestrator is not started.
    fn create(
        &self,
        session: DynSession,
        candidate_finder: DynCandidateFinder,
        protocol_retrievers: ProtocolRetrievers,
    ) -> LassieResult<DynRetriever>;
}

/// Trait-object [RetrieverFactory].
pub type DynRetrieverFactory = Arc<dyn RetrieverFactory>;
