//! Retrieval lifecycle events.

use crate::*;
use std::sync::Arc;
use std::time::Duration;

/// An event in the lifecycle of a retrieval.
#[derive(Debug, Clone)]
pub enum RetrievalEvent {
    /// The retrieval was accepted by the orchestrator.
    Started {
        /// The retrieval.
        retrieval_id: RetrievalId,
        /// The requested root.
        root: Cid,
    },

    /// The candidate finder returned candidates.
    CandidatesFound {
        /// The retrieval.
        retrieval_id: RetrievalId,
        /// The requested root.
        root: Cid,
        /// Every candidate found.
        candidates: Vec<Candidate>,
    },

    /// Candidates that passed policy and protocol filtering.
    CandidatesFiltered {
        /// The retrieval.
        retrieval_id: RetrievalId,
        /// The requested root.
        root: Cid,
        /// The candidates that will be tried.
        candidates: Vec<Candidate>,
    },

    /// A protocol retriever began retrieving from a provider.
    ProviderStarted {
        /// The retrieval.
        retrieval_id: RetrievalId,
        /// The requested root.
        root: Cid,
        /// The provider.
        provider: ProviderId,
        /// The protocol in use.
        protocol: ProtocolCode,
    },

    /// The first block arrived from a provider.
    FirstByte {
        /// The retrieval.
        retrieval_id: RetrievalId,
        /// The requested root.
        root: Cid,
        /// The provider.
        provider: ProviderId,
        /// The protocol in use.
        protocol: ProtocolCode,
        /// Time since the provider retrieval started.
        elapsed: Duration,
    },

    /// Retrieving from a provider failed. Other providers or
    /// protocols may still succeed.
    ProviderFailed {
        /// The retrieval.
        retrieval_id: RetrievalId,
        /// The requested root.
        root: Cid,
        /// The provider.
        provider: ProviderId,
        /// The protocol in use.
        protocol: ProtocolCode,
        /// What went wrong.
        error: LassieError,
    },

    /// The retrieval completed.
    Success {
        /// The retrieval.
        retrieval_id: RetrievalId,
        /// The requested root.
        root: Cid,
        /// The outcome.
        stats: RetrievalStats,
    },

    /// The retrieval failed.
    Failed {
        /// The retrieval.
        retrieval_id: RetrievalId,
        /// The requested root.
        root: Cid,
        /// What went wrong.
        error: LassieError,
    },

    /// The orchestrator is done with this retrieval. Always the last
    /// event of a retrieval that was started.
    Finished {
        /// The retrieval.
        retrieval_id: RetrievalId,
        /// The requested root.
        root: Cid,
    },
}

impl RetrievalEvent {
    /// The retrieval this event belongs to.
    pub fn retrieval_id(&self) -> RetrievalId {
        match self {
            Self::Started { retrieval_id, .. }
            | Self::CandidatesFound { retrieval_id, .. }
            | Self::CandidatesFiltered { retrieval_id, .. }
            | Self::ProviderStarted { retrieval_id, .. }
            | Self::FirstByte { retrieval_id, .. }
            | Self::ProviderFailed { retrieval_id, .. }
            | Self::Success { retrieval_id, .. }
            | Self::Failed { retrieval_id, .. }
            | Self::Finished { retrieval_id, .. } => *retrieval_id,
        }
    }

    /// The root this event refers to.
    pub fn root(&self) -> &Cid {
        match self {
            Self::Started { root, .. }
            | Self::CandidatesFound { root, .. }
            | Self::CandidatesFiltered { root, .. }
            | Self::ProviderStarted { root, .. }
            | Self::FirstByte { root, .. }
            | Self::ProviderFailed { root, .. }
            | Self::Success { root, .. }
            | Self::Failed { root, .. }
            | Self::Finished { root, .. } => root,
        }
    }

    /// A short name for the event kind, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::CandidatesFound { .. } => "candidates-found",
            Self::CandidatesFiltered { .. } => "candidates-filtered",
            Self::ProviderStarted { .. } => "provider-started",
            Self::FirstByte { .. } => "first-byte",
            Self::ProviderFailed { .. } => "provider-failed",
            Self::Success { .. } => "success",
            Self::Failed { .. } => "failed",
            Self::Finished { .. } => "finished",
        }
    }
}

/// Receives the events of a single fetch.
pub type EventsCallback = Arc<dyn Fn(&RetrievalEvent) + 'static + Send + Sync>;

/// Receives the events of every fetch made through an instance.
pub type RetrievalEventSubscriber =
    Arc<dyn Fn(&RetrievalEvent) + 'static + Send + Sync>;

/// Removes a previously registered [RetrievalEventSubscriber].
pub type Unregister = Box<dyn Fn() + 'static + Send + Sync>;

/// An [EventsCallback] that discards every event.
pub fn noop_events_callback() -> EventsCallback {
    Arc::new(|_: &RetrievalEvent| {})
}
