//! Builder-related types.

use crate::*;

/// The general lassie builder.
/// This contains the factory instances used to construct the collaborators
/// of a lassie instance. Configuration is supplied separately, when the
/// instance is created.
#[derive(Debug, Clone)]
pub struct Builder {
    /// Constructs the [CandidateFinder] if the configuration has none.
    pub candidate_finder: DynCandidateFinderFactory,

    /// Constructs the [Host] if the configuration has none.
    pub host: DynHostFactory,

    /// Constructs the instance [Session].
    pub session: DynSessionFactory,

    /// Constructs the [Retriever] orchestrator.
    pub retriever: DynRetrieverFactory,

    /// Constructs the [ProtocolCode::TransportBitswap] retriever.
    pub bitswap: DynCandidateRetrieverFactory,

    /// Constructs the [ProtocolCode::TransportGraphsyncFilecoinv1]
    /// retriever.
    pub graphsync: DynCandidateRetrieverFactory,

    /// Constructs the [ProtocolCode::TransportIpfsGatewayHttp] retriever.
    pub http: DynCandidateRetrieverFactory,
}

impl Builder {
    /// The factory for `protocol`, or `None` if lassie does not know
    /// how to retrieve with it.
    pub fn protocol_retriever(
        &self,
        protocol: ProtocolCode,
    ) -> Option<&DynCandidateRetrieverFactory> {
        match ProtocolCode::from(protocol.code()) {
            ProtocolCode::TransportBitswap => Some(&self.bitswap),
            ProtocolCode::TransportGraphsyncFilecoinv1 => Some(&self.graphsync),
            ProtocolCode::TransportIpfsGatewayHttp => Some(&self.http),
            ProtocolCode::Other(_) => None,
        }
    }
}
