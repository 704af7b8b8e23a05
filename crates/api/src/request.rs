//! Retrieval request and result types.

use crate::*;
use std::sync::Arc;
use std::time::Duration;

/// A single block of content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// The identifier of this block.
    pub cid: Cid,

    /// The raw block bytes.
    pub data: bytes::Bytes,

    /// The child links of this block, when they are known to whoever
    /// produced the block. Blocks read from a CAR stream have none.
    pub links: Vec<Cid>,
}

impl Block {
    /// Construct a block without links.
    pub fn new(cid: Cid, data: bytes::Bytes) -> Self {
        Self {
            cid,
            data,
            links: Vec::new(),
        }
    }

    /// Attach child links.
    pub fn with_links(mut self, links: Vec<Cid>) -> Self {
        self.links = links;
        self
    }
}

/// The destination for retrieved blocks.
///
/// A retrieval may write the same block more than once, for example when
/// multiple protocols race for the same content, so implementations must
/// tolerate duplicates.
pub trait RetrievalSink: 'static + Send + Sync + std::fmt::Debug {
    /// Store a retrieved block.
    fn put_block(&self, block: Block) -> BoxFut<'_, LassieResult<()>>;
}

/// Trait-object [RetrievalSink].
pub type DynRetrievalSink = Arc<dyn RetrievalSink>;

/// A request to retrieve the content rooted at a [Cid].
#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    /// Correlates the events of this retrieval.
    pub retrieval_id: RetrievalId,

    /// The root of the content to retrieve.
    pub root: Cid,

    /// Where retrieved blocks are written.
    pub sink: DynRetrievalSink,

    /// If set, restricts the retrieval to these protocols.
    pub protocols: Option<Vec<ProtocolCode>>,
}

impl RetrievalRequest {
    /// Construct a request with a fresh [RetrievalId] and no protocol
    /// restriction.
    pub fn new(root: Cid, sink: DynRetrievalSink) -> Self {
        Self {
            retrieval_id: RetrievalId::new(),
            root,
            sink,
            protocols: None,
        }
    }

    /// Restrict the retrieval to the given protocols.
    pub fn with_protocols(mut self, protocols: Vec<ProtocolCode>) -> Self {
        self.protocols = Some(protocols);
        self
    }

    /// Returns true if the request allows retrieving with `protocol`.
    pub fn allows_protocol(&self, protocol: ProtocolCode) -> bool {
        match &self.protocols {
            None => true,
            Some(list) => list.contains(&protocol),
        }
    }
}

/// Details about a completed retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalStats {
    /// The root that was retrieved.
    pub root: Cid,

    /// The provider that served the root, if a single one did.
    pub provider: Option<ProviderId>,

    /// The protocol that completed the retrieval.
    pub protocol: ProtocolCode,

    /// Total block bytes received.
    pub size: u64,

    /// Number of blocks received.
    pub blocks: u64,

    /// Time from the start of the protocol retrieval until completion.
    pub duration: Duration,
}

/// Per-call configuration for a fetch.
#[derive(Clone, Default)]
pub struct FetchConfig {
    /// Receives the events of this fetch only.
    pub events_callback: Option<EventsCallback>,
}

impl std::fmt::Debug for FetchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchConfig")
            .field("events_callback", &self.events_callback.is_some())
            .finish()
    }
}

impl FetchConfig {
    /// Set the events callback.
    pub fn with_events_callback(mut self, cb: EventsCallback) -> Self {
        self.events_callback = Some(cb);
        self
    }

    /// The events callback, or a no-op sink if none was set.
    pub fn events_callback(&self) -> EventsCallback {
        match &self.events_callback {
            Some(cb) => cb.clone(),
            None => noop_events_callback(),
        }
    }
}
