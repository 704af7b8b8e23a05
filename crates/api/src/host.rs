//! Network identity and connectivity types.

use crate::*;
use std::sync::Arc;

/// A network identity with connectivity to providers.
///
/// The host is shared by every protocol retriever that needs the network.
pub trait Host: 'static + Send + Sync + std::fmt::Debug {
    /// The identity of this host.
    fn peer_id(&self) -> ProviderId;

    /// Request a single block from a provider over the block-exchange
    /// protocol.
    fn request_block(
        &self,
        from: ProviderId,
        cid: Cid,
    ) -> BoxFut<'_, LassieResult<Block>>;

    /// Construct a data-transfer client bound to this host.
    ///
    /// The returned client is not necessarily ready for use; see
    /// [TransferClient::await_ready].
    fn transfer_client(&self) -> BoxFut<'_, LassieResult<DynTransferClient>>;
}

/// Trait-object [Host].
pub type DynHost = Arc<dyn Host>;

/// A data-transfer client able to pull a whole graph from a provider.
pub trait TransferClient: 'static + Send + Sync + std::fmt::Debug {
    /// Resolves once the underlying transfer manager is ready, or
    /// with the error that prevented it from starting.
    fn await_ready(&self) -> BoxFut<'_, LassieResult<()>>;

    /// Pull the graph rooted at `root` from `from`, in traversal order.
    fn retrieve(
        &self,
        from: ProviderId,
        root: Cid,
    ) -> BoxFut<'_, LassieResult<Vec<Block>>>;
}

/// Trait-object [TransferClient].
pub type DynTransferClient = Arc<dyn TransferClient>;

/// A factory for constructing [Host] instances.
pub trait HostFactory: 'static + Send + Sync + std::fmt::Debug {
    /// Construct and initialize a host.
    fn create(
        &self,
        options: NetworkOptions,
    ) -> BoxFut<'static, LassieResult<DynHost>>;
}

/// Trait-object [HostFactory].
pub type DynHostFactory = Arc<dyn HostFactory>;
