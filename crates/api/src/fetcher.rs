//! The client-visible retrieval api.

use crate::*;

/// A reusable retrieval client.
pub trait Fetcher: 'static + Send + Sync + std::fmt::Debug {
    /// Retrieve the content described by `request` into its sink.
    ///
    /// Returns the orchestrator's result unchanged.
    fn fetch(
        &self,
        ctx: &Context,
        request: RetrievalRequest,
        config: FetchConfig,
    ) -> BoxFut<'_, LassieResult<RetrievalStats>>;

    /// Register a subscriber for the events of every fetch.
    /// Invoking the returned function unregisters it.
    fn register_subscriber(
        &self,
        subscriber: RetrievalEventSubscriber,
    ) -> Unregister;
}

/// Trait-object [Fetcher].
pub type DynFetcher = std::sync::Arc<dyn Fetcher>;
