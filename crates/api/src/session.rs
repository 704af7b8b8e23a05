//! Session related types.
//!
//! A session is the policy object shared by the orchestrator and every
//! protocol retriever of an instance. It decides which providers may be
//! used and bounds how much each provider is used at once.

use crate::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Per-provider retrieval policy.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// How long a provider may go without delivering data.
    pub retrieval_timeout: Duration,

    /// Maximum concurrent retrievals from the provider. Zero means
    /// unlimited.
    pub max_concurrent_retrievals: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            retrieval_timeout: DEFAULT_PROVIDER_TIMEOUT,
            max_concurrent_retrievals: 0,
        }
    }
}

/// Session policy configuration.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Providers never to retrieve from. `None` excludes nobody.
    pub provider_block_list: Option<HashSet<ProviderId>>,

    /// If set, the only providers to retrieve from. `None` allows every
    /// provider that is not blocked, `Some` of an empty set allows none.
    pub provider_allow_list: Option<HashSet<ProviderId>>,

    /// Policy for providers without an entry in
    /// [SessionConfig::provider_configs].
    pub default_provider_config: ProviderConfig,

    /// Policy overrides for specific providers.
    pub provider_configs: HashMap<ProviderId, ProviderConfig>,
}

impl SessionConfig {
    /// Set the block list.
    pub fn with_provider_block_list(
        mut self,
        list: Option<HashSet<ProviderId>>,
    ) -> Self {
        self.provider_block_list = list;
        self
    }

    /// Set the allow list.
    pub fn with_provider_allow_list(
        mut self,
        list: Option<HashSet<ProviderId>>,
    ) -> Self {
        self.provider_allow_list = list;
        self
    }

    /// Set the default provider policy.
    pub fn with_default_provider_config(
        mut self,
        config: ProviderConfig,
    ) -> Self {
        self.default_provider_config = config;
        self
    }

    /// Override the policy of one provider.
    pub fn with_provider_config(
        mut self,
        provider: ProviderId,
        config: ProviderConfig,
    ) -> Self {
        self.provider_configs.insert(provider, config);
        self
    }

    /// The policy that applies to `provider`.
    pub fn provider_config(&self, provider: &ProviderId) -> ProviderConfig {
        self.provider_configs
            .get(provider)
            .copied()
            .unwrap_or(self.default_provider_config)
    }
}

/// Holds a provider retrieval slot. The slot is released on drop.
pub struct ProviderPermit(Option<Box<dyn std::any::Any + Send + Sync>>);

impl std::fmt::Debug for ProviderPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ProviderPermit")
            .field(&self.0.is_some())
            .finish()
    }
}

impl ProviderPermit {
    /// A permit backed by `guard`, which is dropped with the permit.
    pub fn new<G: 'static + Send + Sync>(guard: G) -> Self {
        Self(Some(Box::new(guard)))
    }

    /// A permit that holds nothing.
    pub fn unlimited() -> Self {
        Self(None)
    }
}

/// The shared retrieval policy object.
pub trait Session: 'static + Send + Sync + std::fmt::Debug {
    /// Returns true if `candidate` may be retrieved from.
    fn filter_candidate(&self, candidate: &Candidate) -> bool;

    /// The policy that applies to `provider`.
    fn provider_config(&self, provider: &ProviderId) -> ProviderConfig;

    /// Wait for a retrieval slot for `provider`.
    fn acquire(
        &self,
        provider: &ProviderId,
    ) -> BoxFut<'_, LassieResult<ProviderPermit>>;

    /// The number of retrievals currently holding a slot for `provider`.
    fn active_retrievals(&self, provider: &ProviderId) -> usize;

    /// Record a successful retrieval from `provider`.
    fn record_success(&self, provider: &ProviderId, elapsed: Duration);

    /// Record a failed retrieval from `provider`.
    fn record_failure(&self, provider: &ProviderId);

    /// Order candidates by preference. The default keeps the given order.
    fn sort_candidates(&self, _candidates: &mut [Candidate]) {}
}

/// Trait-object [Session].
pub type DynSession = Arc<dyn Session>;

/// A factory for constructing [Session] instances.
pub trait SessionFactory: 'static + Send + Sync + std::fmt::Debug {
    /// Construct a session. When `live` is false the session applies its
    /// allow / block policy but does no concurrency accounting.
    fn create(&self, config: SessionConfig, live: bool) -> DynSession;
}

/// Trait-object [SessionFactory].
pub type DynSessionFactory = Arc<dyn SessionFactory>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn provider_config_override() {
        let special: ProviderId = bytes::Bytes::from_static(b"special").into();
        let other: ProviderId = bytes::Bytes::from_static(b"other").into();
        let config = SessionConfig::default().with_provider_config(
            special.clone(),
            ProviderConfig {
                retrieval_timeout: Duration::from_secs(1),
                max_concurrent_retrievals: 1,
            },
        );
        assert_eq!(
            1,
            config.provider_config(&special).max_concurrent_retrievals
        );
        assert_eq!(ProviderConfig::default(), config.provider_config(&other));
    }
}
