//! Types for use when configuring a lassie instance.
//!
//! [LassieConfig] is a plain record. It can be filled in directly, loaded
//! from JSON (the serializable part tolerates missing properties), or
//! built by applying an ordered list of [LassieOption]s with
//! [LassieConfig::resolve]. In every case, [LassieConfig::set_defaults]
//! fills the fields that were left unset with the documented defaults.
//!
//! No bounds validation is performed on the numeric fields.

use crate::*;
use std::collections::HashSet;
use std::time::Duration;

/// Default timeout for retrieving data from a single provider.
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(20);

/// Default block-exchange concurrency across all retrievals of an instance.
pub const DEFAULT_BITSWAP_CONCURRENCY: usize = 32;

/// Default block-exchange concurrency within a single retrieval.
pub const DEFAULT_BITSWAP_CONCURRENCY_PER_RETRIEVAL: usize = 12;

/// Opaque low-level network options, handed verbatim to the
/// [HostFactory](crate::HostFactory).
pub type NetworkOptions = serde_json::Map<String, serde_json::Value>;

/// Configuration of a lassie instance.
#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LassieConfig {
    /// Discovery collaborator. If unset, the builder's
    /// candidate finder factory constructs one.
    #[serde(skip)]
    pub candidate_finder: Option<DynCandidateFinder>,

    /// Network identity collaborator. If unset, the builder's host
    /// factory constructs one from [LassieConfig::network_options].
    #[serde(skip)]
    pub host: Option<DynHost>,

    /// How long a single provider may go without delivering data
    /// before its retrieval fails. Default: 20s.
    pub provider_timeout: Duration,

    /// Maximum number of concurrent retrievals from a single provider.
    /// Zero means unlimited. Default: 0.
    pub concurrent_sp_retrievals: usize,

    /// Ceiling on the duration of an entire fetch. Zero means no
    /// instance-level ceiling. Default: 0.
    pub global_timeout: Duration,

    /// Options for the network host, if one is constructed.
    pub network_options: NetworkOptions,

    /// Protocols to retrieve with, in order. Default: bitswap,
    /// graphsync-filecoinv1, ipfs-gateway-http.
    pub protocols: Vec<ProtocolCode>,

    /// Providers never to retrieve from. `None` excludes nobody.
    pub provider_block_list: Option<HashSet<ProviderId>>,

    /// If set, the only providers to retrieve from. `None` allows
    /// every provider that is not blocked.
    pub provider_allow_list: Option<HashSet<ProviderId>>,

    /// Block-exchange concurrency across all retrievals. Default: 32.
    pub bitswap_concurrency: usize,

    /// Block-exchange concurrency within one retrieval. Default: 12.
    pub bitswap_concurrency_per_retrieval: usize,
}

/// A single configuration mutation.
///
/// Options are applied in order; when the same field is set more than
/// once, the last applied value wins.
#[derive(Debug, Clone)]
pub enum LassieOption {
    /// Set [LassieConfig::candidate_finder].
    CandidateFinder(DynCandidateFinder),
    /// Set [LassieConfig::host].
    Host(DynHost),
    /// Set [LassieConfig::provider_timeout].
    ProviderTimeout(Duration),
    /// Set [LassieConfig::concurrent_sp_retrievals].
    ConcurrentSpRetrievals(usize),
    /// Set [LassieConfig::global_timeout].
    GlobalTimeout(Duration),
    /// Set [LassieConfig::network_options].
    NetworkOptions(NetworkOptions),
    /// Set [LassieConfig::protocols].
    Protocols(Vec<ProtocolCode>),
    /// Set [LassieConfig::provider_block_list].
    ProviderBlockList(Option<HashSet<ProviderId>>),
    /// Set [LassieConfig::provider_allow_list].
    ProviderAllowList(Option<HashSet<ProviderId>>),
    /// Set [LassieConfig::bitswap_concurrency].
    BitswapConcurrency(usize),
    /// Set [LassieConfig::bitswap_concurrency_per_retrieval].
    BitswapConcurrencyPerRetrieval(usize),
}

impl LassieConfig {
    /// Apply options in order to an empty configuration, then fill in
    /// defaults. This performs no I/O.
    pub fn resolve(options: impl IntoIterator<Item = LassieOption>) -> Self {
        let mut config = Self::default();
        for option in options {
            config.apply(option);
        }
        config.set_defaults();
        config
    }

    /// Apply a single option, overwriting any previous value of the field.
    pub fn apply(&mut self, option: LassieOption) {
        match option {
            LassieOption::CandidateFinder(f) => {
                self.candidate_finder = Some(f)
            }
            LassieOption::Host(h) => self.host = Some(h),
            LassieOption::ProviderTimeout(t) => self.provider_timeout = t,
            LassieOption::ConcurrentSpRetrievals(n) => {
                self.concurrent_sp_retrievals = n
            }
            LassieOption::GlobalTimeout(t) => self.global_timeout = t,
            LassieOption::NetworkOptions(o) => self.network_options = o,
            LassieOption::Protocols(p) => self.protocols = p,
            LassieOption::ProviderBlockList(l) => {
                self.provider_block_list = l
            }
            LassieOption::ProviderAllowList(l) => {
                self.provider_allow_list = l
            }
            LassieOption::BitswapConcurrency(n) => {
                self.bitswap_concurrency = n
            }
            LassieOption::BitswapConcurrencyPerRetrieval(n) => {
                self.bitswap_concurrency_per_retrieval = n
            }
        }
    }

    /// Builder-style [LassieConfig::apply].
    pub fn with(mut self, option: LassieOption) -> Self {
        self.apply(option);
        self
    }

    /// Give every field still at its zero value its documented default.
    /// Fields that were set are left alone, so this is idempotent.
    pub fn set_defaults(&mut self) {
        if self.provider_timeout.is_zero() {
            self.provider_timeout = DEFAULT_PROVIDER_TIMEOUT;
        }
        if self.bitswap_concurrency == 0 {
            self.bitswap_concurrency = DEFAULT_BITSWAP_CONCURRENCY;
        }
        if self.bitswap_concurrency_per_retrieval == 0 {
            self.bitswap_concurrency_per_retrieval =
                DEFAULT_BITSWAP_CONCURRENCY_PER_RETRIEVAL;
        }
        if self.protocols.is_empty() {
            self.protocols = ProtocolCode::DEFAULT_PROTOCOLS.to_vec();
        }
    }

    /// The session policy derived from this configuration.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::default()
            .with_provider_block_list(self.provider_block_list.clone())
            .with_provider_allow_list(self.provider_allow_list.clone())
            .with_default_provider_config(ProviderConfig {
                retrieval_timeout: self.provider_timeout,
                max_concurrent_retrievals: self.concurrent_sp_retrievals,
            })
    }
}
