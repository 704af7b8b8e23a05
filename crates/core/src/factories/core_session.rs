//! The core session implementation provided by lassie.

use lassie_api::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// The core session implementation provided by lassie.
///
/// Allow / block policy is static. Concurrency accounting is kept per
/// provider, with a semaphore per provider when the applicable
/// [ProviderConfig::max_concurrent_retrievals] is non-zero.
///
/// At most [MAX_TRACKED_PROVIDERS] providers are tracked. Once the table
/// is full, providers with no retrieval in flight or waiting are
/// forgotten, along with their success and failure history.
#[derive(Debug)]
pub struct CoreSessionFactory {}

impl CoreSessionFactory {
    /// Construct a new CoreSessionFactory.
    pub fn create() -> DynSessionFactory {
        let out: DynSessionFactory = Arc::new(CoreSessionFactory {});
        out
    }
}

impl SessionFactory for CoreSessionFactory {
    fn create(&self, config: SessionConfig, live: bool) -> DynSession {
        let out: DynSession = Arc::new(CoreSession::new(config, live));
        out
    }
}

/// Provider table size at which idle providers are evicted.
pub const MAX_TRACKED_PROVIDERS: usize = 4096;

#[derive(Debug)]
struct ProviderState {
    limit: Option<Arc<Semaphore>>,
    active: Arc<AtomicUsize>,
    successes: u64,
    failures: u64,
    last_duration: Option<Duration>,
}

impl ProviderState {
    fn new(config: ProviderConfig) -> Self {
        let limit = match config.max_concurrent_retrievals {
            0 => None,
            n => Some(Arc::new(Semaphore::new(n))),
        };
        Self {
            limit,
            active: Arc::new(AtomicUsize::new(0)),
            successes: 0,
            failures: 0,
            last_duration: None,
        }
    }

    /// Whether any retrieval holds or waits on this provider. Every such
    /// retrieval keeps a clone of `active`.
    fn is_busy(&self) -> bool {
        Arc::strong_count(&self.active) > 1
    }

    /// Failures not offset by successes. Lower is better.
    fn score(&self) -> i64 {
        self.failures as i64 - self.successes as i64
    }
}

/// Decrements the active count before the semaphore permit is released.
struct ActiveGuard {
    active: Arc<AtomicUsize>,
    _permit: Option<tokio::sync::OwnedSemaphorePermit>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug)]
struct CoreSession {
    config: SessionConfig,
    live: bool,
    capacity: usize,
    providers: Mutex<HashMap<ProviderId, ProviderState>>,
}

impl CoreSession {
    fn new(config: SessionConfig, live: bool) -> Self {
        Self::with_capacity(config, live, MAX_TRACKED_PROVIDERS)
    }

    fn with_capacity(
        config: SessionConfig,
        live: bool,
        capacity: usize,
    ) -> Self {
        Self {
            config,
            live,
            capacity,
            providers: Mutex::new(HashMap::new()),
        }
    }

    fn with_state<R>(
        &self,
        provider: &ProviderId,
        f: impl FnOnce(&mut ProviderState) -> R,
    ) -> R {
        let mut lock = self.providers.lock().unwrap();
        if lock.len() >= self.capacity && !lock.contains_key(provider) {
            let before = lock.len();
            lock.retain(|_, s| s.is_busy());
            tracing::debug!(
                evicted = before - lock.len(),
                "evicted idle providers"
            );
        }
        let state = lock.entry(provider.clone()).or_insert_with(|| {
            ProviderState::new(self.config.provider_config(provider))
        });
        f(state)
    }
}

impl Session for CoreSession {
    fn filter_candidate(&self, candidate: &Candidate) -> bool {
        if let Some(block) = &self.config.provider_block_list {
            if block.contains(&candidate.provider) {
                return false;
            }
        }
        match &self.config.provider_allow_list {
            None => true,
            Some(allow) => allow.contains(&candidate.provider),
        }
    }

    fn provider_config(&self, provider: &ProviderId) -> ProviderConfig {
        self.config.provider_config(provider)
    }

    fn acquire(
        &self,
        provider: &ProviderId,
    ) -> BoxFut<'_, LassieResult<ProviderPermit>> {
        let provider = provider.clone();
        Box::pin(async move {
            if !self.live {
                return Ok(ProviderPermit::unlimited());
            }

            let (limit, active) = self.with_state(&provider, |s| {
                (s.limit.clone(), s.active.clone())
            });

            let permit = match limit {
                None => None,
                Some(limit) => Some(limit.acquire_owned().await.map_err(
                    |err| LassieError::other_src("provider limit closed", err),
                )?),
            };

            active.fetch_add(1, Ordering::SeqCst);
            Ok(ProviderPermit::new(ActiveGuard {
                active,
                _permit: permit,
            }))
        })
    }

    fn active_retrievals(&self, provider: &ProviderId) -> usize {
        self.providers
            .lock()
            .unwrap()
            .get(provider)
            .map(|s| s.active.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    fn record_success(&self, provider: &ProviderId, elapsed: Duration) {
        tracing::debug!(?provider, ?elapsed, "provider retrieval success");
        self.with_state(provider, |s| {
            s.successes += 1;
            s.last_duration = Some(elapsed);
        });
    }

    fn record_failure(&self, provider: &ProviderId) {
        tracing::debug!(?provider, "provider retrieval failure");
        self.with_state(provider, |s| s.failures += 1);
    }

    fn sort_candidates(&self, candidates: &mut [Candidate]) {
        let lock = self.providers.lock().unwrap();
        candidates.sort_by_key(|c| {
            lock.get(&c.provider)
                .map(|s| (s.score(), s.last_duration))
                .unwrap_or((0, None))
        });
    }
}
