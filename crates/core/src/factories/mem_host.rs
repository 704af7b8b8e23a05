//! The mem host implementation provided by lassie.

use crate::factories::MemBlockStore;
use lassie_api::*;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, OnceLock};
use tokio::sync::watch;

/// MemHost configuration types.
mod config {
    /// Configuration parameters for [MemHostFactory](super::MemHostFactory),
    /// transcoded from the instance network options.
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    pub struct MemHostConfig {
        /// Hosts can only reach other hosts on the same network id.
        /// Since rust test runs multiple tests in the same process,
        /// this defaults to the current thread id when this config
        /// instance is constructed. If you are creating hosts in tests
        /// from different tasks, you may need to pick an explicit id.
        pub network_id: String,
    }

    impl Default for MemHostConfig {
        fn default() -> Self {
            Self {
                network_id: format!("{:?}", std::thread::current().id()),
            }
        }
    }
}

pub use config::*;

/// The mem host implementation provided by lassie.
/// This is NOT a production module. It is for testing only.
/// It will only reach providers within the same process.
#[derive(Debug)]
pub struct MemHostFactory {}

impl MemHostFactory {
    /// Construct a new MemHostFactory.
    pub fn create() -> DynHostFactory {
        let out: DynHostFactory = Arc::new(MemHostFactory {});
        out
    }
}

impl HostFactory for MemHostFactory {
    fn create(
        &self,
        options: NetworkOptions,
    ) -> BoxFut<'static, LassieResult<DynHost>> {
        // transcode here, the thread id default must be taken
        // on the caller's thread
        let config = serde_json::from_value::<MemHostConfig>(
            serde_json::Value::Object(options),
        )
        .map_err(|err| LassieError::other_src("invalid network options", err));
        Box::pin(async move {
            let out: DynHost = MemHost::create(config?);
            Ok(out)
        })
    }
}

type NetworkId = Arc<str>;
type Network = HashMap<ProviderId, Arc<MemBlockStore>>;
static NETWORKS: OnceLock<Mutex<HashMap<NetworkId, Network>>> =
    OnceLock::new();

fn networks() -> std::sync::MutexGuard<'static, HashMap<NetworkId, Network>> {
    NETWORKS.get_or_init(Default::default).lock().unwrap()
}

fn lookup(
    network_id: &NetworkId,
    provider: &ProviderId,
) -> LassieResult<Arc<MemBlockStore>> {
    networks()
        .get(network_id)
        .and_then(|n| n.get(provider))
        .cloned()
        .ok_or_else(|| {
            LassieError::other(format!("provider unreachable: {provider}"))
        })
}

/// An in-process network host.
///
/// Every host serves the blocks in its own [MemBlockStore] to the other
/// hosts on its network, and leaves the network when dropped.
#[derive(Debug)]
pub struct MemHost {
    peer_id: ProviderId,
    network_id: NetworkId,
    store: Arc<MemBlockStore>,
}

impl Drop for MemHost {
    fn drop(&mut self) {
        let mut lock = networks();
        if let Some(network) = lock.get_mut(&self.network_id) {
            network.remove(&self.peer_id);
            if network.is_empty() {
                lock.remove(&self.network_id);
            }
        }
    }
}

impl MemHost {
    /// Construct a host with a fresh ed25519 identity and join its
    /// network.
    pub fn create(config: MemHostConfig) -> Arc<Self> {
        let signing_key =
            ed25519_dalek::SigningKey::from_bytes(&rand::random());
        let peer_id = ProviderId::from(bytes::Bytes::copy_from_slice(
            signing_key.verifying_key().as_bytes(),
        ));
        let network_id: NetworkId = config.network_id.into_boxed_str().into();
        let store = MemBlockStore::create();

        networks()
            .entry(network_id.clone())
            .or_default()
            .insert(peer_id.clone(), store.clone());

        tracing::debug!(%peer_id, %network_id, "mem host joined network");

        Arc::new(Self {
            peer_id,
            network_id,
            store,
        })
    }

    /// The blocks this host serves.
    pub fn store(&self) -> &Arc<MemBlockStore> {
        &self.store
    }
}

impl Host for MemHost {
    fn peer_id(&self) -> ProviderId {
        self.peer_id.clone()
    }

    fn request_block(
        &self,
        from: ProviderId,
        cid: Cid,
    ) -> BoxFut<'_, LassieResult<Block>> {
        Box::pin(async move {
            lookup(&self.network_id, &from)?.get(&cid).ok_or_else(|| {
                LassieError::other(format!("{from} does not have {cid}"))
            })
        })
    }

    fn transfer_client(&self) -> BoxFut<'_, LassieResult<DynTransferClient>> {
        Box::pin(async move {
            let out: DynTransferClient =
                Arc::new(MemTransferClient::new(self.network_id.clone()));
            Ok(out)
        })
    }
}

type Ready = Option<LassieResult<()>>;

#[derive(Debug)]
struct MemTransferClient {
    network_id: NetworkId,
    ready: watch::Receiver<Ready>,
}

impl MemTransferClient {
    fn new(network_id: NetworkId) -> Self {
        let (send, ready) = watch::channel(None);

        // the transfer manager comes up in the background
        tokio::task::spawn(async move {
            tokio::task::yield_now().await;
            send.send_replace(Some(Ok(())));
        });

        Self { network_id, ready }
    }
}

impl TransferClient for MemTransferClient {
    fn await_ready(&self) -> BoxFut<'_, LassieResult<()>> {
        Box::pin(async move {
            let mut ready = self.ready.clone();
            let state = ready.wait_for(Option::is_some).await.map_err(|err| {
                LassieError::other_src("transfer manager stopped", err)
            })?;
            match &*state {
                Some(r) => r.clone(),
                None => Err(LassieError::other("transfer manager not ready")),
            }
        })
    }

    fn retrieve(
        &self,
        from: ProviderId,
        root: Cid,
    ) -> BoxFut<'_, LassieResult<Vec<Block>>> {
        Box::pin(async move {
            let store = lookup(&self.network_id, &from)?;

            // depth-first, root first, children in link order
            let mut out = Vec::new();
            let mut seen = HashSet::new();
            let mut stack = vec![root];
            while let Some(cid) = stack.pop() {
                if !seen.insert(cid.clone()) {
                    continue;
                }
                let block = store.get(&cid).ok_or_else(|| {
                    LassieError::other(format!("{from} does not have {cid}"))
                })?;
                stack.extend(block.links.iter().rev().cloned());
                out.push(block);
            }
            Ok(out)
        })
    }
}
