//! Block-by-block retrieval over the host's block exchange.
//!
//! The retriever walks the DAG breadth first from the root, learning
//! child links from every block it receives. Each block is requested
//! from the candidates in order until one of them delivers it within
//! the block timeout.
//!
//! Block requests go through a two level scheduler: a semaphore shared
//! by every retrieval of the retriever, and a semaphore created per
//! retrieval. A request holds one permit of each while in flight.

use futures::stream::{FuturesUnordered, StreamExt};
use lassie_api::*;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::Instant;

/// BitswapRetriever configuration types.
pub mod config {
    use std::time::Duration;

    /// Configuration parameters for
    /// [BitswapRetrieverFactory](super::BitswapRetrieverFactory).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BitswapConfig {
        /// How long a single block request may take.
        pub block_timeout: Duration,

        /// Block requests in flight across every retrieval.
        pub concurrency: usize,

        /// Block requests in flight within one retrieval. Expected not
        /// to exceed [BitswapConfig::concurrency].
        pub concurrency_per_retrieval: usize,
    }

    impl From<&lassie_api::LassieConfig> for BitswapConfig {
        fn from(config: &lassie_api::LassieConfig) -> Self {
            Self {
                block_timeout: config.provider_timeout,
                concurrency: config.bitswap_concurrency,
                concurrency_per_retrieval: config
                    .bitswap_concurrency_per_retrieval,
            }
        }
    }
}

use config::*;

/// Block exchange retriever factory.
#[derive(Debug)]
pub struct BitswapRetrieverFactory {}

impl BitswapRetrieverFactory {
    /// Construct a new BitswapRetrieverFactory.
    pub fn create() -> DynCandidateRetrieverFactory {
        let out: DynCandidateRetrieverFactory =
            Arc::new(BitswapRetrieverFactory {});
        out
    }
}

impl CandidateRetrieverFactory for BitswapRetrieverFactory {
    fn create(
        &self,
        deps: ProtocolRetrieverDeps,
    ) -> BoxFut<'static, LassieResult<DynCandidateRetriever>> {
        Box::pin(async move {
            let config = BitswapConfig::from(&*deps.config);
            tracing::debug!(?config, "bitswap retriever");
            let out: DynCandidateRetriever =
                Arc::new(BitswapRetriever::new(config, deps.host));
            Ok(out)
        })
    }
}

#[derive(Debug)]
struct BitswapRetriever {
    config: BitswapConfig,
    host: DynHost,
    global: Arc<Semaphore>,
}

impl BitswapRetriever {
    fn new(config: BitswapConfig, host: DynHost) -> Self {
        Self {
            config,
            host,
            global: Arc::new(Semaphore::new(config.concurrency.max(1))),
        }
    }

    async fn fetch_block(
        &self,
        ctx: &Context,
        candidates: &[Candidate],
        local: Arc<Semaphore>,
        cid: Cid,
    ) -> LassieResult<(Block, ProviderId)> {
        let closed =
            |err| LassieError::other_src("bitswap scheduler closed", err);
        let _local = local.acquire_owned().await.map_err(closed)?;
        let _global =
            self.global.clone().acquire_owned().await.map_err(closed)?;

        let mut last_err = None;
        for candidate in candidates {
            let (block_ctx, _cancel) =
                ctx.with_timeout(self.config.block_timeout);
            let res = block_ctx
                .run(self.host.request_block(
                    candidate.provider.clone(),
                    cid.clone(),
                ))
                .await;
            match res {
                Ok(block) if block.cid == cid => {
                    return Ok((block, candidate.provider.clone()))
                }
                Ok(block) => {
                    last_err = Some(LassieError::other(format!(
                        "requested {cid}, received {}",
                        block.cid
                    )));
                }
                Err(err) => {
                    if let Some(err) = ctx.err() {
                        return Err(err);
                    }
                    let err = if err.is_context_error() {
                        LassieError::other(format!(
                            "block request timed out after {:?}",
                            self.config.block_timeout
                        ))
                    } else {
                        err
                    };
                    tracing::debug!(
                        provider = %candidate.provider,
                        %cid,
                        ?err,
                        "block request failed"
                    );
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            LassieError::other(format!("no candidate for block {cid}"))
        }))
    }

    async fn walk(
        &self,
        ctx: &Context,
        request: &RetrievalRequest,
        candidates: &[Candidate],
        events: &EventsCallback,
    ) -> LassieResult<RetrievalStats> {
        let start = Instant::now();
        let local = Arc::new(Semaphore::new(
            self.config.concurrency_per_retrieval.max(1),
        ));

        let mut seen = HashSet::from([request.root.clone()]);
        let mut queue = VecDeque::from([request.root.clone()]);
        let mut pending = FuturesUnordered::new();
        let mut root_provider = None;
        let mut size = 0;
        let mut blocks = 0;

        loop {
            while let Some(cid) = queue.pop_front() {
                pending.push(self.fetch_block(
                    ctx,
                    candidates,
                    local.clone(),
                    cid,
                ));
            }

            let Some(res) = pending.next().await else {
                break;
            };
            let (block, provider) = res?;

            if root_provider.is_none() {
                events(&RetrievalEvent::FirstByte {
                    retrieval_id: request.retrieval_id,
                    root: request.root.clone(),
                    provider: provider.clone(),
                    protocol: ProtocolCode::TransportBitswap,
                    elapsed: start.elapsed(),
                });
                root_provider = Some(provider);
            }

            size += block.data.len() as u64;
            blocks += 1;
            for link in block.links.iter() {
                if seen.insert(link.clone()) {
                    queue.push_back(link.clone());
                }
            }
            request.sink.put_block(block).await?;
        }

        Ok(RetrievalStats {
            root: request.root.clone(),
            provider: root_provider,
            protocol: ProtocolCode::TransportBitswap,
            size,
            blocks,
            duration: start.elapsed(),
        })
    }
}

impl CandidateRetriever for BitswapRetriever {
    fn protocol(&self) -> ProtocolCode {
        ProtocolCode::TransportBitswap
    }

    fn retrieve(
        &self,
        ctx: Context,
        request: RetrievalRequest,
        candidates: Vec<Candidate>,
        events: EventsCallback,
    ) -> BoxFut<'_, LassieResult<RetrievalStats>> {
        Box::pin(async move {
            for candidate in candidates.iter() {
                events(&RetrievalEvent::ProviderStarted {
                    retrieval_id: request.retrieval_id,
                    root: request.root.clone(),
                    provider: candidate.provider.clone(),
                    protocol: ProtocolCode::TransportBitswap,
                });
            }

            let res = ctx
                .run(self.walk(&ctx, &request, &candidates, &events))
                .await;

            if let Err(error) = &res {
                tracing::warn!(
                    root = %request.root,
                    ?error,
                    "bitswap retrieval failed"
                );
                for candidate in candidates.iter() {
                    events(&RetrievalEvent::ProviderFailed {
                        retrieval_id: request.retrieval_id,
                        root: request.root.clone(),
                        provider: candidate.provider.clone(),
                        protocol: ProtocolCode::TransportBitswap,
                        error: error.clone(),
                    });
                }
            }

            res
        })
    }
}
