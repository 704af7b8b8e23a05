use super::*;
use crate::factories::{
    CoreSessionFactory, MemBlockStore, MemHost, MemHostConfig,
};
use lassie_test_utils::{dag::TestDag, id::random_provider_id};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug)]
struct MockClient {
    ready: LassieResult<()>,
    delay: Duration,
    blocks: Vec<Block>,
    active: AtomicUsize,
    max: AtomicUsize,
}

impl MockClient {
    fn new(
        ready: LassieResult<()>,
        delay_ms: u64,
        blocks: Vec<Block>,
    ) -> Arc<Self> {
        Arc::new(Self {
            ready,
            delay: Duration::from_millis(delay_ms),
            blocks,
            active: AtomicUsize::new(0),
            max: AtomicUsize::new(0),
        })
    }
}

impl TransferClient for MockClient {
    fn await_ready(&self) -> BoxFut<'_, LassieResult<()>> {
        Box::pin(async move { self.ready.clone() })
    }

    fn retrieve(
        &self,
        _from: ProviderId,
        _root: Cid,
    ) -> BoxFut<'_, LassieResult<Vec<Block>>> {
        Box::pin(async move {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(self.blocks.clone())
        })
    }
}

#[derive(Debug)]
struct MockHost(Option<DynTransferClient>);

impl Host for MockHost {
    fn peer_id(&self) -> ProviderId {
        random_provider_id()
    }

    fn request_block(
        &self,
        _from: ProviderId,
        _cid: Cid,
    ) -> BoxFut<'_, LassieResult<Block>> {
        Box::pin(async { Err(LassieError::other("no blocks")) })
    }

    fn transfer_client(&self) -> BoxFut<'_, LassieResult<DynTransferClient>> {
        Box::pin(async move {
            self.0
                .clone()
                .ok_or_else(|| LassieError::other("transfer init failed"))
        })
    }
}

fn mock_host(client: Arc<MockClient>) -> DynHost {
    let client: DynTransferClient = client;
    Arc::new(MockHost(Some(client)))
}

fn deps(host: DynHost, options: Vec<LassieOption>) -> ProtocolRetrieverDeps {
    let config = Arc::new(LassieConfig::resolve(options));
    let session = CoreSessionFactory::create()
        .create(config.session_config(), true);
    ProtocolRetrieverDeps {
        config,
        session,
        host,
    }
}

fn candidate(root: &Cid, provider: ProviderId) -> Candidate {
    Candidate {
        root: root.clone(),
        provider,
        addrs: Vec::new(),
        protocols: vec![PROTOCOL],
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn retrieve_from_mem_host() {
    let config = MemHostConfig {
        network_id: "graphsync-mem".into(),
    };
    let dag = TestDag::tree(2, 3, 20);
    let provider = MemHost::create(config.clone());
    provider.store().extend(dag.blocks.clone());
    let client = MemHost::create(config);

    let r = GraphsyncRetrieverFactory::create()
        .create(deps(client, Vec::new()))
        .await
        .unwrap();
    assert_eq!(PROTOCOL, r.protocol());

    let sink = MemBlockStore::create();
    let stats = r
        .retrieve(
            Context::background(),
            RetrievalRequest::new(dag.root.clone(), sink.clone()),
            vec![candidate(&dag.root, provider.peer_id())],
            noop_events_callback(),
        )
        .await
        .unwrap();

    assert_eq!(dag.blocks.len(), sink.len());
    assert_eq!(dag.size(), stats.size);
    assert_eq!(dag.blocks.len() as u64, stats.blocks);
    assert_eq!(Some(provider.peer_id()), stats.provider);
}

#[tokio::test(flavor = "multi_thread")]
async fn readiness_failure_fails_construction() {
    let client = MockClient::new(
        Err(LassieError::other("transfer manager failed")),
        0,
        Vec::new(),
    );
    let err = GraphsyncRetrieverFactory::create()
        .create(deps(mock_host(client), Vec::new()))
        .await
        .unwrap_err();
    assert_eq!("transfer manager failed (src: None)", err.to_string());
}

#[tokio::test(flavor = "multi_thread")]
async fn client_failure_fails_construction() {
    let err = GraphsyncRetrieverFactory::create()
        .create(deps(Arc::new(MockHost(None)), Vec::new()))
        .await
        .unwrap_err();
    assert_eq!("transfer init failed (src: None)", err.to_string());
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_provider_falls_through() {
    let config = MemHostConfig {
        network_id: "graphsync-fallthrough".into(),
    };
    let dag = TestDag::tree(2, 1, 20);
    let empty = MemHost::create(config.clone());
    let full = MemHost::create(config.clone());
    full.store().extend(dag.blocks.clone());
    let client = MemHost::create(config);

    let r = GraphsyncRetrieverFactory::create()
        .create(deps(client, Vec::new()))
        .await
        .unwrap();

    let events: Arc<Mutex<Vec<&'static str>>> = Default::default();
    let events2 = events.clone();
    let stats = r
        .retrieve(
            Context::background(),
            RetrievalRequest::new(dag.root.clone(), MemBlockStore::create()),
            vec![
                candidate(&dag.root, empty.peer_id()),
                candidate(&dag.root, full.peer_id()),
            ],
            Arc::new(move |event: &RetrievalEvent| {
                events2.lock().unwrap().push(event.name());
            }),
        )
        .await
        .unwrap();

    assert_eq!(Some(full.peer_id()), stats.provider);
    assert_eq!(
        vec![
            "provider-started",
            "provider-failed",
            "provider-started",
            "first-byte",
        ],
        *events.lock().unwrap()
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn provider_timeout() {
    let dag = TestDag::single(4);
    let client = MockClient::new(Ok(()), 10_000, dag.blocks.clone());
    let r = GraphsyncRetrieverFactory::create()
        .create(deps(
            mock_host(client),
            vec![LassieOption::ProviderTimeout(Duration::from_millis(20))],
        ))
        .await
        .unwrap();

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        r.retrieve(
            Context::background(),
            RetrievalRequest::new(dag.root.clone(), MemBlockStore::create()),
            vec![candidate(&dag.root, random_provider_id())],
            noop_events_callback(),
        ),
    )
    .await
    .unwrap()
    .unwrap_err();
    assert!(!err.is_context_error(), "{err}");
}

#[tokio::test(flavor = "multi_thread")]
async fn unbounded_provider_timeout() {
    let dag = TestDag::single(4);
    let client = MockClient::new(Ok(()), 0, dag.blocks.clone());
    let r = GraphsyncRetrieverFactory::create()
        .create(deps(
            mock_host(client),
            vec![LassieOption::ProviderTimeout(Duration::MAX)],
        ))
        .await
        .unwrap();

    let stats = r
        .retrieve(
            Context::background(),
            RetrievalRequest::new(dag.root.clone(), MemBlockStore::create()),
            vec![candidate(&dag.root, random_provider_id())],
            noop_events_callback(),
        )
        .await
        .unwrap();
    assert_eq!(1, stats.blocks);
}

#[tokio::test(flavor = "multi_thread")]
async fn provider_concurrency_cap() {
    let dag = TestDag::single(4);
    let client = MockClient::new(Ok(()), 20, dag.blocks.clone());
    let r = GraphsyncRetrieverFactory::create()
        .create(deps(
            mock_host(client.clone()),
            vec![LassieOption::ConcurrentSpRetrievals(1)],
        ))
        .await
        .unwrap();

    let provider = random_provider_id();
    let fetch = || {
        r.retrieve(
            Context::background(),
            RetrievalRequest::new(dag.root.clone(), MemBlockStore::create()),
            vec![candidate(&dag.root, provider.clone())],
            noop_events_callback(),
        )
    };
    let (a, b, c) = tokio::join!(fetch(), fetch(), fetch());
    a.unwrap();
    b.unwrap();
    c.unwrap();

    assert_eq!(1, client.max.load(Ordering::SeqCst));
}
