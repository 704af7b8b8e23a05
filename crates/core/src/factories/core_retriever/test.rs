use super::*;
use crate::factories::{CoreSessionFactory, MemBlockStore, MemCandidateFinder};
use lassie_test_utils::id::{random_cid, random_provider_id};
use std::sync::atomic::AtomicUsize;
use std::time::Duration;

#[derive(Debug)]
struct MockRetriever {
    protocol: ProtocolCode,
    delay: Duration,
    fail: bool,
    calls: Arc<AtomicUsize>,
}

impl MockRetriever {
    fn new(protocol: ProtocolCode, delay_ms: u64, fail: bool) -> Self {
        Self {
            protocol,
            delay: Duration::from_millis(delay_ms),
            fail,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl CandidateRetriever for MockRetriever {
    fn protocol(&self) -> ProtocolCode {
        self.protocol
    }

    fn retrieve(
        &self,
        _ctx: Context,
        request: RetrievalRequest,
        candidates: Vec<Candidate>,
        events: EventsCallback,
    ) -> BoxFut<'_, LassieResult<RetrievalStats>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let provider = candidates[0].provider.clone();
            events(&RetrievalEvent::ProviderStarted {
                retrieval_id: request.retrieval_id,
                root: request.root.clone(),
                provider: provider.clone(),
                protocol: self.protocol,
            });
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(LassieError::other("mock failure"));
            }
            Ok(RetrievalStats {
                root: request.root,
                provider: Some(provider),
                protocol: self.protocol,
                size: 0,
                blocks: 0,
                duration: self.delay,
            })
        })
    }
}

struct Test {
    finder: Arc<MemCandidateFinder>,
    retriever: DynRetriever,
}

impl Test {
    fn new(config: SessionConfig, mocks: Vec<MockRetriever>) -> Self {
        let finder = MemCandidateFinder::create();
        let session = CoreSessionFactory::create().create(config, true);
        let mut protocol_retrievers = ProtocolRetrievers::new();
        for mock in mocks {
            let protocol = mock.protocol;
            let mock: DynCandidateRetriever = Arc::new(mock);
            protocol_retrievers.insert(protocol, mock);
        }
        let retriever = CoreRetrieverFactory::create()
            .create(session, finder.clone(), protocol_retrievers)
            .unwrap();
        retriever.start().unwrap();
        Self { finder, retriever }
    }

    fn announce(
        &self,
        root: &Cid,
        protocols: Vec<ProtocolCode>,
    ) -> ProviderId {
        let provider = random_provider_id();
        self.finder.announce(Candidate {
            root: root.clone(),
            provider: provider.clone(),
            addrs: Vec::new(),
            protocols,
        });
        provider
    }
}

fn request(root: &Cid) -> RetrievalRequest {
    RetrievalRequest::new(root.clone(), MemBlockStore::create())
}

type Recorded = Arc<Mutex<Vec<RetrievalEvent>>>;

fn recorder() -> (EventsCallback, Recorded) {
    let recorded: Recorded = Default::default();
    let recorded2 = recorded.clone();
    let cb: EventsCallback = Arc::new(move |event: &RetrievalEvent| {
        recorded2.lock().unwrap().push(event.clone());
    });
    (cb, recorded)
}

fn names(recorded: &Recorded) -> Vec<&'static str> {
    recorded.lock().unwrap().iter().map(|e| e.name()).collect()
}

#[test]
fn start_only_once() {
    let t = Test::new(SessionConfig::default(), Vec::new());
    assert!(t.retriever.start().is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn retrieve_before_start_errors() {
    let retriever = CoreRetrieverFactory::create()
        .create(
            CoreSessionFactory::create().create(SessionConfig::default(), true),
            MemCandidateFinder::create(),
            ProtocolRetrievers::new(),
        )
        .unwrap();
    let r = retriever
        .retrieve(
            Context::background(),
            request(&random_cid()),
            noop_events_callback(),
        )
        .await;
    assert!(r.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn success_event_sequence() {
    let t = Test::new(
        SessionConfig::default(),
        vec![MockRetriever::new(ProtocolCode::TransportBitswap, 0, false)],
    );
    let root = random_cid();
    let provider = t.announce(&root, vec![ProtocolCode::TransportBitswap]);

    let (cb, recorded) = recorder();
    let stats = t
        .retriever
        .retrieve(Context::background(), request(&root), cb)
        .await
        .unwrap();

    assert_eq!(root, stats.root);
    assert_eq!(Some(provider), stats.provider);
    assert_eq!(
        vec![
            "started",
            "candidates-found",
            "candidates-filtered",
            "provider-started",
            "success",
            "finished",
        ],
        names(&recorded),
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn no_candidates() {
    let t = Test::new(
        SessionConfig::default(),
        vec![MockRetriever::new(ProtocolCode::TransportBitswap, 0, false)],
    );
    let root = random_cid();

    let (cb, recorded) = recorder();
    let r = t
        .retriever
        .retrieve(Context::background(), request(&root), cb)
        .await;

    match r {
        Err(LassieError::NoCandidates(cid)) => assert_eq!(root, cid),
        oth => panic!("unexpected {oth:?}"),
    }
    assert_eq!(
        vec![
            "started",
            "candidates-found",
            "candidates-filtered",
            "failed",
            "finished",
        ],
        names(&recorded),
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn blocked_and_unusable_candidates_are_filtered() {
    let blocked = random_provider_id();
    let t = Test::new(
        SessionConfig::default()
            .with_provider_block_list(Some([blocked.clone()].into())),
        vec![MockRetriever::new(ProtocolCode::TransportBitswap, 0, false)],
    );
    let root = random_cid();
    t.finder.announce(Candidate {
        root: root.clone(),
        provider: blocked,
        addrs: Vec::new(),
        protocols: vec![ProtocolCode::TransportBitswap],
    });
    // graphsync is not registered
    t.announce(&root, vec![ProtocolCode::TransportGraphsyncFilecoinv1]);
    t.announce(&root, vec![ProtocolCode::Other(0x0999)]);

    let (cb, recorded) = recorder();
    let r = t
        .retriever
        .retrieve(Context::background(), request(&root), cb)
        .await;
    assert!(matches!(r, Err(LassieError::NoCandidates(_))));

    let recorded = recorded.lock().unwrap();
    for event in recorded.iter() {
        match event {
            RetrievalEvent::CandidatesFound { candidates, .. } => {
                assert_eq!(3, candidates.len())
            }
            RetrievalEvent::CandidatesFiltered { candidates, .. } => {
                assert!(candidates.is_empty())
            }
            _ => (),
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn request_protocol_restriction() {
    let bitswap = MockRetriever::new(ProtocolCode::TransportBitswap, 0, false);
    let bitswap_calls = bitswap.calls.clone();
    let http =
        MockRetriever::new(ProtocolCode::TransportIpfsGatewayHttp, 0, false);
    let http_calls = http.calls.clone();
    let t = Test::new(SessionConfig::default(), vec![bitswap, http]);
    let root = random_cid();
    t.announce(
        &root,
        vec![
            ProtocolCode::TransportBitswap,
            ProtocolCode::TransportIpfsGatewayHttp,
        ],
    );

    let stats = t
        .retriever
        .retrieve(
            Context::background(),
            request(&root)
                .with_protocols(vec![ProtocolCode::TransportIpfsGatewayHttp]),
            noop_events_callback(),
        )
        .await
        .unwrap();

    assert_eq!(ProtocolCode::TransportIpfsGatewayHttp, stats.protocol);
    assert_eq!(0, bitswap_calls.load(Ordering::SeqCst));
    assert_eq!(1, http_calls.load(Ordering::SeqCst));
}

#[tokio::test(flavor = "multi_thread")]
async fn first_success_wins() {
    let t = Test::new(
        SessionConfig::default(),
        vec![
            MockRetriever::new(ProtocolCode::TransportBitswap, 5, true),
            MockRetriever::new(
                ProtocolCode::TransportGraphsyncFilecoinv1,
                20,
                false,
            ),
            MockRetriever::new(
                ProtocolCode::TransportIpfsGatewayHttp,
                10_000,
                false,
            ),
        ],
    );
    let root = random_cid();
    t.announce(&root, ProtocolCode::DEFAULT_PROTOCOLS.to_vec());

    let stats = tokio::time::timeout(
        Duration::from_secs(5),
        t.retriever.retrieve(
            Context::background(),
            request(&root),
            noop_events_callback(),
        ),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(ProtocolCode::TransportGraphsyncFilecoinv1, stats.protocol);
}

#[tokio::test(flavor = "multi_thread")]
async fn all_protocols_fail() {
    let t = Test::new(
        SessionConfig::default(),
        vec![
            MockRetriever::new(ProtocolCode::TransportBitswap, 0, true),
            MockRetriever::new(ProtocolCode::TransportIpfsGatewayHttp, 0, true),
        ],
    );
    let root = random_cid();
    t.announce(&root, ProtocolCode::DEFAULT_PROTOCOLS.to_vec());

    let (cb, recorded) = recorder();
    let err = t
        .retriever
        .retrieve(Context::background(), request(&root), cb)
        .await
        .unwrap_err();
    assert_eq!("mock failure (src: None)", err.to_string());
    assert_eq!(Some(&"finished"), names(&recorded).last());
}

#[tokio::test(flavor = "multi_thread")]
async fn context_deadline_ends_retrieval() {
    let t = Test::new(
        SessionConfig::default(),
        vec![MockRetriever::new(ProtocolCode::TransportBitswap, 10_000, false)],
    );
    let root = random_cid();
    t.announce(&root, vec![ProtocolCode::TransportBitswap]);

    let (ctx, _h) =
        Context::background().with_timeout(Duration::from_millis(20));
    let (cb, recorded) = recorder();
    let r = t.retriever.retrieve(ctx, request(&root), cb).await;
    assert!(matches!(r, Err(LassieError::DeadlineExceeded)));
    assert_eq!(Some(&"finished"), names(&recorded).last());
}

#[tokio::test(flavor = "multi_thread")]
async fn subscriber_unregister() {
    let t = Test::new(
        SessionConfig::default(),
        vec![MockRetriever::new(ProtocolCode::TransportBitswap, 0, false)],
    );
    let root = random_cid();
    t.announce(&root, vec![ProtocolCode::TransportBitswap]);

    let (sub, recorded) = recorder();
    let unregister = t.retriever.register_subscriber(sub);

    t.retriever
        .retrieve(Context::background(), request(&root), noop_events_callback())
        .await
        .unwrap();
    let count = recorded.lock().unwrap().len();
    assert_eq!(6, count);

    unregister();
    unregister();

    t.retriever
        .retrieve(Context::background(), request(&root), noop_events_callback())
        .await
        .unwrap();
    assert_eq!(count, recorded.lock().unwrap().len());
}
