use axum::{
    body::Body, extract::Path, http::header, response::IntoResponse,
    response::Response, routing::get, Router,
};
use futures::StreamExt;
use lassie_api::*;
use lassie_core::{
    default_builder,
    factories::{
        car::{write_car, CAR_CONTENT_TYPE},
        MemBlockStore, MemCandidateFinder, MemHost, MemHostConfig,
    },
    Lassie,
};
use lassie_test_utils::{dag::TestDag, enable_tracing};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Serve `dag` as a CAR stream. If `stall` is set, the body never
/// completes after the first chunk.
async fn gateway(dag: &TestDag, stall: bool) -> String {
    let car = write_car(&[dag.root.clone()], &dag.blocks);
    let app = Router::new().route(
        "/ipfs/{cid}",
        get(move |Path(_cid): Path<String>| async move {
            let chunks: Vec<Result<bytes::Bytes, std::io::Error>> = car
                .chunks(64)
                .map(|c| Ok(bytes::Bytes::copy_from_slice(c)))
                .collect();
            let body = if stall {
                Body::from_stream(
                    futures::stream::iter(chunks.into_iter().take(1))
                        .chain(futures::stream::pending()),
                )
            } else {
                Body::from_stream(futures::stream::iter(chunks))
            };
            Response::builder()
                .header(header::CONTENT_TYPE, CAR_CONTENT_TYPE)
                .body(body)
                .unwrap()
                .into_response()
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::task::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("/ip4/127.0.0.1/tcp/{}/http", addr.port())
}

/// One provider per protocol, all serving the same DAG.
struct Providers {
    dag: TestDag,
    finder: Arc<MemCandidateFinder>,
    bitswap: Arc<MemHost>,
    graphsync: Arc<MemHost>,
    http: ProviderId,
}

impl Providers {
    async fn new(network_id: &str, dag: TestDag) -> Self {
        let config = MemHostConfig {
            network_id: network_id.to_string(),
        };
        let finder = MemCandidateFinder::create();

        let bitswap = MemHost::create(config.clone());
        bitswap.store().extend(dag.blocks.clone());
        finder.announce(Candidate {
            root: dag.root.clone(),
            provider: bitswap.peer_id(),
            addrs: Vec::new(),
            protocols: vec![ProtocolCode::TransportBitswap],
        });

        let graphsync = MemHost::create(config);
        graphsync.store().extend(dag.blocks.clone());
        finder.announce(Candidate {
            root: dag.root.clone(),
            provider: graphsync.peer_id(),
            addrs: Vec::new(),
            protocols: vec![ProtocolCode::TransportGraphsyncFilecoinv1],
        });

        let http = lassie_test_utils::id::random_provider_id();
        finder.announce(Candidate {
            root: dag.root.clone(),
            provider: http.clone(),
            addrs: vec![gateway(&dag, false).await],
            protocols: vec![ProtocolCode::TransportIpfsGatewayHttp],
        });

        Self {
            dag,
            finder,
            bitswap,
            graphsync,
            http,
        }
    }

    fn options(&self, network_id: &str) -> Vec<LassieOption> {
        let mut network = NetworkOptions::new();
        network.insert("networkId".into(), network_id.into());
        vec![
            LassieOption::CandidateFinder(self.finder.clone()),
            LassieOption::NetworkOptions(network),
        ]
    }

    fn request(&self, sink: &Arc<MemBlockStore>) -> RetrievalRequest {
        RetrievalRequest::new(self.dag.root.clone(), sink.clone())
    }

    fn assert_complete(&self, sink: &MemBlockStore) {
        assert_eq!(self.dag.blocks.len(), sink.len());
        for block in self.dag.blocks.iter() {
            assert!(sink.contains(&block.cid));
        }
    }
}

async fn lassie(options: Vec<LassieOption>) -> Lassie {
    Lassie::create(&Context::background(), &default_builder(), options)
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn fetch_with_each_protocol() {
    enable_tracing();

    let providers =
        Providers::new("fetch-each", TestDag::tree(3, 3, 256)).await;
    let lassie = lassie(providers.options("fetch-each")).await;

    for (protocol, provider) in [
        (
            ProtocolCode::TransportBitswap,
            Some(providers.bitswap.peer_id()),
        ),
        (
            ProtocolCode::TransportGraphsyncFilecoinv1,
            Some(providers.graphsync.peer_id()),
        ),
        (
            ProtocolCode::TransportIpfsGatewayHttp,
            Some(providers.http.clone()),
        ),
    ] {
        let sink = MemBlockStore::create();
        let stats = lassie
            .fetch(
                &Context::background(),
                providers.request(&sink).with_protocols(vec![protocol]),
                FetchConfig::default(),
            )
            .await
            .unwrap();

        assert_eq!(protocol, stats.protocol, "{protocol}");
        assert_eq!(provider, stats.provider, "{protocol}");
        assert_eq!(providers.dag.blocks.len() as u64, stats.blocks);
        assert_eq!(providers.dag.size(), stats.size);
        providers.assert_complete(&sink);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn fetch_races_every_protocol() {
    enable_tracing();

    let providers =
        Providers::new("fetch-race", TestDag::tree(4, 2, 512)).await;
    let lassie = lassie(providers.options("fetch-race")).await;

    let names = Arc::new(Mutex::new(Vec::new()));
    let names2 = names.clone();
    let sink = MemBlockStore::create();
    lassie
        .fetch(
            &Context::background(),
            providers.request(&sink),
            FetchConfig::default().with_events_callback(Arc::new(
                move |event: &RetrievalEvent| {
                    names2.lock().unwrap().push(event.name());
                },
            )),
        )
        .await
        .unwrap();
    providers.assert_complete(&sink);

    let names = names.lock().unwrap().clone();
    assert_eq!(Some(&"started"), names.first());
    assert_eq!(Some(&"finished"), names.last());
    assert_eq!(1, names.iter().filter(|n| **n == "success").count());
    assert!(!names.contains(&"failed"));
}

#[tokio::test(flavor = "multi_thread")]
async fn allow_list_restricts_providers() {
    let providers =
        Providers::new("fetch-allow", TestDag::tree(2, 2, 64)).await;
    let mut options = providers.options("fetch-allow");
    options.push(LassieOption::ProviderAllowList(Some(
        [providers.graphsync.peer_id()].into_iter().collect(),
    )));
    let lassie = lassie(options).await;

    let sink = MemBlockStore::create();
    let stats = lassie
        .fetch(
            &Context::background(),
            providers.request(&sink),
            FetchConfig::default(),
        )
        .await
        .unwrap();
    assert_eq!(ProtocolCode::TransportGraphsyncFilecoinv1, stats.protocol);
    assert_eq!(Some(providers.graphsync.peer_id()), stats.provider);
}

#[tokio::test(flavor = "multi_thread")]
async fn block_list_leaves_nothing() {
    let providers =
        Providers::new("fetch-block", TestDag::single(32)).await;
    let mut options = providers.options("fetch-block");
    options.push(LassieOption::ProviderBlockList(Some(
        [
            providers.bitswap.peer_id(),
            providers.graphsync.peer_id(),
            providers.http.clone(),
        ]
        .into_iter()
        .collect(),
    )));
    let lassie = lassie(options).await;

    let sink = MemBlockStore::create();
    let err = lassie
        .fetch(
            &Context::background(),
            providers.request(&sink),
            FetchConfig::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LassieError::NoCandidates(_)));
    assert!(sink.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_fetches_share_instance() {
    enable_tracing();

    let providers =
        Providers::new("fetch-concurrent", TestDag::tree(3, 2, 128)).await;
    let lassie = Arc::new(
        lassie(providers.options("fetch-concurrent")).await,
    );

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen2 = seen.clone();
    let unregister =
        lassie.register_subscriber(Arc::new(move |event: &RetrievalEvent| {
            if let RetrievalEvent::Finished { retrieval_id, .. } = event {
                seen2.lock().unwrap().push(*retrieval_id);
            }
        }));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let lassie = lassie.clone();
        let sink = MemBlockStore::create();
        let request = providers.request(&sink);
        tasks.push(tokio::task::spawn(async move {
            lassie
                .fetch(&Context::background(), request, FetchConfig::default())
                .await
                .unwrap();
            sink
        }));
    }
    for task in tasks {
        let sink = task.await.unwrap();
        providers.assert_complete(&sink);
    }
    assert_eq!(8, seen.lock().unwrap().len());

    unregister();
    let sink = MemBlockStore::create();
    lassie
        .fetch(
            &Context::background(),
            providers.request(&sink),
            FetchConfig::default(),
        )
        .await
        .unwrap();
    assert_eq!(8, seen.lock().unwrap().len());
}

#[tokio::test(flavor = "multi_thread")]
async fn global_timeout_bounds_stalled_fetch() {
    let dag = TestDag::tree(2, 2, 1024);
    let finder = MemCandidateFinder::create();
    finder.announce(Candidate {
        root: dag.root.clone(),
        provider: lassie_test_utils::id::random_provider_id(),
        addrs: vec![gateway(&dag, true).await],
        protocols: vec![ProtocolCode::TransportIpfsGatewayHttp],
    });

    let lassie = lassie(vec![
        LassieOption::CandidateFinder(finder),
        LassieOption::GlobalTimeout(Duration::from_millis(200)),
    ])
    .await;

    let sink = MemBlockStore::create();
    let start = std::time::Instant::now();
    let err = lassie
        .fetch(
            &Context::background(),
            RetrievalRequest::new(dag.root.clone(), sink.clone()),
            FetchConfig::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LassieError::DeadlineExceeded));
    assert!(start.elapsed() < DEFAULT_PROVIDER_TIMEOUT);
}
