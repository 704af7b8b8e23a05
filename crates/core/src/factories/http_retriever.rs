//! Trustless gateway retrieval over HTTP.
//!
//! The whole DAG is requested in one `GET {endpoint}/ipfs/{root}` with
//! `dag-scope=all`, and the CAR response body is streamed into the
//! request sink block by block. Every block is checked against the
//! multihash of its cid before it reaches the sink.

use crate::factories::car::{verify_block, CarReader, CAR_CONTENT_TYPE};
use futures::StreamExt;
use lassie_api::*;
use std::sync::Arc;
use tokio::time::Instant;

const PROTOCOL: ProtocolCode = ProtocolCode::TransportIpfsGatewayHttp;

/// Derive a gateway endpoint (scheme, host and port, no trailing slash)
/// from a candidate address.
///
/// Accepts plain `http://` / `https://` urls and multiaddrs of the form
/// `/<ip4|ip6|dns|dns4|dns6>/<host>[/tcp/<port>][/tls]/<http|https>`.
/// Returns `None` for anything else.
pub fn endpoint(addr: &str) -> Option<String> {
    if addr.starts_with("http://") || addr.starts_with("https://") {
        return Some(addr.trim_end_matches('/').to_string());
    }

    let mut parts = addr.strip_prefix('/')?.split('/');
    let host = match (parts.next()?, parts.next()?) {
        ("ip6", host) => format!("[{host}]"),
        ("ip4" | "dns" | "dns4" | "dns6", host) => host.to_string(),
        _ => return None,
    };

    let mut port = None;
    let mut tls = false;
    let mut scheme = None;
    while let Some(part) = parts.next() {
        match part {
            "tcp" => port = Some(parts.next()?.parse::<u16>().ok()?),
            "tls" => tls = true,
            "http" if tls => scheme = Some("https"),
            "http" => scheme = Some("http"),
            "https" => scheme = Some("https"),
            _ => return None,
        }
    }

    let scheme = scheme?;
    Some(match port {
        Some(port) => format!("{scheme}://{host}:{port}"),
        None => format!("{scheme}://{host}"),
    })
}

/// Trustless gateway retriever factory.
#[derive(Debug)]
pub struct HttpRetrieverFactory {}

impl HttpRetrieverFactory {
    /// Construct a new HttpRetrieverFactory.
    pub fn create() -> DynCandidateRetrieverFactory {
        let out: DynCandidateRetrieverFactory =
            Arc::new(HttpRetrieverFactory {});
        out
    }
}

impl CandidateRetrieverFactory for HttpRetrieverFactory {
    fn create(
        &self,
        deps: ProtocolRetrieverDeps,
    ) -> BoxFut<'static, LassieResult<DynCandidateRetriever>> {
        Box::pin(async move {
            let client = reqwest::Client::builder().build().map_err(|err| {
                LassieError::other_src("failed to build http client", err)
            })?;
            let out: DynCandidateRetriever = Arc::new(HttpRetriever {
                client,
                session: deps.session,
            });
            Ok(out)
        })
    }
}

#[derive(Debug)]
struct HttpRetriever {
    client: reqwest::Client,
    session: DynSession,
}

impl HttpRetriever {
    async fn retrieve_from(
        &self,
        request: &RetrievalRequest,
        candidate: &Candidate,
        events: &EventsCallback,
    ) -> LassieResult<RetrievalStats> {
        let endpoint = candidate
            .addrs
            .iter()
            .find_map(|addr| endpoint(addr))
            .ok_or_else(|| LassieError::other("no http address"))?;

        let provider = &candidate.provider;
        let _permit = self.session.acquire(provider).await?;
        let timeout =
            self.session.provider_config(provider).retrieval_timeout;
        let stalled = || {
            LassieError::other(format!(
                "no data from {endpoint} within {timeout:?}"
            ))
        };

        let url = format!("{endpoint}/ipfs/{}?dag-scope=all", request.root);
        tracing::debug!(%url, "http retrieval");

        let start = Instant::now();
        let res = tokio::time::timeout(
            timeout,
            self.client
                .get(&url)
                .header(reqwest::header::ACCEPT, CAR_CONTENT_TYPE)
                .send(),
        )
        .await
        .map_err(|_| stalled())?
        .and_then(|res| res.error_for_status())
        .map_err(|err| LassieError::other_src("http request failed", err))?;

        let mut body = Box::pin(res.bytes_stream());
        let mut reader = CarReader::new();
        let mut size = 0;

        loop {
            let chunk = match tokio::time::timeout(timeout, body.next())
                .await
                .map_err(|_| stalled())?
            {
                None => break,
                Some(chunk) => chunk.map_err(|err| {
                    LassieError::other_src("http body failed", err)
                })?,
            };

            reader.push(&chunk);
            while let Some(block) = reader.next_block()? {
                if reader.blocks() == 1 {
                    if block.cid != request.root {
                        return Err(LassieError::other(format!(
                            "car stream starts at {}, not the requested root",
                            block.cid
                        )));
                    }
                    events(&RetrievalEvent::FirstByte {
                        retrieval_id: request.retrieval_id,
                        root: request.root.clone(),
                        provider: provider.clone(),
                        protocol: PROTOCOL,
                        elapsed: start.elapsed(),
                    });
                }
                verify_block(&block)?;
                size += block.data.len() as u64;
                request.sink.put_block(block).await?;
            }
        }

        reader.finish()?;
        if reader.blocks() == 0 {
            return Err(LassieError::other("car stream held no blocks"));
        }

        Ok(RetrievalStats {
            root: request.root.clone(),
            provider: Some(provider.clone()),
            protocol: PROTOCOL,
            size,
            blocks: reader.blocks(),
            duration: start.elapsed(),
        })
    }
}

impl CandidateRetriever for HttpRetriever {
    fn protocol(&self) -> ProtocolCode {
        PROTOCOL
    }

    fn retrieve(
        &self,
        ctx: Context,
        request: RetrievalRequest,
        candidates: Vec<Candidate>,
        events: EventsCallback,
    ) -> BoxFut<'_, LassieResult<RetrievalStats>> {
        Box::pin(async move {
            let mut last_err = None;
            for candidate in candidates {
                let provider = candidate.provider.clone();
                events(&RetrievalEvent::ProviderStarted {
                    retrieval_id: request.retrieval_id,
                    root: request.root.clone(),
                    provider: provider.clone(),
                    protocol: PROTOCOL,
                });

                let start = Instant::now();
                let res = ctx
                    .run(self.retrieve_from(&request, &candidate, &events))
                    .await;
                match res {
                    Ok(stats) => {
                        self.session
                            .record_success(&provider, start.elapsed());
                        return Ok(stats);
                    }
                    Err(error) => {
                        if let Some(err) = ctx.err() {
                            return Err(err);
                        }
                        tracing::warn!(
                            %provider,
                            ?error,
                            "http retrieval failed"
                        );
                        self.session.record_failure(&provider);
                        events(&RetrievalEvent::ProviderFailed {
                            retrieval_id: request.retrieval_id,
                            root: request.root.clone(),
                            provider,
                            protocol: PROTOCOL,
                            error: error.clone(),
                        });
                        last_err = Some(error);
                    }
                }
            }

            Err(last_err.unwrap_or_else(|| {
                LassieError::NoCandidates(request.root.clone())
            }))
        })
    }
}
