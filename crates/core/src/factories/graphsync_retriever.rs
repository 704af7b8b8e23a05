//! Whole-graph retrieval over the host's data-transfer client.

use lassie_api::*;
use std::sync::Arc;
use tokio::time::Instant;

/// Data-transfer retriever factory.
///
/// Construction blocks until the transfer client bound to the host is
/// ready, and fails if it never becomes ready.
#[derive(Debug)]
pub struct GraphsyncRetrieverFactory {}

impl GraphsyncRetrieverFactory {
    /// Construct a new GraphsyncRetrieverFactory.
    pub fn create() -> DynCandidateRetrieverFactory {
        let out: DynCandidateRetrieverFactory =
            Arc::new(GraphsyncRetrieverFactory {});
        out
    }
}

impl CandidateRetrieverFactory for GraphsyncRetrieverFactory {
    fn create(
        &self,
        deps: ProtocolRetrieverDeps,
    ) -> BoxFut<'static, LassieResult<DynCandidateRetriever>> {
        Box::pin(async move {
            let client = deps.host.transfer_client().await?;
            client.await_ready().await?;
            tracing::debug!("data transfer client ready");
            let out: DynCandidateRetriever = Arc::new(GraphsyncRetriever {
                client,
                session: deps.session,
            });
            Ok(out)
        })
    }
}

#[derive(Debug)]
struct GraphsyncRetriever {
    client: DynTransferClient,
    session: DynSession,
}

const PROTOCOL: ProtocolCode = ProtocolCode::TransportGraphsyncFilecoinv1;

impl GraphsyncRetriever {
    async fn retrieve_from(
        &self,
        ctx: &Context,
        request: &RetrievalRequest,
        provider: &ProviderId,
        events: &EventsCallback,
    ) -> LassieResult<RetrievalStats> {
        let _permit = ctx.run(self.session.acquire(provider)).await?;
        let timeout =
            self.session.provider_config(provider).retrieval_timeout;
        let (ctx, _cancel) = ctx.with_timeout(timeout);

        let start = Instant::now();
        let blocks = ctx
            .run(self.client.retrieve(provider.clone(), request.root.clone()))
            .await?;

        events(&RetrievalEvent::FirstByte {
            retrieval_id: request.retrieval_id,
            root: request.root.clone(),
            provider: provider.clone(),
            protocol: PROTOCOL,
            elapsed: start.elapsed(),
        });

        match blocks.first() {
            Some(block) if block.cid == request.root => (),
            _ => {
                return Err(LassieError::other(
                    "transfer did not start at the requested root",
                ))
            }
        }

        let mut size = 0;
        let count = blocks.len() as u64;
        for block in blocks {
            size += block.data.len() as u64;
            request.sink.put_block(block).await?;
        }

        Ok(RetrievalStats {
            root: request.root.clone(),
            provider: Some(provider.clone()),
            protocol: PROTOCOL,
            size,
            blocks: count,
            duration: start.elapsed(),
        })
    }
}

impl CandidateRetriever for GraphsyncRetriever {
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
                let provider = candidate.provider;
                events(&RetrievalEvent::ProviderStarted {
                    retrieval_id: request.retrieval_id,
                    root: request.root.clone(),
                    provider: provider.clone(),
                    protocol: PROTOCOL,
                });

                let start = Instant::now();
                let res = self
                    .retrieve_from(&ctx, &request, &provider, &events)
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
                        let error = if error.is_context_error() {
                            LassieError::other("provider retrieval timed out")
                        } else {
                            error
                        };
                        tracing::warn!(
                            %provider,
                            ?error,
                            "data transfer retrieval failed"
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

#[cfg(test)]
mod test;
