//! The core retrieval orchestrator provided by lassie.
//!
//! A retrieval proceeds as follows:
//!
//! - Query the candidate finder for the requested root.
//! - Drop candidates the session refuses, and candidates that announce
//!   no protocol that is both registered and allowed by the request.
//! - Order the remaining candidates by session preference.
//! - Hand every usable protocol retriever its share of the candidates
//!   and run them concurrently. The first success wins, the other
//!   attempts are dropped. If every attempt fails, the last error is
//!   returned.
//!
//! Every step is reported as a [RetrievalEvent], delivered synchronously
//! to the per-call callback and to every registered subscriber.

use lassie_api::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// The core retrieval orchestrator provided by lassie.
#[derive(Debug)]
pub struct CoreRetrieverFactory {}

impl CoreRetrieverFactory {
    /// Construct a new CoreRetrieverFactory.
    pub fn create() -> DynRetrieverFactory {
        let out: DynRetrieverFactory = Arc::new(CoreRetrieverFactory {});
        out
    }
}

impl RetrieverFactory for CoreRetrieverFactory {
    fn create(
        &self,
        session: DynSession,
        candidate_finder: DynCandidateFinder,
        protocol_retrievers: ProtocolRetrievers,
    ) -> LassieResult<DynRetriever> {
        let out: DynRetriever = Arc::new(CoreRetriever::new(
            session,
            candidate_finder,
            protocol_retrievers,
        ));
        Ok(out)
    }
}

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    map: HashMap<u64, RetrievalEventSubscriber>,
}

type SharedSubscribers = Arc<Mutex<Subscribers>>;

fn dispatch(
    subscribers: &SharedSubscribers,
    events: &EventsCallback,
    event: &RetrievalEvent,
) {
    tracing::trace!(
        retrieval_id = %event.retrieval_id(),
        root = %event.root(),
        "{}",
        event.name()
    );

    events(event);

    // don't hold the lock while calling out, subscribers may unregister
    let list: Vec<RetrievalEventSubscriber> =
        subscribers.lock().unwrap().map.values().cloned().collect();
    for subscriber in list {
        subscriber(event);
    }
}

struct CoreRetriever {
    session: DynSession,
    candidate_finder: DynCandidateFinder,
    protocol_retrievers: ProtocolRetrievers,
    started: AtomicBool,
    subscribers: SharedSubscribers,
}

impl std::fmt::Debug for CoreRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut protocols: Vec<_> =
            self.protocol_retrievers.keys().copied().collect();
        protocols.sort();
        f.debug_struct("CoreRetriever")
            .field("protocols", &protocols)
            .field("started", &self.started.load(Ordering::SeqCst))
            .finish()
    }
}

impl CoreRetriever {
    fn new(
        session: DynSession,
        candidate_finder: DynCandidateFinder,
        protocol_retrievers: ProtocolRetrievers,
    ) -> Self {
        Self {
            session,
            candidate_finder,
            protocol_retrievers,
            started: AtomicBool::new(false),
            subscribers: Default::default(),
        }
    }

    fn usable(
        &self,
        request: &RetrievalRequest,
        protocol: ProtocolCode,
    ) -> bool {
        request.allows_protocol(protocol)
            && self.protocol_retrievers.contains_key(&protocol)
    }

    async fn run(
        &self,
        ctx: &Context,
        request: &RetrievalRequest,
        events: &EventsCallback,
    ) -> LassieResult<RetrievalStats> {
        let retrieval_id = request.retrieval_id;
        let root = request.root.clone();

        let candidates = self
            .candidate_finder
            .find_candidates(root.clone())
            .await?;

        events(&RetrievalEvent::CandidatesFound {
            retrieval_id,
            root: root.clone(),
            candidates: candidates.clone(),
        });

        let mut candidates: Vec<Candidate> = candidates
            .into_iter()
            .filter(|c| {
                self.session.filter_candidate(c)
                    && c.protocols.iter().any(|p| self.usable(request, *p))
            })
            .collect();
        self.session.sort_candidates(&mut candidates);

        events(&RetrievalEvent::CandidatesFiltered {
            retrieval_id,
            root: root.clone(),
            candidates: candidates.clone(),
        });

        let mut attempts = Vec::new();
        for (protocol, retriever) in self.protocol_retrievers.iter() {
            if !request.allows_protocol(*protocol) {
                continue;
            }
            let list: Vec<Candidate> = candidates
                .iter()
                .filter(|c| c.supports(*protocol))
                .cloned()
                .collect();
            if list.is_empty() {
                continue;
            }
            tracing::debug!(
                %retrieval_id,
                %protocol,
                candidates = list.len(),
                "starting protocol retrieval"
            );
            attempts.push(retriever.retrieve(
                ctx.clone(),
                request.clone(),
                list,
                events.clone(),
            ));
        }

        if attempts.is_empty() {
            return Err(LassieError::NoCandidates(root));
        }

        let (stats, _rest) = futures::future::select_ok(attempts).await?;
        Ok(stats)
    }
}

impl Retriever for CoreRetriever {
    fn start(&self) -> LassieResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(LassieError::other("retriever already started"));
        }
        tracing::info!(retriever = ?self, "retriever started");
        Ok(())
    }

    fn retrieve(
        &self,
        ctx: Context,
        request: RetrievalRequest,
        events: EventsCallback,
    ) -> BoxFut<'_, LassieResult<RetrievalStats>> {
        Box::pin(async move {
            if !self.started.load(Ordering::SeqCst) {
                return Err(LassieError::other("retriever not started"));
            }

            let subscribers = self.subscribers.clone();
            let events: EventsCallback =
                Arc::new(move |event: &RetrievalEvent| {
                    dispatch(&subscribers, &events, event)
                });

            let retrieval_id = request.retrieval_id;
            let root = request.root.clone();

            events(&RetrievalEvent::Started {
                retrieval_id,
                root: root.clone(),
            });

            let result = ctx.run(self.run(&ctx, &request, &events)).await;

            match &result {
                Ok(stats) => {
                    tracing::debug!(
                        %retrieval_id,
                        ?stats,
                        "retrieval success"
                    );
                    events(&RetrievalEvent::Success {
                        retrieval_id,
                        root: root.clone(),
                        stats: stats.clone(),
                    });
                }
                Err(error) => {
                    tracing::debug!(%retrieval_id, ?error, "retrieval failed");
                    events(&RetrievalEvent::Failed {
                        retrieval_id,
                        root: root.clone(),
                        error: error.clone(),
                    });
                }
            }

            events(&RetrievalEvent::Finished { retrieval_id, root });

            result
        })
    }

    fn register_subscriber(
        &self,
        subscriber: RetrievalEventSubscriber,
    ) -> Unregister {
        let id = {
            let mut lock = self.subscribers.lock().unwrap();
            lock.next_id += 1;
            let id = lock.next_id;
            lock.map.insert(id, subscriber);
            id
        };
        let subscribers = Arc::downgrade(&self.subscribers);
        Box::new(move || {
            if let Some(subscribers) = subscribers.upgrade() {
                subscribers.lock().unwrap().map.remove(&id);
            }
        })
    }
}

#[cfg(test)]
mod test;
