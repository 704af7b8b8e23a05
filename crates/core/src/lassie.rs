//! The lassie retrieval client facade.

use lassie_api::*;
use std::collections::HashMap;
use std::sync::Arc;

/// A configured retrieval client.
///
/// Construction resolves the configuration, builds one [Session] shared
/// by every retriever, assembles the protocol retrievers and starts the
/// orchestrator. Each step can fail, in which case no instance is
/// returned. Once built, the instance is immutable: to change the
/// configuration, build a new one.
#[derive(Debug)]
pub struct Lassie {
    config: Arc<LassieConfig>,
    retriever: DynRetriever,
}

impl Lassie {
    /// Apply `options` in order to an empty configuration and fill in
    /// defaults. See [LassieConfig::resolve].
    pub fn resolve_config(
        options: impl IntoIterator<Item = LassieOption>,
    ) -> LassieConfig {
        LassieConfig::resolve(options)
    }

    /// Construct an instance from configuration options.
    pub async fn create(
        ctx: &Context,
        builder: &Builder,
        options: impl IntoIterator<Item = LassieOption>,
    ) -> LassieResult<Self> {
        Self::create_with_config(ctx, builder, Self::resolve_config(options))
            .await
    }

    /// Construct an instance from a configuration record. Fields left at
    /// their zero value take their documented defaults.
    ///
    /// This may block for as long as protocol retrievers need to become
    /// ready. It is abandoned with the context error if `ctx` is
    /// cancelled or expires first.
    pub async fn create_with_config(
        ctx: &Context,
        builder: &Builder,
        config: LassieConfig,
    ) -> LassieResult<Self> {
        ctx.run(Self::build(builder, config)).await
    }

    async fn build(
        builder: &Builder,
        mut config: LassieConfig,
    ) -> LassieResult<Self> {
        config.set_defaults();

        let candidate_finder = match &config.candidate_finder {
            Some(finder) => finder.clone(),
            None => builder.candidate_finder.create().await?,
        };
        let host = match &config.host {
            Some(host) => host.clone(),
            None => {
                builder
                    .host
                    .create(config.network_options.clone())
                    .await?
            }
        };
        config.candidate_finder = Some(candidate_finder.clone());
        config.host = Some(host.clone());

        let session = builder.session.create(config.session_config(), true);

        let config = Arc::new(config);
        let protocol_retrievers =
            build_protocol_retrievers(builder, &config, &session, &host)
                .await?;

        let retriever = builder.retriever.create(
            session,
            candidate_finder,
            protocol_retrievers,
        )?;
        retriever.start()?;

        tracing::info!(
            protocols = ?config.protocols,
            host = %host.peer_id(),
            "lassie ready"
        );

        Ok(Self { config, retriever })
    }

    /// The resolved configuration of this instance.
    pub fn config(&self) -> &LassieConfig {
        &self.config
    }
}

/// Construct a retriever for every configured protocol lassie knows.
///
/// Unknown protocols produce no entry. A protocol listed more than once
/// is constructed again and replaces the earlier entry. The first
/// construction error aborts the whole registry.
pub async fn build_protocol_retrievers(
    builder: &Builder,
    config: &Arc<LassieConfig>,
    session: &DynSession,
    host: &DynHost,
) -> LassieResult<ProtocolRetrievers> {
    let mut out = HashMap::new();
    for protocol in config.protocols.iter() {
        let protocol = ProtocolCode::from(protocol.code());
        let Some(factory) = builder.protocol_retriever(protocol) else {
            tracing::debug!(%protocol, "no retriever for protocol, skipping");
            continue;
        };
        let retriever = factory
            .create(ProtocolRetrieverDeps {
                config: config.clone(),
                session: session.clone(),
                host: host.clone(),
            })
            .await?;
        out.insert(protocol, retriever);
    }
    Ok(out)
}

impl Fetcher for Lassie {
    fn fetch(
        &self,
        ctx: &Context,
        request: RetrievalRequest,
        config: FetchConfig,
    ) -> BoxFut<'_, LassieResult<RetrievalStats>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            // the handle cancels the bounded context when dropped, on
            // every way out of this future
            let (ctx, _cancel) = if self.config.global_timeout.is_zero() {
                (ctx, None)
            } else {
                let (ctx, cancel) =
                    ctx.with_timeout(self.config.global_timeout);
                (ctx, Some(cancel))
            };

            self.retriever
                .retrieve(ctx, request, config.events_callback())
                .await
        })
    }

    fn register_subscriber(
        &self,
        subscriber: RetrievalEventSubscriber,
    ) -> Unregister {
        self.retriever.register_subscriber(subscriber)
    }
}
