use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use nexa_feed::api::{router, AppState};
use nexa_feed::config::Config;
use nexa_feed::core::IdGenerator;
use nexa_feed::engagement::EngagementEngine;
use nexa_feed::events::{EventSink, TracingSink};
use nexa_feed::feed::FeedQueryEngine;
use nexa_feed::graph::FollowGraph;
use nexa_feed::ranking::PopularityRanker;
use nexa_feed::store::{EntityStore, MemoryStore, SqliteStore, TimedStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let timeout = Duration::from_millis(config.store.timeout_ms);
    let store: Arc<dyn EntityStore> = match config.database.backend.as_str() {
        "sqlite" => {
            let store = SqliteStore::connect(&config.database.url).await?;
            info!(url = %config.database.url, "sqlite store ready");
            Arc::new(TimedStore::new(store, timeout))
        }
        _ => {
            info!("using in-memory store");
            Arc::new(TimedStore::new(MemoryStore::new(), timeout))
        }
    };

    let events: Arc<dyn EventSink> = Arc::new(TracingSink);
    let ids = Arc::new(IdGenerator::new(1));

    let graph = Arc::new(FollowGraph::new(store.clone(), events.clone()));
    let engagement = Arc::new(EngagementEngine::new(store.clone(), events.clone()));
    let feed = Arc::new(FeedQueryEngine::new(
        store.clone(),
        graph.clone(),
        engagement.clone(),
        events.clone(),
        ids.clone(),
    ));
    let ranker = Arc::new(PopularityRanker::new(
        store.clone(),
        config.cache.capacity,
        Duration::from_secs(config.cache.ttl_secs),
    ));

    let state = AppState {
        store,
        feed,
        graph,
        engagement,
        ranker,
        ids,
    };

    let app = router(state);
    let address = config.server_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("nexa-feed listening on {}", address);

    axum::serve(listener, app).await?;
    Ok(())
}
