//! Quidditch Coordinator Server Binary
//!
//! Starts the HTTP coordination tier: loads configuration, assembles
//! the shared [`AppState`], and serves the search/document/admin
//! routes defined in [`quidditch_coordinator::protocol`].
//!
//! ## Usage
//!
//! ```bash
//! # Start with config.toml / config.local.toml / QUIDDITCH_* env layering
//! cargo run --bin quidditch-coordinatord
//! ```

use quidditch_coordinator::config::Config;
use quidditch_coordinator::dispatch::{HttpShardClient, ShardClient};
use quidditch_coordinator::execution::PlanCache;
use quidditch_coordinator::pipeline::PipelineRegistry;
use quidditch_coordinator::protocol::state::AppState;
use quidditch_coordinator::schema::directory::{ClusterDirectory, RemoteClusterDirectory};
use quidditch_coordinator::telemetry::Telemetry;

use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    init_tracing(&config);

    tracing::info!(bind_address = %config.http.bind_address, "starting quidditch-coordinatord");

    let directory: Arc<dyn ClusterDirectory> = Arc::new(RemoteClusterDirectory::new(
        config.directory.endpoint.clone(),
        config.directory.retry_count,
        Duration::from_millis(config.directory.retry_backoff_millis),
    ));
    directory.refresh().await.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "initial cluster directory refresh failed, starting with an empty topology");
    });

    let client: Arc<dyn ShardClient> = Arc::new(HttpShardClient::new(Duration::from_secs(
        config.execution.request_timeout_secs,
    )));

    let plan_cache = Arc::new(PlanCache::new(
        config.cache.logical_capacity.max(config.cache.physical_capacity),
        Duration::from_secs(config.cache.ttl_secs),
    ));
    let pipelines = Arc::new(PipelineRegistry::new());
    let telemetry = Arc::new(Telemetry::new());
    let config = Arc::new(config);

    let state = AppState::new(
        Arc::clone(&directory),
        client,
        plan_cache,
        pipelines,
        telemetry,
        Arc::clone(&config),
    );

    spawn_directory_refresh(directory);

    let app = quidditch_coordinator::protocol::router(state).layer(
        tower_http::trace::TraceLayer::new_for_http(),
    );

    let listener = tokio::net::TcpListener::bind(&config.http.bind_address).await?;
    tracing::info!(bind_address = %config.http.bind_address, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/// The directory's topology changes on a minutes-scale cadence (§5);
/// a background task keeps the `ArcSwap`-backed cache warm so no
/// request-path code ever blocks on a refresh.
fn spawn_directory_refresh(directory: Arc<dyn ClusterDirectory>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            interval.tick().await;
            if let Err(e) = directory.refresh().await {
                tracing::warn!(error = %e, "cluster directory refresh failed");
            }
        }
    });
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.logging.format {
        quidditch_coordinator::config::LogFormat::Json => {
            registry.with(tracing_subscriber::fmt::layer().json()).init();
        }
        quidditch_coordinator::config::LogFormat::Pretty => {
            registry.with(tracing_subscriber::fmt::layer()).init();
        }
    }
}
