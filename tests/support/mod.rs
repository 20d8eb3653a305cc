//! Shared fixtures for the integration suites. Not itself a test
//! binary (`tests/support/mod.rs` is excluded from test discovery),
//! just the `AppState`/cluster-topology plumbing every suite needs.

use quidditch_coordinator::config::Config;
use quidditch_coordinator::dispatch::ShardClient;
use quidditch_coordinator::execution::PlanCache;
use quidditch_coordinator::pipeline::PipelineRegistry;
use quidditch_coordinator::protocol::state::AppState;
use quidditch_coordinator::schema::directory::{ClusterDirectory, StaticClusterDirectory};
use quidditch_coordinator::schema::{ClusterMetadata, IndexMetadata, ShardRouting, ShardState};
use quidditch_coordinator::telemetry::Telemetry;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

#[allow(dead_code)]
pub fn uniform_index(index: &str, num_shards: u32) -> IndexMetadata {
    let mut shards = BTreeMap::new();
    for id in 0..num_shards {
        shards.insert(
            id,
            ShardRouting {
                shard_id: id,
                node_address: format!("node-{id}:9200"),
                state: ShardState::Active,
            },
        );
    }
    IndexMetadata {
        index: index.to_string(),
        num_shards,
        shards,
    }
}

#[allow(dead_code)]
pub fn cluster_of(indices: Vec<IndexMetadata>) -> ClusterMetadata {
    let mut map = BTreeMap::new();
    for meta in indices {
        map.insert(meta.index.clone(), meta);
    }
    ClusterMetadata { indices: map }
}

/// Assembles an `AppState` around a given shard client and topology,
/// with every other dependency (plan cache, pipelines, telemetry,
/// config) at its default, test-friendly setting.
#[allow(dead_code)]
pub fn app_state(client: Arc<dyn ShardClient>, metadata: ClusterMetadata) -> AppState {
    let directory: Arc<dyn ClusterDirectory> = Arc::new(StaticClusterDirectory::new(metadata));
    AppState::new(
        directory,
        client,
        Arc::new(PlanCache::new(100, Duration::from_secs(60))),
        Arc::new(PipelineRegistry::new()),
        Arc::new(Telemetry::new()),
        Arc::new(Config::default()),
    )
}
