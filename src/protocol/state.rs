//! # Shared HTTP Application State
//!
//! Everything a handler needs, assembled once at startup in
//! `quidditch-coordinatord` and shared across requests via `Arc`. Mirrors
//! the teacher's pattern of bundling its engine/storage handles behind a
//! single cloneable state struct passed to every RPC handler.

use crate::config::Config;
use crate::dispatch::ShardDispatcher;
use crate::execution::PlanCache;
use crate::pipeline::PipelineRegistry;
use crate::schema::directory::ClusterDirectory;
use crate::telemetry::Telemetry;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub directory: Arc<dyn ClusterDirectory>,
    pub client: Arc<dyn crate::dispatch::ShardClient>,
    pub dispatcher: Arc<ShardDispatcher>,
    pub plan_cache: Arc<PlanCache>,
    pub pipelines: Arc<PipelineRegistry>,
    pub telemetry: Arc<Telemetry>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        directory: Arc<dyn ClusterDirectory>,
        client: Arc<dyn crate::dispatch::ShardClient>,
        plan_cache: Arc<PlanCache>,
        pipelines: Arc<PipelineRegistry>,
        telemetry: Arc<Telemetry>,
        config: Arc<Config>,
    ) -> Self {
        let dispatcher = Arc::new(ShardDispatcher::new(Arc::clone(&client)));
        AppState {
            directory,
            client,
            dispatcher,
            plan_cache,
            pipelines,
            telemetry,
            config,
        }
    }
}
