//! # Telemetry (C10)
//!
//! Coordinator-side Prometheus metrics. Two families:
//! - The names §4.10 fixes exactly (`distributed_search_*`,
//!   `shard_query_*`, `aggregation_merge_seconds`) — observation points
//!   for these are fixed in §4.5/§4.6 and must fire exactly once per
//!   event.
//! - Ambient HTTP/cache/pipeline metrics the distillation doesn't name
//!   but a production coordinator still needs (request latency per
//!   route, plan cache hit/miss/eviction per §4.8's
//!   `quidditch_query_cache_*` names, pipeline stage failures).
//!
//! One [`Telemetry`] instance is built at startup and shared via `Arc`
//! across the HTTP surface and dispatcher.

use prometheus::{Encoder, HistogramVec, IntCounterVec, IntGaugeVec, Registry, TextEncoder};

pub struct Telemetry {
    registry: Registry,

    // §4.10 — fixed names.
    pub distributed_search_latency_seconds: HistogramVec,
    pub shard_query_latency_seconds: HistogramVec,
    pub aggregation_merge_seconds: HistogramVec,
    pub distributed_search_hits_total: HistogramVec,
    pub distributed_search_shards_queried: HistogramVec,
    pub shard_query_failures_total: IntCounterVec,

    // §4.8 — plan cache, named `quidditch_query_cache_*`.
    pub query_cache_hits: IntCounterVec,
    pub query_cache_misses: IntCounterVec,
    pub query_cache_evictions: IntCounterVec,
    pub query_cache_size: IntGaugeVec,

    // Ambient HTTP/pipeline metrics.
    pub request_duration_seconds: HistogramVec,
    pub pipeline_failures_total: IntCounterVec,
    pub requests_total: IntCounterVec,
}

macro_rules! register_histogram {
    ($registry:expr, $name:expr, $help:expr, $labels:expr, $buckets:expr) => {{
        let mut opts = prometheus::HistogramOpts::new($name, $help);
        if let Some(buckets) = $buckets {
            opts = opts.buckets(buckets);
        }
        let metric = HistogramVec::new(opts, $labels).expect("valid histogram opts");
        $registry
            .register(Box::new(metric.clone()))
            .unwrap_or_else(|e| panic!("register {}: {e}", $name));
        metric
    }};
}

macro_rules! register_counter {
    ($registry:expr, $name:expr, $help:expr, $labels:expr) => {{
        let metric = IntCounterVec::new(prometheus::Opts::new($name, $help), $labels)
            .expect("valid counter opts");
        $registry
            .register(Box::new(metric.clone()))
            .unwrap_or_else(|e| panic!("register {}: {e}", $name));
        metric
    }};
}

macro_rules! register_gauge {
    ($registry:expr, $name:expr, $help:expr, $labels:expr) => {{
        let metric = IntGaugeVec::new(prometheus::Opts::new($name, $help), $labels)
            .expect("valid gauge opts");
        $registry
            .register(Box::new(metric.clone()))
            .unwrap_or_else(|e| panic!("register {}: {e}", $name));
        metric
    }};
}

impl Telemetry {
    pub fn new() -> Self {
        let registry = Registry::new();

        let distributed_search_latency_seconds = register_histogram!(
            registry,
            "distributed_search_latency_seconds",
            "End-to-end distributed search latency",
            &["index"],
            None::<Vec<f64>>
        );

        let shard_query_latency_seconds = register_histogram!(
            registry,
            "shard_query_latency_seconds",
            "Per-shard query latency",
            &["index", "shard_id", "node_id"],
            None::<Vec<f64>>
        );

        let aggregation_merge_seconds = register_histogram!(
            registry,
            "aggregation_merge_seconds",
            "Time spent merging per-shard aggregation partials",
            &["type"],
            None::<Vec<f64>>
        );

        let distributed_search_hits_total = register_histogram!(
            registry,
            "distributed_search_hits_total",
            "Hit count per search, bucketed 1..1,000,000",
            &["index"],
            Some(prometheus::exponential_buckets(1.0, 4.0, 11).expect("valid buckets"))
        );

        let distributed_search_shards_queried = register_histogram!(
            registry,
            "distributed_search_shards_queried",
            "Number of shards queried per search, bucketed 1..20",
            &["index"],
            Some((1..=20).map(f64::from).collect::<Vec<_>>())
        );

        let shard_query_failures_total = register_counter!(
            registry,
            "shard_query_failures_total",
            "Per-shard query failures by error type",
            &["index", "shard_id", "node_id", "error_type"]
        );

        let query_cache_hits = register_counter!(
            registry,
            "quidditch_query_cache_hits",
            "Plan cache hits",
            &["cache_type", "index"]
        );
        let query_cache_misses = register_counter!(
            registry,
            "quidditch_query_cache_misses",
            "Plan cache misses",
            &["cache_type", "index"]
        );
        let query_cache_evictions = register_counter!(
            registry,
            "quidditch_query_cache_evictions",
            "Plan cache LRU evictions",
            &["cache_type", "index"]
        );
        let query_cache_size = register_gauge!(
            registry,
            "quidditch_query_cache_size",
            "Current plan cache entry count",
            &["cache_type", "index"]
        );

        let request_duration_seconds = register_histogram!(
            registry,
            "quidditch_request_duration_seconds",
            "Coordinator HTTP request latency by route and status",
            &["route", "status"],
            None::<Vec<f64>>
        );

        let pipeline_failures_total = register_counter!(
            registry,
            "quidditch_pipeline_failures_total",
            "Pipeline stage failures by pipeline name",
            &["pipeline", "stage"]
        );

        let requests_total = register_counter!(
            registry,
            "quidditch_requests_total",
            "Total HTTP requests by route and status",
            &["route", "status"]
        );

        Telemetry {
            registry,
            distributed_search_latency_seconds,
            shard_query_latency_seconds,
            aggregation_merge_seconds,
            distributed_search_hits_total,
            distributed_search_shards_queried,
            shard_query_failures_total,
            query_cache_hits,
            query_cache_misses,
            query_cache_evictions,
            query_cache_size,
            request_duration_seconds,
            pipeline_failures_total,
            requests_total,
        }
    }

    /// Renders the registry in Prometheus text exposition format, for
    /// the `/metrics` HTTP endpoint.
    pub fn render(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .expect("prometheus text encoding never fails for well-formed metrics");
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}
