//! Aggregation merge benchmarks: bucketed terms/histogram merging and
//! stats recombination across varying shard counts, driven through the
//! dispatcher's public scatter-gather path so the benchmark exercises
//! the real merge code rather than a private helper.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use quidditch_coordinator::dispatch::{
    MockShardClient, ShardDispatcher, ShardSearchRequest, ShardSearchResponse,
};
use quidditch_coordinator::execution::executor::{AggregationResult, BucketResult, StatsResult};
use quidditch_coordinator::execution::QueryTimeout;
use quidditch_coordinator::schema::{IndexMetadata, ShardRouting, ShardState};
use quidditch_coordinator::value::Value;
use std::collections::BTreeMap;
use std::hint::black_box;
use std::sync::Arc;
use tokio::runtime::Runtime;

fn index_meta(shard_count: u32) -> IndexMetadata {
    let mut shards = BTreeMap::new();
    for id in 0..shard_count {
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
        index: "logs".into(),
        num_shards: shard_count,
        shards,
    }
}

fn request() -> ShardSearchRequest {
    ShardSearchRequest {
        index: "logs".into(),
        filter_expr: None,
        aggs: BTreeMap::new(),
        sort: vec![],
        from: 0,
        size: 0,
    }
}

fn bucketed_response(bucket_count: usize, shard_seed: u64) -> ShardSearchResponse {
    let buckets = (0..bucket_count)
        .map(|i| BucketResult {
            key: Value::Str(format!("status-{i}")),
            doc_count: shard_seed + i as u64,
        })
        .collect();
    let mut aggregations = BTreeMap::new();
    aggregations.insert("by_status".to_string(), AggregationResult::Buckets(buckets));
    aggregations.insert(
        "latency_stats".to_string(),
        AggregationResult::Stats(StatsResult {
            count: 100,
            min: 1.0,
            max: 500.0,
            sum: 12_000.0,
            avg: 120.0,
        }),
    );
    ShardSearchResponse {
        hits: vec![],
        total_hits: shard_seed,
        aggregations,
    }
}

fn mock_dispatcher(shard_count: u32, bucket_count: usize) -> ShardDispatcher {
    let mut client = MockShardClient::new();
    for id in 0..shard_count {
        client = client.with_response(id, bucketed_response(bucket_count, u64::from(id) + 1));
    }
    ShardDispatcher::new(Arc::new(client))
}

fn bench_merge_across_shards(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("aggregation_merge_by_shard_count");
    for shard_count in [2u32, 16, 64] {
        let meta = index_meta(shard_count);
        let dispatcher = mock_dispatcher(shard_count, 10);
        let shard_ids: Vec<u32> = (0..shard_count).collect();

        group.bench_with_input(
            BenchmarkId::from_parameter(shard_count),
            &shard_ids,
            |b, shard_ids| {
                b.iter(|| {
                    rt.block_on(async {
                        dispatcher
                            .scatter(
                                black_box(&meta),
                                shard_ids,
                                request(),
                                &QueryTimeout::infinite(),
                            )
                            .await
                            .unwrap()
                    })
                });
            },
        );
    }
    group.finish();
}

fn bench_merge_by_bucket_cardinality(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("aggregation_merge_by_bucket_count");
    let shard_count = 16;
    let shard_ids: Vec<u32> = (0..shard_count).collect();
    let meta = index_meta(shard_count);

    for bucket_count in [10usize, 100, 1_000] {
        let dispatcher = mock_dispatcher(shard_count, bucket_count);
        group.bench_with_input(
            BenchmarkId::from_parameter(bucket_count),
            &shard_ids,
            |b, shard_ids| {
                b.iter(|| {
                    rt.block_on(async {
                        dispatcher
                            .scatter(
                                black_box(&meta),
                                shard_ids,
                                request(),
                                &QueryTimeout::infinite(),
                            )
                            .await
                            .unwrap()
                    })
                });
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_merge_across_shards,
    bench_merge_by_bucket_cardinality
);
criterion_main!(benches);
