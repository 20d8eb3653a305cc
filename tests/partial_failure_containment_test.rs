//! Testable property #10: a shard failure during scatter-gather is
//! contained to that shard — the coordinator still answers with the
//! surviving shards' data and an honest `shards_failed` count, and
//! only degrades to a hard error once every shard for the index has
//! failed.

mod support;

use quidditch_coordinator::ast::Query;
use quidditch_coordinator::ast::builders::RequestBuilder;
use quidditch_coordinator::dispatch::{MockShardClient, ShardClient, ShardDispatcher, ShardSearchResponse};
use quidditch_coordinator::error::Error;
use quidditch_coordinator::execution::{PhysicalExecutor, QueryTimeout};
use quidditch_coordinator::plan::converter::LogicalPlanner;
use quidditch_coordinator::plan::optimizer;
use quidditch_coordinator::plan::physical::PhysicalPlanner;
use quidditch_coordinator::value::Hit;
use std::collections::BTreeMap;
use std::sync::Arc;

fn plan_for(index_meta: &quidditch_coordinator::schema::IndexMetadata) -> quidditch_coordinator::plan::physical::PhysicalPlan {
    let request = RequestBuilder::new(Query::MatchAll).build();
    let logical = LogicalPlanner::new(&index_meta.index, index_meta.shard_ids()).build(&request);
    let (optimized, _) = optimizer::optimize(logical, &optimizer::default_rules());
    PhysicalPlanner::new().build(&optimized)
}

#[tokio::test]
async fn one_failed_shard_out_of_three_still_answers_with_the_other_two() {
    let index_meta = support::uniform_index("idx", 3);
    let physical = plan_for(&index_meta);

    let client: Arc<dyn ShardClient> = Arc::new(
        MockShardClient::new()
            .with_response(
                0,
                ShardSearchResponse { hits: vec![Hit { id: "a".into(), score: 1.0, source: Default::default() }], total_hits: 1, aggregations: BTreeMap::new() },
            )
            .with_response(
                1,
                ShardSearchResponse { hits: vec![Hit { id: "b".into(), score: 1.0, source: Default::default() }], total_hits: 1, aggregations: BTreeMap::new() },
            )
            .with_failure(2, Error::UpstreamTimeout { elapsed_ms: 250 }),
    );
    let dispatcher = ShardDispatcher::new(client);
    let result = PhysicalExecutor::new(&dispatcher)
        .execute(&physical, &index_meta, &QueryTimeout::infinite())
        .await
        .unwrap();

    assert_eq!(result.shards_total, 3);
    assert_eq!(result.shards_successful, 2);
    assert_eq!(result.shards_failed, 1);
    assert_eq!(result.total_hits, 2);
    assert_eq!(result.hits.len(), 2);
}

#[tokio::test]
async fn every_shard_failing_surfaces_as_a_hard_error_not_an_empty_result() {
    let index_meta = support::uniform_index("idx", 2);
    let physical = plan_for(&index_meta);

    let client: Arc<dyn ShardClient> = Arc::new(
        MockShardClient::new()
            .with_failure(0, Error::UpstreamTimeout { elapsed_ms: 250 })
            .with_failure(1, Error::NodeUnavailable { index: "idx".into(), shard_id: 1 }),
    );
    let dispatcher = ShardDispatcher::new(client);
    let outcome = PhysicalExecutor::new(&dispatcher)
        .execute(&physical, &index_meta, &QueryTimeout::infinite())
        .await;

    assert!(matches!(outcome, Err(Error::ShardUnavailable { .. })));
}

#[tokio::test]
async fn an_unallocated_shard_id_is_skipped_rather_than_treated_as_a_failure() {
    // `shard_ids` carries an id that isn't in this index's routing
    // table at all (e.g. a stale cached logical plan from before a
    // shard count shrank) — `scatter` silently skips it rather than
    // contacting a node that doesn't own it, since it only iterates
    // shards present in `index_meta.shards`.
    let index_meta = support::uniform_index("idx", 1);
    let request = quidditch_coordinator::dispatch::ShardSearchRequest {
        index: "idx".into(),
        filter_expr: None,
        aggs: BTreeMap::new(),
        sort: vec![],
        from: 0,
        size: 10,
    };
    let client: Arc<dyn ShardClient> = Arc::new(MockShardClient::new().with_response(
        0,
        ShardSearchResponse { hits: vec![Hit { id: "a".into(), score: 1.0, source: Default::default() }], total_hits: 1, aggregations: BTreeMap::new() },
    ));
    let dispatcher = ShardDispatcher::new(client);
    let result = dispatcher
        .scatter(&index_meta, &[0, 99], request, &QueryTimeout::infinite())
        .await
        .unwrap();

    assert_eq!(result.shards_total, 2);
    assert_eq!(result.shards_successful, 1);
    assert_eq!(result.shards_failed, 0, "the unallocated id is skipped, not counted as a failure");
}

#[tokio::test]
async fn a_shard_in_a_non_active_state_counts_as_a_contained_failure() {
    let mut index_meta = support::uniform_index("idx", 1);
    index_meta.shards.insert(
        1,
        quidditch_coordinator::schema::ShardRouting {
            shard_id: 1,
            node_address: "node-1:9200".into(),
            state: quidditch_coordinator::schema::ShardState::Initializing,
        },
    );
    index_meta.num_shards = 2;

    let request = quidditch_coordinator::dispatch::ShardSearchRequest {
        index: "idx".into(),
        filter_expr: None,
        aggs: BTreeMap::new(),
        sort: vec![],
        from: 0,
        size: 10,
    };
    let client: Arc<dyn ShardClient> = Arc::new(MockShardClient::new().with_response(
        0,
        ShardSearchResponse { hits: vec![Hit { id: "a".into(), score: 1.0, source: Default::default() }], total_hits: 1, aggregations: BTreeMap::new() },
    ));
    let dispatcher = ShardDispatcher::new(client);
    let result = dispatcher
        .scatter(&index_meta, &[0, 1], request, &QueryTimeout::infinite())
        .await
        .unwrap();

    assert_eq!(result.shards_successful, 1);
    assert_eq!(result.shards_failed, 1);
}
