//! # Physical Executor (C5)
//!
//! Walks a costed [`PhysicalPlan`] to completion. The leaf `Scan` node
//! is handed to a [`crate::dispatch::ShardDispatcher`] for scatter-gather;
//! everything above it — filtering that couldn't be pushed down,
//! projection, and the final merge-sort/window — runs here against the
//! gathered rows. Aggregation merging happens inside the dispatcher
//! since it needs the per-shard partials, not just the merged hit list.

use crate::ast::SortField;
use crate::dispatch::ShardDispatcher;
use crate::error::Result;
use crate::execution::timeout::QueryTimeout;
use crate::plan::expr::Expr;
use crate::plan::physical::PhysicalPlan;
use crate::schema::IndexMetadata;
use crate::value::{Hit, Row};
use std::collections::BTreeMap;

/// One bucket of a bucketed aggregation (`terms`, `histogram`,
/// `date_histogram`).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BucketResult {
    pub key: crate::value::Value,
    pub doc_count: u64,
}

/// `stats`/`extended_stats` output.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StatsResult {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub avg: f64,
}

impl StatsResult {
    pub fn merge(self, other: StatsResult) -> StatsResult {
        if self.count == 0 {
            return other;
        }
        if other.count == 0 {
            return self;
        }
        let count = self.count + other.count;
        let sum = self.sum + other.sum;
        StatsResult {
            count,
            min: self.min.min(other.min),
            max: self.max.max(other.max),
            sum,
            avg: sum / count as f64,
        }
    }
}

/// Result of one named aggregation, already merged across shards.
/// Percentiles and cardinality are approximations: each shard computes
/// its own estimate and the coordinator averages/unions them rather
/// than recomputing an exact global value, which would require
/// shipping raw field values to the coordinator.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum AggregationResult {
    Buckets(Vec<BucketResult>),
    Metric(f64),
    Stats(StatsResult),
    Percentiles(BTreeMap<String, f64>),
}

/// Final (or partial, under shard-failure containment) result of
/// executing a physical plan.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub hits: Vec<Hit>,
    pub total_hits: u64,
    pub max_score: Option<f64>,
    pub aggregations: BTreeMap<String, AggregationResult>,
    pub shards_total: u32,
    pub shards_successful: u32,
    pub shards_failed: u32,
    pub took_ms: u64,
}

/// Requirements the leaf `Scan` must satisfy, collected by walking the
/// plan from the root down before any shard is contacted.
struct ScanRequirements {
    aggs: BTreeMap<String, crate::ast::AggSpec>,
    sort: Vec<SortField>,
    window: usize,
}

impl ScanRequirements {
    fn collect(plan: &PhysicalPlan) -> Self {
        let mut aggs = BTreeMap::new();
        let mut sort = Vec::new();
        let mut window = 10;
        let mut node = Some(plan);
        while let Some(p) = node {
            match p {
                PhysicalPlan::HashAggregate { specs, .. } | PhysicalPlan::SortedAggregate { specs, .. } => {
                    aggs = specs.clone();
                    node = Self::child(p);
                }
                PhysicalPlan::Sort { fields, .. } => {
                    sort = fields.clone();
                    node = Self::child(p);
                }
                PhysicalPlan::TopN { fields, from, size, .. } => {
                    sort = fields.clone();
                    window = window.max(from + size);
                    node = Self::child(p);
                }
                PhysicalPlan::Limit { from, size, .. } => {
                    window = window.max(from + size);
                    node = Self::child(p);
                }
                _ => node = Self::child(p),
            }
        }
        ScanRequirements { aggs, sort, window }
    }

    fn child(plan: &PhysicalPlan) -> Option<&PhysicalPlan> {
        match plan {
            PhysicalPlan::Scan { .. } => None,
            PhysicalPlan::Filter { input, .. }
            | PhysicalPlan::Project { input, .. }
            | PhysicalPlan::HashAggregate { input, .. }
            | PhysicalPlan::SortedAggregate { input, .. }
            | PhysicalPlan::Sort { input, .. }
            | PhysicalPlan::Limit { input, .. }
            | PhysicalPlan::TopN { input, .. } => Some(input),
        }
    }
}

fn find_scan(plan: &PhysicalPlan) -> Option<(&String, &Vec<u32>, &Option<Expr>)> {
    match plan {
        PhysicalPlan::Scan { index, shard_ids, filter_expr, .. } => Some((index, shard_ids, filter_expr)),
        PhysicalPlan::Filter { input, .. }
        | PhysicalPlan::Project { input, .. }
        | PhysicalPlan::HashAggregate { input, .. }
        | PhysicalPlan::SortedAggregate { input, .. }
        | PhysicalPlan::Sort { input, .. }
        | PhysicalPlan::Limit { input, .. }
        | PhysicalPlan::TopN { input, .. } => find_scan(input),
    }
}

fn find_unpushed_filter(plan: &PhysicalPlan) -> Option<&Expr> {
    match plan {
        PhysicalPlan::Filter { predicate, .. } => Some(predicate),
        PhysicalPlan::Scan { .. } => None,
        PhysicalPlan::Project { input, .. }
        | PhysicalPlan::HashAggregate { input, .. }
        | PhysicalPlan::SortedAggregate { input, .. }
        | PhysicalPlan::Sort { input, .. }
        | PhysicalPlan::Limit { input, .. }
        | PhysicalPlan::TopN { input, .. } => find_unpushed_filter(input),
    }
}

fn find_project_fields(plan: &PhysicalPlan) -> Option<&Vec<String>> {
    match plan {
        PhysicalPlan::Project { fields, .. } => Some(fields),
        PhysicalPlan::Scan { .. } | PhysicalPlan::Filter { .. } => None,
        PhysicalPlan::HashAggregate { input, .. }
        | PhysicalPlan::SortedAggregate { input, .. }
        | PhysicalPlan::Sort { input, .. }
        | PhysicalPlan::Limit { input, .. }
        | PhysicalPlan::TopN { input, .. } => find_project_fields(input),
    }
}

fn find_window(plan: &PhysicalPlan) -> (usize, usize) {
    match plan {
        PhysicalPlan::Limit { from, size, .. } | PhysicalPlan::TopN { from, size, .. } => (*from, *size),
        PhysicalPlan::Scan { .. } => (0, 10),
        PhysicalPlan::Filter { input, .. }
        | PhysicalPlan::Project { input, .. }
        | PhysicalPlan::HashAggregate { input, .. }
        | PhysicalPlan::SortedAggregate { input, .. }
        | PhysicalPlan::Sort { input, .. } => find_window(input),
    }
}

fn find_sort_fields(plan: &PhysicalPlan) -> Vec<SortField> {
    match plan {
        PhysicalPlan::Sort { fields, .. } | PhysicalPlan::TopN { fields, .. } => fields.clone(),
        PhysicalPlan::Scan { .. } => Vec::new(),
        PhysicalPlan::Filter { input, .. }
        | PhysicalPlan::Project { input, .. }
        | PhysicalPlan::HashAggregate { input, .. }
        | PhysicalPlan::SortedAggregate { input, .. }
        | PhysicalPlan::Limit { input, .. } => find_sort_fields(input),
    }
}

/// Executes a costed physical plan end to end.
pub struct PhysicalExecutor<'a> {
    dispatcher: &'a ShardDispatcher,
}

impl<'a> PhysicalExecutor<'a> {
    pub fn new(dispatcher: &'a ShardDispatcher) -> Self {
        PhysicalExecutor { dispatcher }
    }

    pub async fn execute(
        &self,
        plan: &PhysicalPlan,
        index_meta: &IndexMetadata,
        timeout: &QueryTimeout,
    ) -> Result<ExecutionResult> {
        let (index, shard_ids, filter_expr) = find_scan(plan).expect("every physical plan has a Scan leaf");
        let requirements = ScanRequirements::collect(plan);

        let request = crate::dispatch::ShardSearchRequest {
            index: index.clone(),
            filter_expr: filter_expr.clone(),
            aggs: requirements.aggs,
            sort: requirements.sort.clone(),
            from: 0,
            size: requirements.window,
        };

        let mut result = self
            .dispatcher
            .scatter(index_meta, shard_ids, request, timeout)
            .await?;

        if let Some(predicate) = find_unpushed_filter(plan) {
            result.hits.retain(|hit| predicate.matches(&hit.source));
        }

        let sort_fields = find_sort_fields(plan);
        finalize_order(&mut result.hits, &sort_fields);

        // Computed over the full merged (and post-filter) hit set,
        // before the window below slices it down — otherwise a
        // paginated (`from > 0`) or non-score-sorted request would
        // report the max score of whatever page happened to survive
        // `skip`/`take` rather than the true max across all hits.
        result.max_score = max_score(&result.hits);

        let (from, size) = find_window(plan);
        result.hits = result.hits.into_iter().skip(from).take(size).collect();

        if let Some(fields) = find_project_fields(plan) {
            for hit in &mut result.hits {
                project_row(&mut hit.source, fields);
            }
        }

        result.took_ms = timeout.elapsed().as_millis() as u64;
        Ok(result)
    }
}

fn max_score(hits: &[Hit]) -> Option<f64> {
    hits.iter()
        .map(|h| h.score)
        .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |m| m.max(s))))
}

/// Merge-sorts gathered hits by the requested sort fields, or by
/// descending score when the request has none (the DSL's relevance
/// order).
fn finalize_order(hits: &mut [Hit], sort_fields: &[SortField]) {
    if sort_fields.is_empty() {
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        return;
    }
    hits.sort_by(|a, b| {
        for field in sort_fields {
            let av = a.field(&field.field);
            let bv = b.field(&field.field);
            let ordering = match (av, bv) {
                (Some(x), Some(y)) => x.cmp_total(y),
                (None, Some(_)) => std::cmp::Ordering::Less,
                (Some(_), None) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            };
            let ordering = if field.desc { ordering.reverse() } else { ordering };
            if ordering != std::cmp::Ordering::Equal {
                return ordering;
            }
        }
        std::cmp::Ordering::Equal
    });
}

fn project_row(row: &mut Row, fields: &[String]) {
    row.retain(|k, _| fields.contains(k));
}
