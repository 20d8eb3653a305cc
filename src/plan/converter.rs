//! # Logical Planner (C2)
//!
//! Builds a [`LogicalPlan`] from a [`SearchRequest`] for a specific
//! index and shard set. Wrapping order is fixed regardless of request
//! shape: `Scan -> Filter? -> Aggregate? -> Project? -> Sort? -> Limit/TopN`.

use crate::ast::{AggSpec, Query, SearchRequest};
use crate::plan::expr::Expr;
use crate::plan::logical::{Cardinality, LogicalPlan, BASE_CARDINALITY};

/// Builds logical plans for a fixed `(index, shard_ids)` target.
pub struct LogicalPlanner {
    index: String,
    shard_ids: Vec<u32>,
}

impl LogicalPlanner {
    pub fn new(index: impl Into<String>, shard_ids: Vec<u32>) -> Self {
        LogicalPlanner {
            index: index.into(),
            shard_ids,
        }
    }

    pub fn build(&self, request: &SearchRequest) -> LogicalPlan {
        let expr = Expr::from_query(&request.query);
        let scan_cardinality = BASE_CARDINALITY * self.shard_ids.len().max(1) as f64;
        let filtered_cardinality = scan_cardinality * selectivity(&request.query);

        let mut plan = if matches!(request.query, Query::MatchAll) {
            LogicalPlan::Scan {
                index: self.index.clone(),
                shard_ids: self.shard_ids.clone(),
                filter_expr: None,
                estimated_cardinality: scan_cardinality,
            }
        } else {
            LogicalPlan::Filter {
                input: Box::new(LogicalPlan::Scan {
                    index: self.index.clone(),
                    shard_ids: self.shard_ids.clone(),
                    filter_expr: Some(expr),
                    estimated_cardinality: scan_cardinality,
                }),
                predicate: Expr::from_query(&request.query),
                estimated_cardinality: filtered_cardinality,
            }
        };

        if !request.aggs.is_empty() {
            let agg_cardinality = aggregate_cardinality(&request.aggs, filtered_cardinality);
            plan = LogicalPlan::Aggregate {
                input: Box::new(plan),
                specs: request.aggs.clone(),
                estimated_cardinality: agg_cardinality,
            };
        }

        if let crate::ast::SourceFilter::Fields(fields) = &request.source {
            plan = LogicalPlan::Project {
                input: Box::new(plan),
                fields: fields.clone(),
            };
        }

        if !request.sort.is_empty() {
            plan = LogicalPlan::Sort {
                input: Box::new(plan),
                fields: request.sort.clone(),
            };
        }

        // §4.2's wrapping order always ends in Limit, whether or not a
        // sort was present; the Optimizer's TopNOptimization rule (§4.3,
        // priority 85) is responsible for fusing a Limit directly over a
        // Sort into a single TopN node.
        plan = LogicalPlan::Limit {
            input: Box::new(plan),
            from: request.from,
            size: request.size,
        };

        plan
    }
}

/// Selectivity table (§4.3): fraction of input rows a query kind is
/// expected to retain. `Bool` combines child selectivities by the
/// boolean-algebra approximation noted for each clause kind.
pub fn selectivity(query: &Query) -> f64 {
    match query {
        Query::MatchAll => 1.0,
        Query::Term { .. } => 0.10,
        Query::Terms { values, .. } => (0.10 * values.len() as f64).min(1.0),
        Query::Range { .. } => 0.30,
        Query::Exists { .. } => 0.80,
        Query::Prefix { .. } | Query::Wildcard { .. } => 0.20,
        Query::Match { .. } | Query::MatchPhrase { .. } => 0.15,
        Query::Bool {
            must,
            should,
            must_not,
            filter,
            ..
        } => {
            let and_part: f64 = must.iter().chain(filter).map(selectivity).product();
            let or_part = if should.is_empty() {
                1.0
            } else {
                should.iter().map(selectivity).sum::<f64>().min(1.0)
            };
            let not_part: f64 = must_not
                .iter()
                .map(|q| 1.0 - selectivity(q))
                .product();
            (and_part * or_part * not_part).clamp(0.0, 1.0)
        }
        // Fuzzy/Regexp/MultiMatch/QueryString: no closed-form estimate
        // given in the selectivity table, fall back to the documented
        // default.
        _ => 0.50,
    }
}

/// Post-aggregation output row estimate. Bucketed aggregations are
/// capped by their `size`/implied bucket count; scalar metrics always
/// collapse to a single row; a request with multiple aggs takes the
/// max across them since they execute over the same filtered input and
/// report independently.
fn aggregate_cardinality(
    specs: &std::collections::BTreeMap<String, AggSpec>,
    input_cardinality: Cardinality,
) -> Cardinality {
    specs
        .values()
        .map(|spec| match spec {
            AggSpec::Terms { size, .. } => (*size as f64).min(input_cardinality),
            AggSpec::Histogram { .. } | AggSpec::DateHistogram { .. } => {
                input_cardinality.min(1000.0)
            }
            _ => 1.0,
        })
        .fold(1.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::RequestBuilder;

    #[test]
    fn match_all_produces_bare_scan() {
        let planner = LogicalPlanner::new("logs", vec![0, 1]);
        let request = SearchRequest::match_all_default();
        let plan = planner.build(&request);
        assert!(matches!(plan, LogicalPlan::Limit { .. }));
    }

    #[test]
    fn term_query_wraps_scan_in_filter() {
        let planner = LogicalPlanner::new("logs", vec![0]);
        let request = RequestBuilder::new(Query::Term {
            field: "status".into(),
            value: "active".into(),
        })
        .build();
        let plan = planner.build(&request);
        // Limit -> Filter -> Scan
        if let LogicalPlan::Limit { input, .. } = plan {
            assert!(matches!(*input, LogicalPlan::Filter { .. }));
        } else {
            panic!("expected Limit at root");
        }
    }

    #[test]
    fn selectivity_table_matches_spec_values() {
        assert_eq!(selectivity(&Query::MatchAll), 1.0);
        assert_eq!(
            selectivity(&Query::Term {
                field: "a".into(),
                value: "b".into()
            }),
            0.10
        );
        assert_eq!(
            selectivity(&Query::Exists { field: "a".into() }),
            0.80
        );
    }

    #[test]
    fn terms_selectivity_scales_with_value_count_and_caps_at_one() {
        let q = Query::Terms {
            field: "a".into(),
            values: (0..20).map(|i| i.to_string()).collect(),
        };
        assert_eq!(selectivity(&q), 1.0);
    }

    #[test]
    fn bool_must_not_inverts_child_selectivity() {
        let q = Query::Bool {
            must: vec![],
            should: vec![],
            must_not: vec![Query::Term {
                field: "a".into(),
                value: "b".into(),
            }],
            filter: vec![],
            minimum_should_match: Default::default(),
        };
        assert_eq!(selectivity(&q), 0.90);
    }

    #[test]
    fn sort_bearing_request_wraps_sort_then_limit_before_optimization() {
        // The converter emits separate Sort/Limit nodes per §4.2; only
        // the Optimizer's TopNOptimization rule fuses them into TopN.
        let planner = LogicalPlanner::new("logs", vec![0]);
        let mut request = SearchRequest::match_all_default();
        request.sort = vec![crate::ast::SortField {
            field: "ts".into(),
            desc: true,
        }];
        let plan = planner.build(&request);
        if let LogicalPlan::Limit { input, .. } = plan {
            assert!(matches!(*input, LogicalPlan::Sort { .. }));
        } else {
            panic!("expected Limit at root");
        }
    }

    #[test]
    fn sort_bearing_request_fuses_to_topn_after_optimization() {
        let planner = LogicalPlanner::new("logs", vec![0]);
        let mut request = SearchRequest::match_all_default();
        request.sort = vec![crate::ast::SortField {
            field: "ts".into(),
            desc: true,
        }];
        let plan = planner.build(&request);
        let (optimized, _) =
            crate::plan::optimizer::optimize(plan, &crate::plan::optimizer::default_rules());
        assert!(matches!(optimized, LogicalPlan::TopN { .. }));
    }
}
