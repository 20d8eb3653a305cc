//! # Rule-Based Optimizer (C3)
//!
//! Rewrites a [`LogicalPlan`] to a fixed point by repeatedly applying a
//! priority-ordered set of [`Rule`]s. A pass walks the tree bottom-up;
//! each rule gets one shot at every node per pass. The loop stops when
//! a full pass produces no change (confluence) or after
//! [`MAX_PASSES`], whichever comes first.

use crate::plan::expr::Expr;
use crate::plan::logical::LogicalPlan;

/// Hard ceiling on optimization passes, guarding against a
/// non-confluent rule set looping forever.
pub const MAX_PASSES: usize = 10;

/// A single rewrite rule. `priority` orders rules within a pass —
/// higher runs first, since earlier rules can open up opportunities
/// for later ones within the same pass.
pub trait Rule {
    fn name(&self) -> &'static str;
    fn priority(&self) -> i32;
    /// Attempt to rewrite `plan`, returning `Some(new_plan)` if it
    /// changed anything.
    fn apply(&self, plan: &LogicalPlan) -> Option<LogicalPlan>;
}

pub struct FilterPushdown;
impl Rule for FilterPushdown {
    fn name(&self) -> &'static str {
        "FilterPushdown"
    }
    fn priority(&self) -> i32 {
        100
    }
    fn apply(&self, plan: &LogicalPlan) -> Option<LogicalPlan> {
        // Filter directly over Scan: fold the predicate into the
        // scan's filter_expr so the shard evaluates it instead of the
        // coordinator. This is the steady state `converter` already
        // produces, so the rule is idempotent on plans it built but
        // still fires on plans assembled any other way (e.g. by a
        // future planner entry point, or by test fixtures).
        if let LogicalPlan::Filter {
            input,
            predicate,
            estimated_cardinality,
        } = plan
        {
            if let LogicalPlan::Scan {
                index,
                shard_ids,
                filter_expr: None,
                estimated_cardinality: scan_card,
            } = input.as_ref()
            {
                return Some(LogicalPlan::Scan {
                    index: index.clone(),
                    shard_ids: shard_ids.clone(),
                    filter_expr: Some(predicate.clone()),
                    estimated_cardinality: estimated_cardinality.min(*scan_card),
                });
            }
        }
        None
    }
}

pub struct TopNOptimization;
impl Rule for TopNOptimization {
    fn name(&self) -> &'static str {
        "TopNOptimization"
    }
    fn priority(&self) -> i32 {
        85
    }
    fn apply(&self, plan: &LogicalPlan) -> Option<LogicalPlan> {
        // Limit directly over Sort collapses into a single TopN node;
        // the physical planner always prefers TopN's combined
        // sort+truncate over separate Sort and Limit operators (§4.4).
        if let LogicalPlan::Limit { input, from, size } = plan {
            if let LogicalPlan::Sort { input: sort_input, fields } = input.as_ref() {
                return Some(LogicalPlan::TopN {
                    input: sort_input.clone(),
                    fields: fields.clone(),
                    from: *from,
                    size: *size,
                });
            }
        }
        None
    }
}

pub struct PredicatePushdownThroughAggregate;
impl Rule for PredicatePushdownThroughAggregate {
    fn name(&self) -> &'static str {
        "PredicatePushdownThroughAggregate"
    }
    fn priority(&self) -> i32 {
        75
    }
    fn apply(&self, plan: &LogicalPlan) -> Option<LogicalPlan> {
        // Filter directly over Aggregate is never produced by this
        // request shape today (Aggregate only ever wraps the filtered
        // scan, never the reverse), but a future caller could compose
        // plans where a post-aggregate HAVING-style filter sits above
        // the Aggregate node. Pushing such a filter below the
        // aggregate is only sound when it references none of the
        // aggregate's own output fields, so this rule never fires on
        // the plans the converter emits today and is kept for that
        // future shape.
        if let LogicalPlan::Filter {
            input,
            predicate,
            estimated_cardinality,
        } = plan
        {
            if let LogicalPlan::Aggregate { input: agg_input, specs, .. } = input.as_ref() {
                let references_agg_output = specs.keys().any(|name| predicate.references(name));
                if !references_agg_output {
                    return Some(LogicalPlan::Aggregate {
                        input: Box::new(LogicalPlan::Filter {
                            input: agg_input.clone(),
                            predicate: predicate.clone(),
                            estimated_cardinality: *estimated_cardinality,
                        }),
                        specs: specs.clone(),
                        estimated_cardinality: *estimated_cardinality,
                    });
                }
            }
        }
        None
    }
}

pub struct RedundantFilterElimination;
impl Rule for RedundantFilterElimination {
    fn name(&self) -> &'static str {
        "RedundantFilterElimination"
    }
    fn priority(&self) -> i32 {
        70
    }
    fn apply(&self, plan: &LogicalPlan) -> Option<LogicalPlan> {
        if let LogicalPlan::Filter {
            input, predicate, ..
        } = plan
        {
            if matches!(predicate, Expr::MatchAll) {
                return Some((**input).clone());
            }
        }
        None
    }
}

pub struct ProjectionMerging;
impl Rule for ProjectionMerging {
    fn name(&self) -> &'static str {
        "ProjectionMerging"
    }
    fn priority(&self) -> i32 {
        60
    }
    fn apply(&self, plan: &LogicalPlan) -> Option<LogicalPlan> {
        if let LogicalPlan::Project { input, fields } = plan {
            if let LogicalPlan::Project {
                input: inner_input,
                fields: inner_fields,
            } = input.as_ref()
            {
                // The outer projection's field list is the effective
                // one; the inner projection would only have narrowed
                // an already-narrower or equal set upstream of it, so
                // folding to the outer list alone preserves semantics
                // whenever outer_fields is a subset of inner_fields.
                if fields.iter().all(|f| inner_fields.contains(f)) {
                    return Some(LogicalPlan::Project {
                        input: inner_input.clone(),
                        fields: fields.clone(),
                    });
                }
            }
        }
        None
    }
}

/// Default rule set, highest priority first.
pub fn default_rules() -> Vec<Box<dyn Rule>> {
    let mut rules: Vec<Box<dyn Rule>> = vec![
        Box::new(FilterPushdown),
        Box::new(TopNOptimization),
        Box::new(PredicatePushdownThroughAggregate),
        Box::new(RedundantFilterElimination),
        Box::new(ProjectionMerging),
    ];
    rules.sort_by_key(|r| -r.priority());
    rules
}

/// Runs `rules` against `plan` until a pass makes no further change or
/// `MAX_PASSES` is reached. Returns the rewritten plan and the number
/// of passes actually performed (useful for a `tracing` span field at
/// the call site).
pub fn optimize(plan: LogicalPlan, rules: &[Box<dyn Rule>]) -> (LogicalPlan, usize) {
    let mut current = plan;
    for pass in 1..=MAX_PASSES {
        let (next, changed) = rewrite_once(&current, rules);
        current = next;
        if !changed {
            return (current, pass);
        }
    }
    (current, MAX_PASSES)
}

fn rewrite_once(plan: &LogicalPlan, rules: &[Box<dyn Rule>]) -> (LogicalPlan, bool) {
    // Bottom-up: rewrite children first, then try every rule at this
    // node against the (possibly already rewritten) result.
    let (rewritten_children, mut changed) = rewrite_children(plan, rules);
    let mut node = rewritten_children;
    for rule in rules {
        if let Some(replacement) = rule.apply(&node) {
            node = replacement;
            changed = true;
        }
    }
    (node, changed)
}

fn rewrite_children(plan: &LogicalPlan, rules: &[Box<dyn Rule>]) -> (LogicalPlan, bool) {
    match plan {
        LogicalPlan::Scan { .. } => (plan.clone(), false),
        LogicalPlan::Filter {
            input,
            predicate,
            estimated_cardinality,
        } => {
            let (new_input, changed) = rewrite_once(input, rules);
            (
                LogicalPlan::Filter {
                    input: Box::new(new_input),
                    predicate: predicate.clone(),
                    estimated_cardinality: *estimated_cardinality,
                },
                changed,
            )
        }
        LogicalPlan::Project { input, fields } => {
            let (new_input, changed) = rewrite_once(input, rules);
            (
                LogicalPlan::Project {
                    input: Box::new(new_input),
                    fields: fields.clone(),
                },
                changed,
            )
        }
        LogicalPlan::Aggregate {
            input,
            specs,
            estimated_cardinality,
        } => {
            let (new_input, changed) = rewrite_once(input, rules);
            (
                LogicalPlan::Aggregate {
                    input: Box::new(new_input),
                    specs: specs.clone(),
                    estimated_cardinality: *estimated_cardinality,
                },
                changed,
            )
        }
        LogicalPlan::Sort { input, fields } => {
            let (new_input, changed) = rewrite_once(input, rules);
            (
                LogicalPlan::Sort {
                    input: Box::new(new_input),
                    fields: fields.clone(),
                },
                changed,
            )
        }
        LogicalPlan::Limit { input, from, size } => {
            let (new_input, changed) = rewrite_once(input, rules);
            (
                LogicalPlan::Limit {
                    input: Box::new(new_input),
                    from: *from,
                    size: *size,
                },
                changed,
            )
        }
        LogicalPlan::TopN {
            input,
            fields,
            from,
            size,
        } => {
            let (new_input, changed) = rewrite_once(input, rules);
            (
                LogicalPlan::TopN {
                    input: Box::new(new_input),
                    fields: fields.clone(),
                    from: *from,
                    size: *size,
                },
                changed,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::logical::BASE_CARDINALITY;

    fn scan() -> LogicalPlan {
        LogicalPlan::Scan {
            index: "logs".into(),
            shard_ids: vec![0],
            filter_expr: None,
            estimated_cardinality: BASE_CARDINALITY,
        }
    }

    #[test]
    fn filter_pushdown_folds_into_scan() {
        let plan = LogicalPlan::Filter {
            input: Box::new(scan()),
            predicate: Expr::Term {
                field: "a".into(),
                value: "b".into(),
            },
            estimated_cardinality: 1000.0,
        };
        let (optimized, passes) = optimize(plan, &default_rules());
        assert!(passes >= 1);
        match optimized {
            LogicalPlan::Scan { filter_expr, .. } => assert!(filter_expr.is_some()),
            other => panic!("expected folded Scan, got {:?}", other.kind()),
        }
    }

    #[test]
    fn topn_optimization_collapses_sort_and_limit() {
        let plan = LogicalPlan::Limit {
            input: Box::new(LogicalPlan::Sort {
                input: Box::new(scan()),
                fields: vec![crate::ast::SortField {
                    field: "ts".into(),
                    desc: true,
                }],
            }),
            from: 0,
            size: 10,
        };
        let (optimized, _) = optimize(plan, &default_rules());
        assert!(matches!(optimized, LogicalPlan::TopN { .. }));
    }

    #[test]
    fn redundant_match_all_filter_is_eliminated() {
        let plan = LogicalPlan::Filter {
            input: Box::new(scan()),
            predicate: Expr::MatchAll,
            estimated_cardinality: BASE_CARDINALITY,
        };
        let (optimized, _) = optimize(plan, &default_rules());
        assert!(matches!(optimized, LogicalPlan::Scan { .. }));
    }

    #[test]
    fn optimizer_reaches_fixpoint_before_max_passes() {
        let plan = scan();
        let (_, passes) = optimize(plan, &default_rules());
        assert!(passes < MAX_PASSES);
    }

    #[test]
    fn optimizing_an_already_optimal_plan_is_a_noop() {
        let plan = LogicalPlan::Limit {
            input: Box::new(scan()),
            from: 0,
            size: 10,
        };
        let (optimized, passes) = optimize(plan.clone(), &default_rules());
        assert_eq!(optimized, plan);
        assert_eq!(passes, 1);
    }
}
