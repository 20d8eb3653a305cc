//! # Cost Model & Physical Planner (C4)
//!
//! Attaches a [`Cost`] to every candidate physical operator and picks
//! concrete strategies the optimized [`LogicalPlan`] leaves open —
//! chiefly hash- vs. sort-based aggregation, and Sort+Limit vs. TopN.

use crate::ast::AggSpec;
use crate::plan::expr::Expr;
use crate::plan::logical::{Cardinality, LogicalPlan};

/// Weighted resource cost of a (sub)plan. `total` is the weighted sum
/// used to compare alternative physical strategies; the components are
/// kept around for `tracing`/diagnostics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cost {
    pub cpu: f64,
    pub io: f64,
    pub net: f64,
    pub mem: f64,
}

/// Cost-component weights (§4.4): I/O and network dominate, memory is
/// a light tiebreaker.
const CPU_WEIGHT: f64 = 1.0;
const IO_WEIGHT: f64 = 5.0;
const NET_WEIGHT: f64 = 10.0;
const MEM_WEIGHT: f64 = 2.0;

/// Cardinality above which hash aggregation beats a sort-based group-by
/// (§4.4): a hash table pays a fixed per-row cost regardless of group
/// count, while a sort-based approach pays O(n log n) that only wins
/// when n is small enough for the log factor not to matter.
const HASH_AGGREGATE_THRESHOLD: Cardinality = 1000.0;

/// TopN's combined sort+truncate always beats separate Sort+Limit
/// operators by this constant factor (§4.4) since it avoids
/// materializing the full sorted set before truncating.
const TOPN_ADVANTAGE_FACTOR: f64 = 0.7;

impl Cost {
    pub fn zero() -> Self {
        Cost {
            cpu: 0.0,
            io: 0.0,
            net: 0.0,
            mem: 0.0,
        }
    }

    pub fn total(&self) -> f64 {
        self.cpu * CPU_WEIGHT + self.io * IO_WEIGHT + self.net * NET_WEIGHT + self.mem * MEM_WEIGHT
    }

    fn add(self, other: Cost) -> Cost {
        Cost {
            cpu: self.cpu + other.cpu,
            io: self.io + other.io,
            net: self.net + other.net,
            mem: self.mem + other.mem,
        }
    }

    /// Scales every component by `factor` — used by `Limit`, whose cost
    /// is its child's entire cost vector scaled by `size / n` (§4.4)
    /// rather than an additive local cost.
    fn scale(self, factor: f64) -> Cost {
        Cost {
            cpu: self.cpu * factor,
            io: self.io * factor,
            net: self.net * factor,
            mem: self.mem * factor,
        }
    }
}

/// Per-row CPU coefficient shared by every operator's base formula
/// (§4.4).
const BASE_CPU_COEFFICIENT: f64 = 0.0001;

/// CPU cost of evaluating a pushed-down filter expression over `n` rows
/// (§4.4). Term/Match-shaped leaves cost the base coefficient; Range
/// costs 2x that; Wildcard/Prefix cost 5x; `Bool` sums its children;
/// `MatchAll` is free.
fn filter_cpu(expr: &Expr, n: f64) -> f64 {
    match expr {
        Expr::MatchAll => 0.0,
        Expr::Range { .. } => 2.0 * BASE_CPU_COEFFICIENT * n,
        Expr::Wildcard { .. } | Expr::Prefix { .. } => 5.0 * BASE_CPU_COEFFICIENT * n,
        Expr::Bool { children, .. } => children.iter().map(|c| filter_cpu(c, n)).sum(),
        Expr::Not(inner) => filter_cpu(inner, n),
        Expr::Term { .. }
        | Expr::Terms { .. }
        | Expr::Match { .. }
        | Expr::MatchPhrase { .. }
        | Expr::Exists { .. } => BASE_CPU_COEFFICIENT * n,
    }
}

/// Number of bucketing ("group by") aggregation specs vs. scalar metric
/// specs in one `Aggregate` node, for the `0.002·n·|gb| + 0.005·n·|aggs|`
/// term of §4.4's Aggregate cost formula.
fn agg_shape_counts(specs: &std::collections::BTreeMap<String, AggSpec>) -> (f64, f64) {
    let gb = specs
        .values()
        .filter(|s| matches!(s, AggSpec::Terms { .. } | AggSpec::Histogram { .. } | AggSpec::DateHistogram { .. }))
        .count() as f64;
    let metrics = specs.len() as f64 - gb;
    (gb, metrics)
}

/// Physical operator tree. Mirrors [`LogicalPlan`]'s shape but with
/// aggregation strategy resolved and each node carrying its own cost.
#[derive(Debug, Clone, PartialEq)]
pub enum PhysicalPlan {
    Scan {
        index: String,
        shard_ids: Vec<u32>,
        filter_expr: Option<crate::plan::expr::Expr>,
        cost: CostValue,
    },
    Filter {
        input: Box<PhysicalPlan>,
        predicate: crate::plan::expr::Expr,
        cost: CostValue,
    },
    Project {
        input: Box<PhysicalPlan>,
        fields: Vec<String>,
        cost: CostValue,
    },
    HashAggregate {
        input: Box<PhysicalPlan>,
        specs: std::collections::BTreeMap<String, crate::ast::AggSpec>,
        cost: CostValue,
    },
    SortedAggregate {
        input: Box<PhysicalPlan>,
        specs: std::collections::BTreeMap<String, crate::ast::AggSpec>,
        cost: CostValue,
    },
    Sort {
        input: Box<PhysicalPlan>,
        fields: Vec<crate::ast::SortField>,
        cost: CostValue,
    },
    Limit {
        input: Box<PhysicalPlan>,
        from: usize,
        size: usize,
        cost: CostValue,
    },
    TopN {
        input: Box<PhysicalPlan>,
        fields: Vec<crate::ast::SortField>,
        from: usize,
        size: usize,
        cost: CostValue,
    },
}

/// `Cost` wrapper carried inline on each node. A thin newtype (rather
/// than bare `Cost`) so `PartialEq` on `PhysicalPlan` compares costs by
/// value without requiring callers to special-case float comparison
/// anywhere else.
#[derive(Debug, Clone, Copy)]
pub struct CostValue(pub Cost);

impl PartialEq for CostValue {
    fn eq(&self, other: &Self) -> bool {
        (self.0.total() - other.0.total()).abs() < f64::EPSILON
    }
}

impl PhysicalPlan {
    pub fn cost(&self) -> Cost {
        match self {
            PhysicalPlan::Scan { cost, .. }
            | PhysicalPlan::Filter { cost, .. }
            | PhysicalPlan::Project { cost, .. }
            | PhysicalPlan::HashAggregate { cost, .. }
            | PhysicalPlan::SortedAggregate { cost, .. }
            | PhysicalPlan::Sort { cost, .. }
            | PhysicalPlan::Limit { cost, .. }
            | PhysicalPlan::TopN { cost, .. } => cost.0,
        }
    }
}

/// Shared by `Sort` and `TopN` (§4.4: `TopN`'s cost is a 0.7 discount on
/// what `Sort`'s own cost would be over the same input and keys).
fn sort_cost(child_cost: Cost, n: Cardinality, sort_key_count: usize) -> Cost {
    let n = n.max(1.0);
    let keys = sort_key_count.max(1) as f64;
    Cost {
        cpu: child_cost.cpu + n * n.log2() * BASE_CPU_COEFFICIENT * keys,
        mem: child_cost.mem + 0.001 * n,
        ..child_cost
    }
}

/// Converts an optimized logical plan into a costed physical plan,
/// choosing among the strategies the logical layer leaves open.
pub struct PhysicalPlanner;

impl PhysicalPlanner {
    pub fn new() -> Self {
        PhysicalPlanner
    }

    pub fn build(&self, plan: &LogicalPlan) -> PhysicalPlan {
        match plan {
            LogicalPlan::Scan {
                index,
                shard_ids,
                filter_expr,
                estimated_cardinality,
            } => {
                let n = *estimated_cardinality;
                let num_shards = shard_ids.len().max(1) as f64;
                let cond_cpu = filter_expr.as_ref().map_or(0.0, |e| filter_cpu(e, n));
                let cost = Cost {
                    cpu: BASE_CPU_COEFFICIENT * n + cond_cpu,
                    io: 0.001 * n,
                    net: 1.0 * num_shards,
                    mem: BASE_CPU_COEFFICIENT * n,
                };
                PhysicalPlan::Scan {
                    index: index.clone(),
                    shard_ids: shard_ids.clone(),
                    filter_expr: filter_expr.clone(),
                    cost: CostValue(cost),
                }
            }
            LogicalPlan::Filter { input, predicate, .. } => {
                let child = self.build(input);
                let n_in = input.estimated_cardinality();
                let cost = Cost {
                    cpu: child.cost().cpu + filter_cpu(predicate, n_in),
                    ..child.cost()
                };
                PhysicalPlan::Filter {
                    input: Box::new(child),
                    predicate: predicate.clone(),
                    cost: CostValue(cost),
                }
            }
            LogicalPlan::Project { input, fields } => {
                let child = self.build(input);
                let n = input.estimated_cardinality();
                let f = fields.len().max(1) as f64;
                let cost = Cost {
                    cpu: child.cost().cpu + BASE_CPU_COEFFICIENT * n * f,
                    mem: 0.8 * child.cost().mem,
                    ..child.cost()
                };
                PhysicalPlan::Project {
                    input: Box::new(child),
                    fields: fields.clone(),
                    cost: CostValue(cost),
                }
            }
            LogicalPlan::Aggregate {
                input,
                specs,
                estimated_cardinality,
            } => {
                let child = self.build(input);
                let n = input.estimated_cardinality();
                let n_out = *estimated_cardinality;
                let (gb, metrics) = agg_shape_counts(specs);
                let cost = Cost {
                    cpu: child.cost().cpu + 0.002 * n * gb + 0.005 * n * metrics,
                    mem: child.cost().mem + 0.001 * n_out,
                    ..child.cost()
                };
                if n > HASH_AGGREGATE_THRESHOLD {
                    PhysicalPlan::HashAggregate {
                        input: Box::new(child),
                        specs: specs.clone(),
                        cost: CostValue(cost),
                    }
                } else {
                    PhysicalPlan::SortedAggregate {
                        input: Box::new(child),
                        specs: specs.clone(),
                        cost: CostValue(cost),
                    }
                }
            }
            LogicalPlan::Sort { input, fields } => {
                let child = self.build(input);
                let cost = sort_cost(child.cost(), input.estimated_cardinality(), fields.len());
                PhysicalPlan::Sort {
                    input: Box::new(child),
                    fields: fields.clone(),
                    cost: CostValue(cost),
                }
            }
            LogicalPlan::Limit { input, from, size } => {
                let child = self.build(input);
                let n = input.estimated_cardinality().max(1.0);
                let l = *size as f64;
                let cost = child.cost().scale(l / n);
                PhysicalPlan::Limit {
                    input: Box::new(child),
                    from: *from,
                    size: *size,
                    cost: CostValue(cost),
                }
            }
            LogicalPlan::TopN {
                input,
                fields,
                from,
                size,
            } => {
                let child = self.build(input);
                let sort_cost = sort_cost(child.cost(), input.estimated_cardinality(), fields.len());
                let cost = Cost {
                    cpu: TOPN_ADVANTAGE_FACTOR * sort_cost.cpu,
                    ..sort_cost
                };
                PhysicalPlan::TopN {
                    input: Box::new(child),
                    fields: fields.clone(),
                    from: *from,
                    size: *size,
                    cost: CostValue(cost),
                }
            }
        }
    }
}

impl Default for PhysicalPlanner {
    fn default() -> Self {
        Self::new()
    }
}
