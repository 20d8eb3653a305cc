//! # Query Planning (C2–C4)
//!
//! The planning pipeline: [`converter`] lowers a parsed request into a
//! [`logical::LogicalPlan`], [`optimizer`] rewrites it to a fixed point,
//! and [`physical`] attaches costs and resolves the remaining strategy
//! choices into a [`physical::PhysicalPlan`] ready for [`crate::dispatch`].

pub mod converter;
pub mod expr;
pub mod logical;
pub mod optimizer;
pub mod physical;

use crate::ast::SearchRequest;

/// Runs the full C2->C3->C4 pipeline for a single `(index, shard_ids)`
/// target and returns the costed physical plan plus the pass count the
/// optimizer took to converge (surfaced as a `tracing` field by the
/// caller).
pub fn plan(
    request: &SearchRequest,
    index: &str,
    shard_ids: Vec<u32>,
) -> (physical::PhysicalPlan, usize) {
    let logical = converter::LogicalPlanner::new(index, shard_ids).build(request);
    let (optimized, passes) = optimizer::optimize(logical, &optimizer::default_rules());
    let physical = physical::PhysicalPlanner::new().build(&optimized);
    (physical, passes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::SearchRequest;

    #[test]
    fn end_to_end_plan_for_match_all() {
        let request = SearchRequest::match_all_default();
        let (physical, passes) = plan(&request, "logs", vec![0, 1, 2]);
        assert!(passes >= 1);
        assert!(physical.cost().total() > 0.0);
    }
}
