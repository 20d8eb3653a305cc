//! Testable property #3: optimizing an already-optimized plan is a
//! no-op. `LogicalPlan` derives `PartialEq`, so `optimize`'s output can
//! be compared for exact structural equality rather than through a
//! stringified proxy.

use proptest::prelude::*;
use quidditch_coordinator::ast::builders::RequestBuilder;
use quidditch_coordinator::ast::Query;
use quidditch_coordinator::plan::converter::LogicalPlanner;
use quidditch_coordinator::plan::optimizer::{default_rules, optimize};

fn plan_for(
    field: &str,
    value: &str,
    with_range: bool,
    with_sort: bool,
    desc: bool,
    size: usize,
    from: usize,
) -> quidditch_coordinator::plan::logical::LogicalPlan {
    let mut bool_query = quidditch_coordinator::ast::builders::BoolQueryBuilder::new().filter(Query::Term {
        field: field.to_string(),
        value: value.to_string(),
    });
    if with_range {
        bool_query = bool_query.must(Query::Range {
            field: field.to_string(),
            bounds: quidditch_coordinator::ast::RangeBounds {
                gt: Some(quidditch_coordinator::ast::Bound::Num(1.0)),
                ..Default::default()
            },
        });
    }
    let mut builder = RequestBuilder::new(bool_query.build()).size(size).from(from);
    if with_sort {
        builder = builder.sort(field, desc);
    }
    let request = builder.build();
    LogicalPlanner::new("logs", vec![0, 1, 2]).build(&request)
}

proptest! {
    #[test]
    fn optimizing_twice_matches_optimizing_once(
        field in "[a-z]{1,6}",
        value in "[a-z]{1,6}",
        with_range in any::<bool>(),
        with_sort in any::<bool>(),
        desc in any::<bool>(),
        size in 1usize..200,
        from in 0usize..50,
    ) {
        let plan = plan_for(&field, &value, with_range, with_sort, desc, size, from);
        let rules = default_rules();
        let (once, _) = optimize(plan.clone(), &rules);
        let (twice, _) = optimize(once.clone(), &rules);
        prop_assert_eq!(once, twice);
    }
}

#[test]
fn match_all_plan_is_already_a_fixed_point() {
    let plan = LogicalPlanner::new("logs", vec![0]).build(
        &quidditch_coordinator::ast::SearchRequest::match_all_default(),
    );
    let rules = default_rules();
    let (once, _) = optimize(plan, &rules);
    let (twice, _) = optimize(once.clone(), &rules);
    assert_eq!(once, twice);
}

#[test]
fn sort_bearing_plan_fuses_to_topn_and_stays_fused() {
    let request = RequestBuilder::new(Query::MatchAll).sort("ts", true).size(5).build();
    let plan = LogicalPlanner::new("logs", vec![0]).build(&request);
    let rules = default_rules();
    let (once, _) = optimize(plan, &rules);
    assert!(matches!(
        once,
        quidditch_coordinator::plan::logical::LogicalPlan::TopN { .. }
    ));
    let (twice, _) = optimize(once.clone(), &rules);
    assert_eq!(once, twice);
}
