//! # Query DSL AST
//!
//! Abstract syntax tree for the nested-JSON query DSL (§3). `Query` is a
//! sum type over every leaf and compound query kind; `SearchRequest` is
//! what `QueryParser::parse` hands to the logical planner together with
//! the target index and shard list.
//!
//! ## Builders
//!
//! For programmatic construction in tests, see the [`builders`] module,
//! which mirrors the fluent style the rest of this corpus uses for AST
//! construction, adapted to the DSL's nested-object shape.

pub mod builders;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default `from + size` ceiling (§3 invariants).
pub const MAX_WINDOW: usize = 10_000;

/// A single bound on a `Range` query. Numeric bounds compare
/// numerically; non-numeric bounds (e.g. ISO date strings) are passed
/// through opaquely and compared lexicographically by the shard engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Bound {
    Num(f64),
    Text(String),
}

/// Range bounds: at least one of the four should be present for a
/// meaningful query, but the parser does not enforce that — an empty
/// range is a legal (if useless) `Range` query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeBounds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gt: Option<Bound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gte: Option<Bound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lt: Option<Bound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lte: Option<Bound>,
}

/// Minimum-should-match clause count for `Bool`. `AtLeast(n)` is the
/// general form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MinimumShouldMatch {
    AtLeast(usize),
}

impl Default for MinimumShouldMatch {
    fn default() -> Self {
        MinimumShouldMatch::AtLeast(0)
    }
}

/// The query AST (§3). Every leaf query except `MatchAll`/`QueryString`
/// carries a non-empty `field` — the parser enforces this at
/// construction (see `parser::validate`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Query {
    MatchAll,
    Term {
        field: String,
        value: String,
    },
    Terms {
        field: String,
        values: Vec<String>,
    },
    Match {
        field: String,
        text: String,
    },
    MatchPhrase {
        field: String,
        text: String,
    },
    MultiMatch {
        fields: Vec<String>,
        text: String,
    },
    Range {
        field: String,
        bounds: RangeBounds,
    },
    Prefix {
        field: String,
        value: String,
    },
    Wildcard {
        field: String,
        value: String,
    },
    Fuzzy {
        field: String,
        value: String,
        fuzziness: Option<u32>,
    },
    Regexp {
        field: String,
        value: String,
    },
    Exists {
        field: String,
    },
    QueryString {
        text: String,
        default_field: Option<String>,
        fields: Option<Vec<String>>,
    },
    Bool {
        must: Vec<Query>,
        should: Vec<Query>,
        must_not: Vec<Query>,
        filter: Vec<Query>,
        minimum_should_match: MinimumShouldMatch,
    },
}

impl Query {
    /// The field(s) this leaf operates on. Compound/fieldless kinds
    /// return an empty vec — callers branch on `kind()` before relying
    /// on this for leaf-specific logic.
    pub fn operand_fields(&self) -> Vec<&str> {
        match self {
            Query::MatchAll | Query::QueryString { .. } | Query::Bool { .. } => Vec::new(),
            Query::Term { field, .. }
            | Query::Terms { field, .. }
            | Query::Match { field, .. }
            | Query::MatchPhrase { field, .. }
            | Query::Range { field, .. }
            | Query::Prefix { field, .. }
            | Query::Wildcard { field, .. }
            | Query::Fuzzy { field, .. }
            | Query::Regexp { field, .. }
            | Query::Exists { field } => vec![field.as_str()],
            Query::MultiMatch { fields, .. } => fields.iter().map(String::as_str).collect(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Query::MatchAll => "match_all",
            Query::Term { .. } => "term",
            Query::Terms { .. } => "terms",
            Query::Match { .. } => "match",
            Query::MatchPhrase { .. } => "match_phrase",
            Query::MultiMatch { .. } => "multi_match",
            Query::Range { .. } => "range",
            Query::Prefix { .. } => "prefix",
            Query::Wildcard { .. } => "wildcard",
            Query::Fuzzy { .. } => "fuzzy",
            Query::Regexp { .. } => "regexp",
            Query::Exists { .. } => "exists",
            Query::QueryString { .. } => "query_string",
            Query::Bool { .. } => "bool",
        }
    }
}

/// Aggregation request kinds (§4.2). Only the parameters the converter's
/// selectivity/cardinality model and the merge logic (§4.6) need are
/// kept typed; everything else rides along opaquely in the wire payload
/// so unrecognized-but-harmless keys don't fail parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AggSpec {
    Terms {
        field: String,
        #[serde(default = "default_terms_size")]
        size: usize,
    },
    Histogram {
        field: String,
        interval: f64,
    },
    DateHistogram {
        field: String,
        interval: String,
    },
    Stats {
        field: String,
    },
    ExtendedStats {
        field: String,
    },
    Sum {
        field: String,
    },
    Avg {
        field: String,
    },
    Min {
        field: String,
    },
    Max {
        field: String,
    },
    Count {
        field: String,
    },
    Cardinality {
        field: String,
    },
    Percentiles {
        field: String,
        #[serde(default = "default_percents")]
        percents: Vec<f64>,
    },
}

fn default_terms_size() -> usize {
    10
}

fn default_percents() -> Vec<f64> {
    vec![50.0, 95.0, 99.0]
}

impl AggSpec {
    pub fn field(&self) -> &str {
        match self {
            AggSpec::Terms { field, .. }
            | AggSpec::Histogram { field, .. }
            | AggSpec::DateHistogram { field, .. }
            | AggSpec::Stats { field }
            | AggSpec::ExtendedStats { field }
            | AggSpec::Sum { field }
            | AggSpec::Avg { field }
            | AggSpec::Min { field }
            | AggSpec::Max { field }
            | AggSpec::Count { field }
            | AggSpec::Cardinality { field }
            | AggSpec::Percentiles { field, .. } => field,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AggSpec::Terms { .. } => "terms",
            AggSpec::Histogram { .. } => "histogram",
            AggSpec::DateHistogram { .. } => "date_histogram",
            AggSpec::Stats { .. } => "stats",
            AggSpec::ExtendedStats { .. } => "extended_stats",
            AggSpec::Sum { .. } => "sum",
            AggSpec::Avg { .. } => "avg",
            AggSpec::Min { .. } => "min",
            AggSpec::Max { .. } => "max",
            AggSpec::Count { .. } => "count",
            AggSpec::Cardinality { .. } => "cardinality",
            AggSpec::Percentiles { .. } => "percentiles",
        }
    }
}

/// Source-field projection: omit entirely, include all, or a restricted
/// field list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceFilter {
    Bool(bool),
    Fields(Vec<String>),
}

impl Default for SourceFilter {
    fn default() -> Self {
        SourceFilter::Bool(true)
    }
}

/// One entry in the `sort` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortField {
    pub field: String,
    #[serde(default)]
    pub desc: bool,
}

/// The fully parsed and validated request (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: Query,
    #[serde(default)]
    pub aggs: BTreeMap<String, AggSpec>,
    #[serde(default)]
    pub source: SourceFilter,
    #[serde(default)]
    pub sort: Vec<SortField>,
    #[serde(default)]
    pub from: usize,
    #[serde(default = "default_size")]
    pub size: usize,
}

fn default_size() -> usize {
    10
}

impl SearchRequest {
    /// The legal-shorthand empty request: `MatchAll`, `size=10`, `from=0`.
    pub fn match_all_default() -> Self {
        SearchRequest {
            query: Query::MatchAll,
            aggs: BTreeMap::new(),
            source: SourceFilter::default(),
            sort: Vec::new(),
            from: 0,
            size: 10,
        }
    }

    /// `from + size`, the window this request reads into the result set.
    pub fn window_end(&self) -> usize {
        self.from.saturating_add(self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operand_fields_for_leaf_kinds() {
        let q = Query::Term {
            field: "status".into(),
            value: "active".into(),
        };
        assert_eq!(q.operand_fields(), vec!["status"]);
    }

    #[test]
    fn multi_match_exposes_all_fields() {
        let q = Query::MultiMatch {
            fields: vec!["title".into(), "body".into()],
            text: "rust".into(),
        };
        assert_eq!(q.operand_fields(), vec!["title", "body"]);
    }

    #[test]
    fn match_all_has_no_operand_fields() {
        assert!(Query::MatchAll.operand_fields().is_empty());
    }

    #[test]
    fn default_request_is_match_all_size_ten() {
        let r = SearchRequest::match_all_default();
        assert_eq!(r.query, Query::MatchAll);
        assert_eq!(r.size, 10);
        assert_eq!(r.from, 0);
    }

    #[test]
    fn window_end_is_from_plus_size() {
        let mut r = SearchRequest::match_all_default();
        r.from = 20;
        r.size = 30;
        assert_eq!(r.window_end(), 50);
    }

    #[test]
    fn query_serializes_with_tagged_variant() {
        let q = Query::Term {
            field: "status".into(),
            value: "ok".into(),
        };
        let json = serde_json::to_value(&q).unwrap();
        assert!(json.get("Term").is_some());
    }
}
