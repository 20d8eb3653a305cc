//! Builder Patterns for Query AST Construction
//!
//! Provides fluent APIs for constructing `Query` trees, particularly
//! useful for tests that need to assemble deeply nested `bool` queries
//! without hand-writing every `Vec` literal.
//!
//! ## Example
//!
//! ```rust
//! use quidditch_coordinator::ast::builders::{BoolQueryBuilder, RequestBuilder};
//! use quidditch_coordinator::ast::Query;
//!
//! // Build: status = "active" AND (title ~ "rust" OR title ~ "systems")
//! let query = BoolQueryBuilder::new()
//!     .filter(Query::Term { field: "status".into(), value: "active".into() })
//!     .should(Query::Match { field: "title".into(), text: "rust".into() })
//!     .should(Query::Match { field: "title".into(), text: "systems".into() })
//!     .build();
//!
//! // Build a full request around it.
//! let request = RequestBuilder::new(query).size(25).from(0).build();
//! ```

use super::{AggSpec, MinimumShouldMatch, Query, SearchRequest, SortField, SourceFilter};
use std::collections::BTreeMap;

/// Builder for `Query::Bool` clauses.
#[derive(Debug, Clone, Default)]
pub struct BoolQueryBuilder {
    must: Vec<Query>,
    should: Vec<Query>,
    must_not: Vec<Query>,
    filter: Vec<Query>,
    minimum_should_match: Option<usize>,
}

impl BoolQueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn must(mut self, q: Query) -> Self {
        self.must.push(q);
        self
    }

    pub fn should(mut self, q: Query) -> Self {
        self.should.push(q);
        self
    }

    pub fn must_not(mut self, q: Query) -> Self {
        self.must_not.push(q);
        self
    }

    pub fn filter(mut self, q: Query) -> Self {
        self.filter.push(q);
        self
    }

    pub fn minimum_should_match(mut self, n: usize) -> Self {
        self.minimum_should_match = Some(n);
        self
    }

    pub fn build(self) -> Query {
        Query::Bool {
            minimum_should_match: self
                .minimum_should_match
                .map(MinimumShouldMatch::AtLeast)
                .unwrap_or_default(),
            must: self.must,
            should: self.should,
            must_not: self.must_not,
            filter: self.filter,
        }
    }
}

/// Builder for a `Range` query.
#[derive(Debug, Clone)]
pub struct RangeQueryBuilder {
    field: String,
    bounds: super::RangeBounds,
}

impl RangeQueryBuilder {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            bounds: super::RangeBounds::default(),
        }
    }

    pub fn gte(mut self, v: f64) -> Self {
        self.bounds.gte = Some(super::Bound::Num(v));
        self
    }

    pub fn gt(mut self, v: f64) -> Self {
        self.bounds.gt = Some(super::Bound::Num(v));
        self
    }

    pub fn lte(mut self, v: f64) -> Self {
        self.bounds.lte = Some(super::Bound::Num(v));
        self
    }

    pub fn lt(mut self, v: f64) -> Self {
        self.bounds.lt = Some(super::Bound::Num(v));
        self
    }

    pub fn build(self) -> Query {
        Query::Range {
            field: self.field,
            bounds: self.bounds,
        }
    }
}

/// Builder for a complete `SearchRequest`.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    query: Query,
    aggs: BTreeMap<String, AggSpec>,
    source: SourceFilter,
    sort: Vec<SortField>,
    from: usize,
    size: usize,
}

impl RequestBuilder {
    pub fn new(query: Query) -> Self {
        Self {
            query,
            aggs: BTreeMap::new(),
            source: SourceFilter::default(),
            sort: Vec::new(),
            from: 0,
            size: 10,
        }
    }

    pub fn agg(mut self, name: impl Into<String>, spec: AggSpec) -> Self {
        self.aggs.insert(name.into(), spec);
        self
    }

    pub fn source(mut self, source: SourceFilter) -> Self {
        self.source = source;
        self
    }

    pub fn sort(mut self, field: impl Into<String>, desc: bool) -> Self {
        self.sort.push(SortField {
            field: field.into(),
            desc,
        });
        self
    }

    pub fn from(mut self, from: usize) -> Self {
        self.from = from;
        self
    }

    pub fn size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn build(self) -> SearchRequest {
        SearchRequest {
            query: self.query,
            aggs: self.aggs,
            source: self.source,
            sort: self.sort,
            from: self.from,
            size: self.size,
        }
    }
}
