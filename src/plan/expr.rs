//! # Filter Expression Tree
//!
//! The wire-level representation of a predicate sent to a shard as part
//! of `PhysicalScan`/`PhysicalFilter` (§6). Unlike [`crate::ast::Query`],
//! which models the full DSL including aggregation-affecting shape,
//! `Expr` only needs enough structure to be serialized, pushed down
//! through `Bool` nodes, and evaluated client-side when a filter cannot
//! be pushed to the shard.

use crate::ast::{Bound, Query, RangeBounds};
use serde::{Deserialize, Serialize};

/// Boolean combinator for compound expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoolOp {
    And,
    Or,
}

/// A filter expression. Mirrors the leaf shapes of [`Query`] but drops
/// aggregation/sort/window concerns — this tree is purely "does this
/// document match."
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    MatchAll,
    Term { field: String, value: String },
    Terms { field: String, values: Vec<String> },
    Match { field: String, text: String },
    MatchPhrase { field: String, text: String },
    Range { field: String, bounds: RangeBounds },
    Prefix { field: String, value: String },
    Wildcard { field: String, value: String },
    Exists { field: String },
    Not(Box<Expr>),
    Bool { op: BoolOp, children: Vec<Expr> },
}

/// The current wire format version (§9 design notes). Bumped whenever a
/// variant is added or removed so a shard can reject an expression it
/// does not understand instead of silently misinterpreting it.
pub const WIRE_FORMAT_VERSION: u8 = 1;

impl Expr {
    /// Lower a [`Query`] into a filter expression. `MultiMatch`,
    /// `Fuzzy`, `Regexp` and `QueryString` have no direct `Expr`
    /// equivalent pushed to shards in this design; they lower to the
    /// nearest approximation (`Match`/`Wildcard`) so the shard still
    /// narrows candidates, with final relevance scoring left to the
    /// shard-local engine regardless.
    pub fn from_query(query: &Query) -> Expr {
        match query {
            Query::MatchAll | Query::QueryString { .. } => Expr::MatchAll,
            Query::Term { field, value } => Expr::Term {
                field: field.clone(),
                value: value.clone(),
            },
            Query::Terms { field, values } => Expr::Terms {
                field: field.clone(),
                values: values.clone(),
            },
            Query::Match { field, text } => Expr::Match {
                field: field.clone(),
                text: text.clone(),
            },
            Query::MatchPhrase { field, text } => Expr::MatchPhrase {
                field: field.clone(),
                text: text.clone(),
            },
            Query::MultiMatch { fields, text } => Expr::Bool {
                op: BoolOp::Or,
                children: fields
                    .iter()
                    .map(|f| Expr::Match {
                        field: f.clone(),
                        text: text.clone(),
                    })
                    .collect(),
            },
            Query::Range { field, bounds } => Expr::Range {
                field: field.clone(),
                bounds: bounds.clone(),
            },
            Query::Prefix { field, value } => Expr::Prefix {
                field: field.clone(),
                value: value.clone(),
            },
            Query::Wildcard { field, value } => Expr::Wildcard {
                field: field.clone(),
                value: value.clone(),
            },
            Query::Fuzzy { field, value, .. } => Expr::Term {
                field: field.clone(),
                value: value.clone(),
            },
            Query::Regexp { field, value } => Expr::Wildcard {
                field: field.clone(),
                value: value.clone(),
            },
            Query::Exists { field } => Expr::Exists {
                field: field.clone(),
            },
            Query::Bool {
                must,
                should,
                must_not,
                filter,
                ..
            } => {
                let mut and_children: Vec<Expr> = must
                    .iter()
                    .chain(filter)
                    .map(Expr::from_query)
                    .collect();
                if !should.is_empty() {
                    and_children.push(Expr::Bool {
                        op: BoolOp::Or,
                        children: should.iter().map(Expr::from_query).collect(),
                    });
                }
                for mn in must_not {
                    and_children.push(Expr::Not(Box::new(Expr::from_query(mn))));
                }
                match and_children.len() {
                    0 => Expr::MatchAll,
                    1 => and_children.into_iter().next().expect("checked len == 1"),
                    _ => Expr::Bool {
                        op: BoolOp::And,
                        children: and_children,
                    },
                }
            }
        }
    }

    /// Encode with a 1-byte format version prefix followed by the
    /// bincode payload, so a receiver that only understands an older
    /// version can reject the request cleanly instead of misreading it.
    pub fn to_wire(&self) -> Result<Vec<u8>, bincode::Error> {
        let payload = bincode::serialize(self)?;
        let mut out = Vec::with_capacity(payload.len() + 1);
        out.push(WIRE_FORMAT_VERSION);
        out.extend_from_slice(&payload);
        Ok(out)
    }

    pub fn from_wire(bytes: &[u8]) -> Result<Expr, String> {
        let (version, payload) = bytes
            .split_first()
            .ok_or_else(|| "empty expression payload".to_string())?;
        if *version != WIRE_FORMAT_VERSION {
            return Err(format!(
                "unsupported expression wire format version {version}, expected {WIRE_FORMAT_VERSION}"
            ));
        }
        bincode::deserialize(payload).map_err(|e| e.to_string())
    }

    /// Client-side evaluation of this predicate against a single row.
    /// Used when a predicate could only be approximated on the shard
    /// (e.g. `MultiMatch` lowered to a `Bool`-or of `Match`) and the
    /// coordinator must re-check candidates before returning them. This
    /// narrows the returned `hits` but deliberately does not adjust
    /// `total_hits`, which reports the shard's own (approximate) count.
    pub fn matches(&self, row: &crate::value::Row) -> bool {
        match self {
            Expr::MatchAll => true,
            Expr::Term { field, value } => row
                .get(field)
                .is_some_and(|v| value_to_text(v) == *value),
            Expr::Terms { field, values } => row
                .get(field)
                .is_some_and(|v| values.contains(&value_to_text(v))),
            Expr::Match { field, text } | Expr::MatchPhrase { field, text } => row
                .get(field)
                .is_some_and(|v| value_to_text(v).to_lowercase().contains(&text.to_lowercase())),
            Expr::Range { field, bounds } => row
                .get(field)
                .and_then(crate::value::Value::as_number)
                .is_some_and(|n| bound_satisfied(bounds, n)),
            Expr::Prefix { field, value } => row
                .get(field)
                .is_some_and(|v| value_to_text(v).starts_with(value.as_str())),
            Expr::Wildcard { field, value } => row.get(field).is_some_and(|v| {
                wildcard_to_regex(value)
                    .map(|re| re.is_match(&value_to_text(v)))
                    .unwrap_or(false)
            }),
            Expr::Exists { field } => row.get(field).is_some_and(|v| !matches!(v, crate::value::Value::Null)),
            Expr::Not(inner) => !inner.matches(row),
            Expr::Bool { op, children } => match op {
                BoolOp::And => children.iter().all(|c| c.matches(row)),
                BoolOp::Or => children.iter().any(|c| c.matches(row)),
            },
        }
    }

    /// Whether this node references `field` anywhere in its subtree.
    pub fn references(&self, field: &str) -> bool {
        match self {
            Expr::MatchAll => false,
            Expr::Term { field: f, .. }
            | Expr::Terms { field: f, .. }
            | Expr::Match { field: f, .. }
            | Expr::MatchPhrase { field: f, .. }
            | Expr::Range { field: f, .. }
            | Expr::Prefix { field: f, .. }
            | Expr::Wildcard { field: f, .. }
            | Expr::Exists { field: f } => f == field,
            Expr::Not(inner) => inner.references(field),
            Expr::Bool { children, .. } => children.iter().any(|c| c.references(field)),
        }
    }
}

/// Does `bound` admit `value`? Used by `PhysicalFilter` when a shard
/// cannot evaluate a pushed-down range itself (client-side evaluation
/// fallback, §4.5).
pub fn bound_satisfied(bounds: &RangeBounds, value: f64) -> bool {
    let gt_ok = bounds.gt.as_ref().map_or(true, |b| bound_lt(b, value));
    let gte_ok = bounds.gte.as_ref().map_or(true, |b| bound_le(b, value));
    let lt_ok = bounds.lt.as_ref().map_or(true, |b| value < bound_num(b));
    let lte_ok = bounds.lte.as_ref().map_or(true, |b| value <= bound_num(b));
    gt_ok && gte_ok && lt_ok && lte_ok
}

fn bound_num(bound: &Bound) -> f64 {
    match bound {
        Bound::Num(n) => *n,
        Bound::Text(_) => f64::NAN,
    }
}

fn bound_lt(bound: &Bound, value: f64) -> bool {
    value > bound_num(bound)
}

fn bound_le(bound: &Bound, value: f64) -> bool {
    value >= bound_num(bound)
}

fn value_to_text(value: &crate::value::Value) -> String {
    match value {
        crate::value::Value::Str(s) => s.clone(),
        other => other
            .to_json()
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| other.to_json().to_string()),
    }
}

fn wildcard_to_regex(pattern: &str) -> Option<regex::Regex> {
    let mut escaped = String::with_capacity(pattern.len() + 2);
    escaped.push('^');
    for c in pattern.chars() {
        match c {
            '*' => escaped.push_str(".*"),
            '?' => escaped.push('.'),
            _ => escaped.push_str(&regex::escape(&c.to_string())),
        }
    }
    escaped.push('$');
    regex::Regex::new(&escaped).ok()
}
