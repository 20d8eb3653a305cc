//! # Query Parser (C1)
//!
//! Parses the nested-JSON query DSL into a [`SearchRequest`], then
//! validates the resulting AST against the structural invariants of §3
//! (non-empty fields, `from + size` window ceiling, clause order
//! preservation). Parsing and validation are kept as two passes so that
//! a caller can distinguish a malformed body (`Error::Parse`) from a
//! well-formed but illegal one (`Error::Validation`) per §4.1/§7.

use crate::ast::{AggSpec, Bound, MinimumShouldMatch, Query, RangeBounds, SearchRequest, MAX_WINDOW};
use crate::error::{Error, Result};
use serde_json::Value as JsonValue;

/// Parse a raw request body into a [`SearchRequest`].
///
/// An empty object (`{}`) or a body with no `query` key is the
/// documented shorthand for `match_all` (§3).
pub fn parse(body: &[u8]) -> Result<SearchRequest> {
    let json: JsonValue = serde_json::from_slice(body)
        .map_err(|e| Error::parse(format!("invalid JSON body: {e}")))?;
    let obj = json
        .as_object()
        .ok_or_else(|| Error::parse("request body must be a JSON object"))?;

    let query = match obj.get("query") {
        Some(q) => parse_query(q)?,
        None => Query::MatchAll,
    };

    let mut aggs = std::collections::BTreeMap::new();
    if let Some(JsonValue::Object(agg_obj)) = obj.get("aggs").or_else(|| obj.get("aggregations")) {
        for (name, spec) in agg_obj {
            aggs.insert(name.clone(), parse_agg(spec)?);
        }
    }

    let source = match obj.get("_source") {
        None => crate::ast::SourceFilter::Bool(true),
        Some(JsonValue::Bool(b)) => crate::ast::SourceFilter::Bool(*b),
        Some(JsonValue::Array(fields)) => crate::ast::SourceFilter::Fields(
            fields
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(String::from)
                        .ok_or_else(|| Error::parse("_source field entries must be strings"))
                })
                .collect::<Result<Vec<_>>>()?,
        ),
        Some(_) => return Err(Error::parse("_source must be a bool or array of field names")),
    };

    let sort = match obj.get("sort") {
        None => Vec::new(),
        Some(JsonValue::Array(entries)) => entries
            .iter()
            .map(parse_sort_entry)
            .collect::<Result<Vec<_>>>()?,
        Some(_) => return Err(Error::parse("sort must be an array")),
    };

    let from = obj
        .get("from")
        .map(|v| {
            v.as_u64()
                .ok_or_else(|| Error::parse("from must be a non-negative integer"))
        })
        .transpose()?
        .unwrap_or(0) as usize;

    let size = obj
        .get("size")
        .map(|v| {
            v.as_u64()
                .ok_or_else(|| Error::parse("size must be a non-negative integer"))
        })
        .transpose()?
        .unwrap_or(10) as usize;

    let request = SearchRequest {
        query,
        aggs,
        source,
        sort,
        from,
        size,
    };
    validate(&request)?;
    Ok(request)
}

/// Structural validation beyond what parsing already enforces: the
/// `from + size` window ceiling and non-empty operand fields.
pub fn validate(request: &SearchRequest) -> Result<()> {
    if request.window_end() > MAX_WINDOW {
        return Err(Error::validation_field(
            format!(
                "from + size ({}) exceeds the maximum window of {}",
                request.window_end(),
                MAX_WINDOW
            ),
            "from",
        ));
    }
    validate_query(&request.query)
}

fn validate_query(query: &Query) -> Result<()> {
    match query {
        Query::MatchAll | Query::QueryString { .. } => Ok(()),
        Query::Bool {
            must,
            should,
            must_not,
            filter,
            ..
        } => {
            for clause in must.iter().chain(should).chain(must_not).chain(filter) {
                validate_query(clause)?;
            }
            Ok(())
        }
        other => {
            for field in other.operand_fields() {
                if field.is_empty() {
                    return Err(Error::validation_field(
                        format!("{} query requires a non-empty field", other.kind()),
                        "field",
                    ));
                }
            }
            Ok(())
        }
    }
}

fn parse_query(value: &JsonValue) -> Result<Query> {
    let obj = value
        .as_object()
        .ok_or_else(|| Error::parse("query must be a JSON object"))?;
    if obj.len() != 1 {
        return Err(Error::parse(
            "query object must have exactly one key naming its kind",
        ));
    }
    let (kind, body) = obj.iter().next().expect("checked len == 1 above");

    match kind.as_str() {
        "match_all" => Ok(Query::MatchAll),
        "term" => {
            let (field, value) = single_field_value(body)?;
            Ok(Query::Term { field, value })
        }
        "terms" => {
            let field_obj = body
                .as_object()
                .ok_or_else(|| Error::parse("terms query body must be an object"))?;
            let (field, values_json) = field_obj
                .iter()
                .next()
                .ok_or_else(|| Error::validation_field("terms query requires a field", "field"))?;
            let values = values_json
                .as_array()
                .ok_or_else(|| Error::parse("terms query value must be an array"))?
                .iter()
                .map(json_to_string)
                .collect::<Result<Vec<_>>>()?;
            Ok(Query::Terms {
                field: field.clone(),
                values,
            })
        }
        "match" => {
            let (field, text) = single_field_value(body)?;
            Ok(Query::Match { field, text })
        }
        "match_phrase" => {
            let (field, text) = single_field_value(body)?;
            Ok(Query::MatchPhrase { field, text })
        }
        "multi_match" => {
            let obj = body
                .as_object()
                .ok_or_else(|| Error::parse("multi_match body must be an object"))?;
            let text = obj
                .get("query")
                .and_then(JsonValue::as_str)
                .ok_or_else(|| Error::parse("multi_match requires a 'query' string"))?
                .to_string();
            let fields = obj
                .get("fields")
                .and_then(JsonValue::as_array)
                .ok_or_else(|| Error::parse("multi_match requires a 'fields' array"))?
                .iter()
                .map(json_to_string)
                .collect::<Result<Vec<_>>>()?;
            Ok(Query::MultiMatch { fields, text })
        }
        "range" => {
            let field_obj = body
                .as_object()
                .ok_or_else(|| Error::parse("range query body must be an object"))?;
            let (field, bounds_json) = field_obj
                .iter()
                .next()
                .ok_or_else(|| Error::validation_field("range query requires a field", "field"))?;
            Ok(Query::Range {
                field: field.clone(),
                bounds: parse_range_bounds(bounds_json)?,
            })
        }
        "prefix" => {
            let (field, value) = single_field_value(body)?;
            Ok(Query::Prefix { field, value })
        }
        "wildcard" => {
            let (field, value) = single_field_value(body)?;
            Ok(Query::Wildcard { field, value })
        }
        "fuzzy" => {
            let field_obj = body
                .as_object()
                .ok_or_else(|| Error::parse("fuzzy query body must be an object"))?;
            let (field, inner) = field_obj
                .iter()
                .next()
                .ok_or_else(|| Error::validation_field("fuzzy query requires a field", "field"))?;
            let (value, fuzziness) = match inner {
                JsonValue::String(s) => (s.clone(), None),
                JsonValue::Object(o) => {
                    let value = o
                        .get("value")
                        .and_then(JsonValue::as_str)
                        .ok_or_else(|| Error::parse("fuzzy query requires a 'value'"))?
                        .to_string();
                    let fuzziness = o.get("fuzziness").and_then(JsonValue::as_u64).map(|v| v as u32);
                    (value, fuzziness)
                }
                _ => return Err(Error::parse("fuzzy query value must be a string or object")),
            };
            Ok(Query::Fuzzy {
                field: field.clone(),
                value,
                fuzziness,
            })
        }
        "regexp" => {
            let (field, value) = single_field_value(body)?;
            Ok(Query::Regexp { field, value })
        }
        "exists" => {
            let obj = body
                .as_object()
                .ok_or_else(|| Error::parse("exists body must be an object"))?;
            let field = obj
                .get("field")
                .and_then(JsonValue::as_str)
                .ok_or_else(|| Error::validation_field("exists requires a 'field' string", "field"))?
                .to_string();
            Ok(Query::Exists { field })
        }
        "query_string" => {
            let obj = body
                .as_object()
                .ok_or_else(|| Error::parse("query_string body must be an object"))?;
            let text = obj
                .get("query")
                .and_then(JsonValue::as_str)
                .ok_or_else(|| Error::validation_field("query_string requires a 'query' string", "query"))?
                .to_string();
            let default_field = obj
                .get("default_field")
                .and_then(JsonValue::as_str)
                .map(String::from);
            let fields = obj.get("fields").and_then(JsonValue::as_array).map(|a| {
                a.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            });
            Ok(Query::QueryString {
                text,
                default_field,
                fields,
            })
        }
        "bool" => {
            let obj = body
                .as_object()
                .ok_or_else(|| Error::parse("bool body must be an object"))?;
            let must = parse_clause_list(obj.get("must"))?;
            let should = parse_clause_list(obj.get("should"))?;
            let must_not = parse_clause_list(obj.get("must_not"))?;
            let filter = parse_clause_list(obj.get("filter"))?;
            let minimum_should_match = match obj.get("minimum_should_match") {
                Some(v) => MinimumShouldMatch::AtLeast(
                    v.as_u64()
                        .ok_or_else(|| Error::parse("minimum_should_match must be an integer"))?
                        as usize,
                ),
                None => MinimumShouldMatch::default(),
            };
            Ok(Query::Bool {
                must,
                should,
                must_not,
                filter,
                minimum_should_match,
            })
        }
        other => Err(Error::validation(format!("unrecognized query kind '{other}'"))),
    }
}

fn parse_clause_list(value: Option<&JsonValue>) -> Result<Vec<Query>> {
    match value {
        None => Ok(Vec::new()),
        Some(JsonValue::Array(items)) => items.iter().map(parse_query).collect(),
        Some(single) => Ok(vec![parse_query(single)?]),
    }
}

fn single_field_value(body: &JsonValue) -> Result<(String, String)> {
    let obj = body
        .as_object()
        .ok_or_else(|| Error::parse("query body must be an object mapping field to value"))?;
    let (field, value) = obj
        .iter()
        .next()
        .ok_or_else(|| Error::validation_field("query body requires exactly one field", "field"))?;
    let value = match value {
        JsonValue::Object(inner) => inner
            .get("value")
            .or_else(|| inner.get("query"))
            .and_then(JsonValue::as_str)
            .ok_or_else(|| Error::parse("expected a 'value' or 'query' string"))?
            .to_string(),
        other => json_to_string(other)?,
    };
    Ok((field.clone(), value))
}

fn json_to_string(value: &JsonValue) -> Result<String> {
    match value {
        JsonValue::String(s) => Ok(s.clone()),
        JsonValue::Number(n) => Ok(n.to_string()),
        JsonValue::Bool(b) => Ok(b.to_string()),
        _ => Err(Error::parse("expected a string, number, or bool")),
    }
}

fn parse_range_bounds(value: &JsonValue) -> Result<RangeBounds> {
    let obj = value
        .as_object()
        .ok_or_else(|| Error::parse("range bounds must be an object"))?;
    let bound = |key: &str| -> Result<Option<Bound>> {
        match obj.get(key) {
            None => Ok(None),
            Some(JsonValue::Number(n)) => Ok(Some(Bound::Num(n.as_f64().unwrap_or(0.0)))),
            Some(JsonValue::String(s)) => Ok(Some(Bound::Text(s.clone()))),
            Some(_) => Err(Error::parse(format!("range bound '{key}' must be a number or string"))),
        }
    };
    Ok(RangeBounds {
        gt: bound("gt")?,
        gte: bound("gte")?,
        lt: bound("lt")?,
        lte: bound("lte")?,
    })
}

fn parse_sort_entry(value: &JsonValue) -> Result<crate::ast::SortField> {
    match value {
        JsonValue::String(field) => Ok(crate::ast::SortField {
            field: field.clone(),
            desc: false,
        }),
        JsonValue::Object(obj) => {
            let (field, order) = obj
                .iter()
                .next()
                .ok_or_else(|| Error::validation_field("sort entry requires a field", "sort"))?;
            let desc = match order {
                JsonValue::String(s) => s.eq_ignore_ascii_case("desc"),
                JsonValue::Object(o) => o
                    .get("order")
                    .and_then(JsonValue::as_str)
                    .map(|s| s.eq_ignore_ascii_case("desc"))
                    .unwrap_or(false),
                _ => false,
            };
            Ok(crate::ast::SortField {
                field: field.clone(),
                desc,
            })
        }
        _ => Err(Error::parse("sort entry must be a string or object")),
    }
}

fn parse_agg(spec: &JsonValue) -> Result<AggSpec> {
    let obj = spec
        .as_object()
        .ok_or_else(|| Error::parse("aggregation spec must be an object"))?;
    if obj.len() != 1 {
        return Err(Error::parse(
            "aggregation spec must have exactly one key naming its kind",
        ));
    }
    let (kind, params) = obj.iter().next().expect("checked len == 1 above");
    let params = params
        .as_object()
        .ok_or_else(|| Error::parse("aggregation params must be an object"))?;
    let field = || -> Result<String> {
        params
            .get("field")
            .and_then(JsonValue::as_str)
            .map(String::from)
            .ok_or_else(|| Error::validation_field("aggregation requires a 'field'", "field"))
    };

    match kind.as_str() {
        "terms" => Ok(AggSpec::Terms {
            field: field()?,
            size: params.get("size").and_then(JsonValue::as_u64).unwrap_or(10) as usize,
        }),
        "histogram" => Ok(AggSpec::Histogram {
            field: field()?,
            interval: params
                .get("interval")
                .and_then(JsonValue::as_f64)
                .ok_or_else(|| Error::parse("histogram requires a numeric 'interval'"))?,
        }),
        "date_histogram" => {
            let interval = params
                .get("calendar_interval")
                .or_else(|| params.get("fixed_interval"))
                .or_else(|| params.get("interval"))
                .and_then(JsonValue::as_str)
                .ok_or_else(|| {
                    Error::parse(
                        "date_histogram requires one of calendar_interval, fixed_interval, interval",
                    )
                })?
                .to_string();
            Ok(AggSpec::DateHistogram {
                field: field()?,
                interval,
            })
        }
        "stats" => Ok(AggSpec::Stats { field: field()? }),
        "extended_stats" => Ok(AggSpec::ExtendedStats { field: field()? }),
        "sum" => Ok(AggSpec::Sum { field: field()? }),
        "avg" => Ok(AggSpec::Avg { field: field()? }),
        "min" => Ok(AggSpec::Min { field: field()? }),
        "max" => Ok(AggSpec::Max { field: field()? }),
        "value_count" | "count" => Ok(AggSpec::Count { field: field()? }),
        "cardinality" => Ok(AggSpec::Cardinality { field: field()? }),
        "percentiles" => {
            let percents = params
                .get("percents")
                .and_then(JsonValue::as_array)
                .map(|a| a.iter().filter_map(JsonValue::as_f64).collect())
                .unwrap_or_else(|| vec![50.0, 95.0, 99.0]);
            Ok(AggSpec::Percentiles {
                field: field()?,
                percents,
            })
        }
        other => Err(Error::validation(format!("unrecognized aggregation kind '{other}'"))),
    }
}
