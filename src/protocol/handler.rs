//! # HTTP Handlers
//!
//! One function per route in the surface table (SPEC_FULL §[NEW] HTTP
//! Surface). Each handler: runs the bound C9 pipeline stage, drives
//! C1->C2->C3->C4->C5 (short-circuiting C2-C4 through the C8 plan
//! cache), dispatches to shards, and maps the conventional search-hit
//! envelope back to JSON. Errors `?`-propagate as `crate::error::Error`,
//! which implements `IntoResponse` via [`super::error`].

use crate::ast::SearchRequest;
use crate::error::{Error, Result};
use crate::execution::{cache_key, ExecutionResult, PhysicalExecutor};
use crate::pipeline::{PipelineValue, StageKind};
use crate::plan::{converter::LogicalPlanner, optimizer, physical::PhysicalPlanner};
use crate::value::{Hit, Row};
use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use super::state::AppState;

#[derive(Debug, Serialize)]
pub struct ShardsEnvelope {
    pub total: u32,
    pub successful: u32,
    pub skipped: u32,
    pub failed: u32,
}

#[derive(Debug, Serialize)]
pub struct HitEnvelope {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_score")]
    pub score: f64,
    #[serde(rename = "_source")]
    pub source: Row,
}

#[derive(Debug, Serialize)]
pub struct TotalEnvelope {
    pub value: u64,
    pub relation: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HitsEnvelope {
    pub total: TotalEnvelope,
    pub max_score: Option<f64>,
    pub hits: Vec<HitEnvelope>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub took: u64,
    pub timed_out: bool,
    #[serde(rename = "_shards")]
    pub shards: ShardsEnvelope,
    pub hits: HitsEnvelope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregations: Option<BTreeMap<String, crate::execution::AggregationResult>>,
}

/// Runs the full C1(already parsed)->C2->C3->C4->C5 pipeline for one
/// `(index, request)`, short-circuiting C2-C4 through the plan cache.
async fn execute(state: &AppState, index: &str, mut request: SearchRequest) -> Result<(ExecutionResult, u64)> {
    if let Some(pipeline) = state.pipelines.pipeline_for(index, StageKind::Query) {
        let (value, _failures) = pipeline.run(PipelineValue::Query(request))?;
        request = match value {
            PipelineValue::Query(r) => r,
            _ => return Err(Error::Internal { reason: "query pipeline returned the wrong value kind".into() }),
        };
    }

    let started = Instant::now();
    let index_meta = state.directory.index_metadata(index).await?;
    let shard_ids = index_meta.shard_ids();
    let key = cache_key(index, &shard_ids, &request);

    let logical = match state.plan_cache.get_logical(&key) {
        Some(plan) => plan,
        None => {
            let built = LogicalPlanner::new(index, shard_ids.clone()).build(&request);
            let (optimized, _passes) = optimizer::optimize(built, &optimizer::default_rules());
            state.plan_cache.put_logical(index, &key, optimized.clone());
            optimized
        }
    };

    let (physical, _passes) = match state.plan_cache.get_physical(&key) {
        Some(entry) => entry,
        None => {
            let built = PhysicalPlanner::new().build(&logical);
            state.plan_cache.put_physical(index, &key, built.clone(), 1);
            (built, 1)
        }
    };

    let timeout = crate::execution::QueryTimeout::new(Some(Duration::from_secs(
        state.config.execution.request_timeout_secs,
    )));

    let executor = PhysicalExecutor::new(&state.dispatcher);
    let mut result = executor.execute(&physical, &index_meta, &timeout).await?;

    if let Some(pipeline) = state.pipelines.pipeline_for(index, StageKind::Result) {
        let (value, _failures) = pipeline.run(PipelineValue::Result(result.hits))?;
        result.hits = match value {
            PipelineValue::Result(hits) => hits,
            _ => return Err(Error::Internal { reason: "result pipeline returned the wrong value kind".into() }),
        };
    }

    state
        .telemetry
        .distributed_search_latency_seconds
        .with_label_values(&[index])
        .observe(started.elapsed().as_secs_f64());
    state
        .telemetry
        .distributed_search_hits_total
        .with_label_values(&[index])
        .observe(result.total_hits as f64);
    state
        .telemetry
        .distributed_search_shards_queried
        .with_label_values(&[index])
        .observe(f64::from(result.shards_total));

    Ok((result, started.elapsed().as_millis() as u64))
}

fn envelope(result: ExecutionResult, took_ms: u64) -> SearchResponse {
    SearchResponse {
        took: took_ms,
        timed_out: false,
        shards: ShardsEnvelope {
            total: result.shards_total,
            successful: result.shards_successful,
            skipped: 0,
            failed: result.shards_failed,
        },
        hits: HitsEnvelope {
            total: TotalEnvelope { value: result.total_hits, relation: "eq" },
            max_score: result.max_score,
            hits: result
                .hits
                .into_iter()
                .map(|h| HitEnvelope { id: h.id, score: h.score, source: h.source })
                .collect(),
        },
        aggregations: if result.aggregations.is_empty() { None } else { Some(result.aggregations) },
    }
}

fn record_route(state: &AppState, route: &str, status: StatusCode, started: Instant) {
    let status_label = status.as_u16().to_string();
    state
        .telemetry
        .requests_total
        .with_label_values(&[route, &status_label])
        .inc();
    state
        .telemetry
        .request_duration_seconds
        .with_label_values(&[route, &status_label])
        .observe(started.elapsed().as_secs_f64());
}

/// `POST|GET /:index/_search`, `/_search` (all indices is not in scope
/// for this coordinator's single-tenant deployment model; `/_search`
/// without an index is rejected the same way a request for an unknown
/// index is, via `ClusterDirectory::index_metadata`).
pub async fn search(
    State(state): State<AppState>,
    index: Option<Path<String>>,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    let started = Instant::now();
    let Some(Path(index)) = index else {
        let err = Error::validation("search requires a target index");
        record_route(&state, "_search", StatusCode::BAD_REQUEST, started);
        return err.into_response();
    };
    match search_one(&state, &index, &body).await {
        Ok(response) => {
            record_route(&state, "_search", StatusCode::OK, started);
            Json(response).into_response()
        }
        Err(e) => {
            let status = super::error::status_code(&e);
            record_route(&state, "_search", status, started);
            e.into_response()
        }
    }
}

async fn search_one(state: &AppState, index: &str, body: &[u8]) -> Result<SearchResponse> {
    let request = crate::parser::parse(body)?;
    let (result, took_ms) = execute(state, index, request).await?;
    Ok(envelope(result, took_ms))
}

/// `POST /_msearch`, `/:index/_msearch`: NDJSON alternating header/body
/// pairs, sequential composition of `_search` (§6).
pub async fn msearch(
    State(state): State<AppState>,
    index: Option<Path<String>>,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    let started = Instant::now();
    let default_index = index.map(|Path(i)| i);
    let lines: Vec<&[u8]> = body.split(|b| *b == b'\n').filter(|l| !l.is_empty()).collect();

    let mut responses = Vec::new();
    let mut iter = lines.into_iter();
    while let Some(header) = iter.next() {
        let Some(body_line) = iter.next() else { break };
        let header_json: serde_json::Value = match serde_json::from_slice(header) {
            Ok(v) => v,
            Err(e) => {
                responses.push(serde_json::json!({ "error": format!("invalid msearch header: {e}") }));
                continue;
            }
        };
        let target_index = header_json
            .get("index")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .or_else(|| default_index.clone());
        let Some(target_index) = target_index else {
            responses.push(serde_json::json!({ "error": "msearch header missing 'index'" }));
            continue;
        };
        match search_one(&state, &target_index, body_line).await {
            Ok(response) => responses.push(serde_json::to_value(response).unwrap_or_default()),
            Err(e) => responses.push(serde_json::json!({ "error": e.to_string() })),
        }
    }

    record_route(&state, "_msearch", StatusCode::OK, started);
    Json(serde_json::json!({ "responses": responses })).into_response()
}

/// `GET|POST /:index/_count`: query path without hit materialization.
pub async fn count(State(state): State<AppState>, Path(index): Path<String>, body: axum::body::Bytes) -> impl IntoResponse {
    let started = Instant::now();
    let outcome = async {
        let mut request = crate::parser::parse(&body)?;
        request.from = 0;
        request.size = 0;
        let (result, _took_ms) = execute(&state, &index, request).await?;
        Ok::<_, Error>(result.total_hits)
    }
    .await;
    match outcome {
        Ok(count) => {
            record_route(&state, "_count", StatusCode::OK, started);
            Json(serde_json::json!({ "count": count })).into_response()
        }
        Err(e) => {
            let status = super::error::status_code(&e);
            record_route(&state, "_count", status, started);
            e.into_response()
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DocResult {
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_version", skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    pub result: &'static str,
    pub status: u16,
}

async fn doc_router(state: &AppState, index: &str) -> Result<(crate::schema::IndexMetadata, crate::router::DocumentRouter)> {
    let index_meta = state.directory.index_metadata(index).await?;
    let router = crate::router::DocumentRouter::new(index_meta.num_shards)?;
    Ok((index_meta, router))
}

fn shard_address(index_meta: &crate::schema::IndexMetadata, shard_id: u32) -> Result<&str> {
    let routing = index_meta
        .shards
        .get(&shard_id)
        .ok_or_else(|| Error::ShardUnavailable { index: index_meta.index.clone(), shard_id, state: "not allocated".into() })?;
    if routing.state != crate::schema::ShardState::Active {
        return Err(Error::ShardUnavailable {
            index: index_meta.index.clone(),
            shard_id,
            state: "not active".into(),
        });
    }
    Ok(routing.node_address.as_str())
}

/// `PUT|POST /:index/_doc/:id`: document write path via C7 and the
/// Document stage of C9, with a caller-supplied id.
pub async fn index_doc(
    State(state): State<AppState>,
    Path((index, doc_id)): Path<(String, String)>,
    Json(source): Json<Row>,
) -> impl IntoResponse {
    index_doc_impl(state, index, Some(doc_id), source).await
}

/// `PUT|POST /:index/_doc`: same write path, auto-generating the id
/// (§6 — equivalent to the create-without-id form of the REST API).
pub async fn index_doc_auto(
    State(state): State<AppState>,
    Path(index): Path<String>,
    Json(source): Json<Row>,
) -> impl IntoResponse {
    index_doc_impl(state, index, None, source).await
}

async fn index_doc_impl(
    state: AppState,
    index: String,
    doc_id: Option<String>,
    mut source: Row,
) -> axum::response::Response {
    let started = Instant::now();
    let doc_id = doc_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let outcome = async {
        if let Some(pipeline) = state.pipelines.pipeline_for(&index, StageKind::Document) {
            let (value, _failures) = pipeline.run(PipelineValue::Document(source))?;
            source = match value {
                PipelineValue::Document(row) => row,
                _ => return Err(Error::Internal { reason: "document pipeline returned the wrong value kind".into() }),
            };
        }
        let (index_meta, router) = doc_router(&state, &index).await?;
        let shard_id = router.route(&doc_id);
        let node_address = shard_address(&index_meta, shard_id)?.to_string();
        let ack = state.client.index_document(&node_address, &index, shard_id, &doc_id, &source).await?;
        Ok::<_, Error>(DocResult {
            index: index.clone(),
            id: doc_id.clone(),
            version: Some(ack.version),
            result: "created",
            status: 201,
        })
    }
    .await;

    match outcome {
        Ok(body) => {
            record_route(&state, "_doc", StatusCode::CREATED, started);
            (StatusCode::CREATED, Json(body)).into_response()
        }
        Err(e) => {
            let status = super::error::status_code(&e);
            record_route(&state, "_doc", status, started);
            e.into_response()
        }
    }
}

/// `GET /:index/_doc/:id`.
pub async fn get_doc(State(state): State<AppState>, Path((index, doc_id)): Path<(String, String)>) -> impl IntoResponse {
    let started = Instant::now();
    let outcome = async {
        let (index_meta, router) = doc_router(&state, &index).await?;
        let shard_id = router.route(&doc_id);
        let node_address = shard_address(&index_meta, shard_id)?.to_string();
        state.client.get_document(&node_address, &index, shard_id, &doc_id).await
    }
    .await;

    match outcome {
        Ok(Some(source)) => {
            record_route(&state, "_doc", StatusCode::OK, started);
            Json(serde_json::json!({ "_index": index, "_id": doc_id, "found": true, "_source": source })).into_response()
        }
        Ok(None) => {
            record_route(&state, "_doc", StatusCode::NOT_FOUND, started);
            (StatusCode::NOT_FOUND, Json(serde_json::json!({ "_index": index, "_id": doc_id, "found": false }))).into_response()
        }
        Err(e) => {
            let status = super::error::status_code(&e);
            record_route(&state, "_doc", status, started);
            e.into_response()
        }
    }
}

/// `DELETE /:index/_doc/:id`.
pub async fn delete_doc(State(state): State<AppState>, Path((index, doc_id)): Path<(String, String)>) -> impl IntoResponse {
    let started = Instant::now();
    let outcome = async {
        let (index_meta, router) = doc_router(&state, &index).await?;
        let shard_id = router.route(&doc_id);
        let node_address = shard_address(&index_meta, shard_id)?.to_string();
        state.client.delete_document(&node_address, &index, shard_id, &doc_id).await
    }
    .await;

    match outcome {
        Ok(Some(ack)) => {
            record_route(&state, "_doc", StatusCode::OK, started);
            Json(DocResult { index, id: doc_id, version: Some(ack.version), result: "deleted", status: 200 }).into_response()
        }
        Ok(None) => {
            record_route(&state, "_doc", StatusCode::NOT_FOUND, started);
            (
                StatusCode::NOT_FOUND,
                Json(DocResult { index, id: doc_id, version: None, result: "not_found", status: 404 }),
            )
                .into_response()
        }
        Err(e) => {
            let status = super::error::status_code(&e);
            record_route(&state, "_doc", status, started);
            e.into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct BulkActionHeader {
    #[serde(alias = "create", alias = "update", alias = "delete")]
    index: Option<BulkActionMeta>,
}

#[derive(Debug, Deserialize)]
struct BulkActionMeta {
    #[serde(rename = "_index")]
    index: Option<String>,
    #[serde(rename = "_id")]
    id: Option<String>,
}

/// `POST /_bulk`, `/:index/_bulk`: alternating action/source NDJSON
/// lines (§6). Per-item errors do not fail the batch.
pub async fn bulk(State(state): State<AppState>, index: Option<Path<String>>, body: axum::body::Bytes) -> impl IntoResponse {
    let started = Instant::now();
    let default_index = index.map(|Path(i)| i);
    let lines: Vec<&[u8]> = body.split(|b| *b == b'\n').filter(|l| !l.is_empty()).collect();

    let mut items = Vec::new();
    let mut errors = false;
    let mut iter = lines.into_iter().peekable();

    while let Some(action_line) = iter.next() {
        let parsed: Result<(String, String, Option<String>)> = (|| {
            let action_json: serde_json::Value = serde_json::from_slice(action_line)
                .map_err(|e| Error::parse(format!("invalid bulk action line: {e}")))?;
            let action_obj = action_json
                .as_object()
                .ok_or_else(|| Error::parse("bulk action line must be a JSON object"))?;
            let (action, meta) = action_obj
                .iter()
                .next()
                .ok_or_else(|| Error::parse("bulk action line requires an action key"))?;
            let meta_obj = meta.as_object();
            let target_index = meta_obj
                .and_then(|m| m.get("_index"))
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
                .or_else(|| default_index.clone())
                .ok_or_else(|| Error::parse("bulk action requires '_index'"))?;
            let doc_id = meta_obj.and_then(|m| m.get("_id")).and_then(serde_json::Value::as_str).map(str::to_string);
            Ok((action.clone(), target_index, doc_id))
        })();

        let (action, target_index, doc_id) = match parsed {
            Ok(v) => v,
            Err(e) => {
                errors = true;
                items.push(serde_json::json!({ "error": { "type": "parse_exception", "reason": e.to_string() } }));
                continue;
            }
        };

        let needs_source = action != "delete";
        let source: Row = if needs_source {
            match iter.next() {
                Some(line) => match serde_json::from_slice(line) {
                    Ok(row) => row,
                    Err(e) => {
                        errors = true;
                        items.push(serde_json::json!({ "error": { "type": "parse_exception", "reason": e.to_string() } }));
                        continue;
                    }
                },
                None => {
                    errors = true;
                    items.push(serde_json::json!({ "error": { "type": "parse_exception", "reason": "missing source line" } }));
                    continue;
                }
            }
        } else {
            Row::new()
        };

        let doc_id = doc_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let outcome = bulk_one(&state, &action, &target_index, &doc_id, source).await;
        match outcome {
            Ok((result, version)) => {
                items.push(serde_json::json!({
                    action: {
                        "_index": target_index,
                        "_id": doc_id,
                        "_version": version,
                        "result": result,
                        "status": status_for_result(result),
                    }
                }));
            }
            Err(e) => {
                errors = true;
                items.push(serde_json::json!({ action: { "_index": target_index, "_id": doc_id, "status": super::error::status_code(&e).as_u16(), "error": e.to_string() } }));
            }
        }
    }

    record_route(&state, "_bulk", StatusCode::OK, started);
    Json(serde_json::json!({ "took": started.elapsed().as_millis() as u64, "errors": errors, "items": items })).into_response()
}

fn status_for_result(result: &'static str) -> u16 {
    match result {
        "created" => 201,
        "not_found" => 404,
        _ => 200,
    }
}

async fn bulk_one(
    state: &AppState,
    action: &str,
    index: &str,
    doc_id: &str,
    mut source: Row,
) -> Result<(&'static str, Option<u64>)> {
    if let Some(pipeline) = state.pipelines.pipeline_for(index, StageKind::Document) {
        if action != "delete" {
            let (value, _failures) = pipeline.run(PipelineValue::Document(source))?;
            source = match value {
                PipelineValue::Document(row) => row,
                _ => return Err(Error::Internal { reason: "document pipeline returned the wrong value kind".into() }),
            };
        }
    }
    let (index_meta, router) = doc_router(state, index).await?;
    let shard_id = router.route(doc_id);
    let node_address = shard_address(&index_meta, shard_id)?.to_string();
    match action {
        "index" | "create" | "update" => {
            let ack = state.client.index_document(&node_address, index, shard_id, doc_id, &source).await?;
            Ok(("created", Some(ack.version)))
        }
        "delete" => match state.client.delete_document(&node_address, index, shard_id, doc_id).await? {
            Some(ack) => Ok(("deleted", Some(ack.version))),
            None => Ok(("not_found", None)),
        },
        other => Err(Error::parse(format!("unrecognized bulk action '{other}'"))),
    }
}

/// `GET /metrics`: Prometheus scrape endpoint.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.telemetry.render()
}

/// `GET /health`: liveness.
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn envelope_reports_max_score_from_hits() {
        let result = ExecutionResult {
            hits: vec![
                Hit { id: "a".into(), score: 1.0, source: Row::new() },
                Hit { id: "b".into(), score: 4.5, source: Row::new() },
            ],
            total_hits: 2,
            max_score: Some(4.5),
            aggregations: BTreeMap::new(),
            shards_total: 2,
            shards_successful: 2,
            shards_failed: 0,
            took_ms: 12,
        };
        let response = envelope(result, 12);
        assert_eq!(response.hits.max_score, Some(4.5));
        assert_eq!(response.hits.total.value, 2);
        assert_eq!(response.shards.total, 2);
    }

    #[test]
    fn envelope_omits_empty_aggregations() {
        let result = ExecutionResult {
            hits: vec![],
            total_hits: 0,
            max_score: None,
            aggregations: BTreeMap::new(),
            shards_total: 1,
            shards_successful: 1,
            shards_failed: 0,
            took_ms: 1,
        };
        let response = envelope(result, 1);
        assert!(response.aggregations.is_none());
    }

    #[test]
    fn envelope_keeps_populated_aggregations() {
        let mut aggs = BTreeMap::new();
        aggs.insert(
            "by_status".to_string(),
            crate::execution::AggregationResult::Metric(3.0),
        );
        let result = ExecutionResult {
            hits: vec![],
            total_hits: 0,
            max_score: None,
            aggregations: aggs,
            shards_total: 1,
            shards_successful: 1,
            shards_failed: 0,
            took_ms: 1,
        };
        let response = envelope(result, 1);
        assert!(response.aggregations.is_some());
    }

    #[test]
    fn status_for_result_maps_create_and_not_found() {
        assert_eq!(status_for_result("created"), 201);
        assert_eq!(status_for_result("not_found"), 404);
        assert_eq!(status_for_result("deleted"), 200);
    }
}
