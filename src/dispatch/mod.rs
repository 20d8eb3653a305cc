//! # Shard Dispatcher (C6)
//!
//! Fans a single shard-request shape out to every shard an index owns,
//! merges the partial results back together, and contains per-shard
//! failures so one bad node degrades a response instead of failing it
//! outright (§4.6, §5 graceful degradation).

use crate::ast::{AggSpec, SortField};
use crate::error::{Error, Result};
use crate::execution::executor::{AggregationResult, ExecutionResult};
use crate::execution::timeout::QueryTimeout;
use crate::plan::expr::Expr;
use crate::schema::{IndexMetadata, ShardState};
use crate::value::{Hit, Row};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// What the coordinator asks a single shard to do. Mirrors the fields
/// a `PhysicalPlan::Scan` and its ancestors carry, flattened into one
/// request since a shard only ever sees its own local slice of the
/// plan.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ShardSearchRequest {
    pub index: String,
    pub filter_expr: Option<Expr>,
    pub aggs: BTreeMap<String, AggSpec>,
    pub sort: Vec<SortField>,
    pub from: usize,
    pub size: usize,
}

/// What a single shard returns for one [`ShardSearchRequest`].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ShardSearchResponse {
    pub hits: Vec<Hit>,
    pub total_hits: u64,
    pub aggregations: BTreeMap<String, AggregationResult>,
}

/// Acknowledgement a shard returns for a successful write (§6:
/// `IndexDocument`/`DeleteDocument` both reply `{version, shards_acked}`).
/// `version` is the document's new version number after the write;
/// `shards_acked` is how many replicas of that shard confirmed it
/// before the primary answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WriteAck {
    pub version: u64,
    pub shards_acked: u32,
}

/// Transport abstraction for talking to one shard's node. Swappable so
/// tests can run the dispatcher's merge logic without a network.
#[async_trait]
pub trait ShardClient: Send + Sync {
    async fn search(
        &self,
        node_address: &str,
        shard_id: u32,
        request: &ShardSearchRequest,
    ) -> Result<ShardSearchResponse>;

    /// Point read for the `_doc` GET endpoint. `None` means the shard
    /// has no document with that id, not an error.
    async fn get_document(
        &self,
        node_address: &str,
        index: &str,
        shard_id: u32,
        doc_id: &str,
    ) -> Result<Option<Row>>;

    /// Upsert for the `_doc` PUT endpoint and for `_bulk` index
    /// actions.
    async fn index_document(
        &self,
        node_address: &str,
        index: &str,
        shard_id: u32,
        doc_id: &str,
        source: &Row,
    ) -> Result<WriteAck>;

    /// `None` means the document did not exist; `Some` carries the
    /// version/ack counts of the (now completed) delete.
    async fn delete_document(
        &self,
        node_address: &str,
        index: &str,
        shard_id: u32,
        doc_id: &str,
    ) -> Result<Option<WriteAck>>;
}

/// Real shard client over HTTP.
pub struct HttpShardClient {
    client: reqwest::Client,
    request_timeout: std::time::Duration,
}

impl HttpShardClient {
    pub fn new(request_timeout: std::time::Duration) -> Self {
        HttpShardClient {
            client: reqwest::Client::new(),
            request_timeout,
        }
    }
}

#[async_trait]
impl ShardClient for HttpShardClient {
    async fn search(
        &self,
        node_address: &str,
        shard_id: u32,
        request: &ShardSearchRequest,
    ) -> Result<ShardSearchResponse> {
        let url = format!(
            "http://{}/_shard/{}/{}/_search",
            node_address.trim_end_matches('/'),
            request.index,
            shard_id
        );
        let resp = self
            .client
            .post(&url)
            .json(request)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::UpstreamTimeout {
                        elapsed_ms: self.request_timeout.as_millis() as u64,
                    }
                } else {
                    Error::NodeUnavailable {
                        index: request.index.clone(),
                        shard_id,
                    }
                }
            })?;
        if !resp.status().is_success() {
            return Err(Error::UpstreamError {
                reason: format!("shard {shard_id} returned status {}", resp.status()),
            });
        }
        resp.json::<ShardSearchResponse>()
            .await
            .map_err(|e| Error::UpstreamError { reason: e.to_string() })
    }

    async fn get_document(
        &self,
        node_address: &str,
        index: &str,
        shard_id: u32,
        doc_id: &str,
    ) -> Result<Option<Row>> {
        let url = format!(
            "http://{}/_shard/{}/{}/_doc/{}",
            node_address.trim_end_matches('/'),
            index,
            shard_id,
            doc_id
        );
        let resp = self
            .client
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|_| Error::NodeUnavailable { index: index.to_string(), shard_id })?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(Error::UpstreamError {
                reason: format!("shard {shard_id} returned status {}", resp.status()),
            });
        }
        resp.json::<Row>()
            .await
            .map(Some)
            .map_err(|e| Error::UpstreamError { reason: e.to_string() })
    }

    async fn index_document(
        &self,
        node_address: &str,
        index: &str,
        shard_id: u32,
        doc_id: &str,
        source: &Row,
    ) -> Result<WriteAck> {
        let url = format!(
            "http://{}/_shard/{}/{}/_doc/{}",
            node_address.trim_end_matches('/'),
            index,
            shard_id,
            doc_id
        );
        let resp = self
            .client
            .put(&url)
            .json(source)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|_| Error::NodeUnavailable { index: index.to_string(), shard_id })?;
        if !resp.status().is_success() {
            return Err(Error::UpstreamError {
                reason: format!("shard {shard_id} returned status {}", resp.status()),
            });
        }
        resp.json::<WriteAck>()
            .await
            .map_err(|e| Error::UpstreamError { reason: e.to_string() })
    }

    async fn delete_document(
        &self,
        node_address: &str,
        index: &str,
        shard_id: u32,
        doc_id: &str,
    ) -> Result<Option<WriteAck>> {
        let url = format!(
            "http://{}/_shard/{}/{}/_doc/{}",
            node_address.trim_end_matches('/'),
            index,
            shard_id,
            doc_id
        );
        let resp = self
            .client
            .delete(&url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|_| Error::NodeUnavailable { index: index.to_string(), shard_id })?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(Error::UpstreamError {
                reason: format!("shard {shard_id} returned status {}", resp.status()),
            });
        }
        resp.json::<WriteAck>()
            .await
            .map(Some)
            .map_err(|e| Error::UpstreamError { reason: e.to_string() })
    }
}

/// Fixed-response test double: one shard always answers the same way
/// (or always fails), independent of what was asked. Document writes
/// are tracked in an in-memory map so `index`/`get`/`delete` round-trip
/// within a test instead of needing per-call canned responses.
pub struct MockShardClient {
    responses: std::collections::HashMap<u32, Result<ShardSearchResponse>>,
    documents: parking_lot::Mutex<std::collections::HashMap<(u32, String), (Row, u64)>>,
}

impl MockShardClient {
    pub fn new() -> Self {
        MockShardClient {
            responses: std::collections::HashMap::new(),
            documents: parking_lot::Mutex::new(std::collections::HashMap::new()),
        }
    }

    pub fn with_response(mut self, shard_id: u32, response: ShardSearchResponse) -> Self {
        self.responses.insert(shard_id, Ok(response));
        self
    }

    pub fn with_failure(mut self, shard_id: u32, error: Error) -> Self {
        self.responses.insert(shard_id, Err(error));
        self
    }
}

impl Default for MockShardClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ShardClient for MockShardClient {
    async fn search(
        &self,
        _node_address: &str,
        shard_id: u32,
        _request: &ShardSearchRequest,
    ) -> Result<ShardSearchResponse> {
        match self.responses.get(&shard_id) {
            Some(Ok(resp)) => Ok(resp.clone()),
            Some(Err(e)) => Err(e.clone()),
            None => Err(Error::ShardUnavailable {
                index: String::new(),
                shard_id,
                state: "no response configured".to_string(),
            }),
        }
    }

    async fn get_document(
        &self,
        _node_address: &str,
        _index: &str,
        shard_id: u32,
        doc_id: &str,
    ) -> Result<Option<Row>> {
        Ok(self
            .documents
            .lock()
            .get(&(shard_id, doc_id.to_string()))
            .map(|(row, _version)| row.clone()))
    }

    async fn index_document(
        &self,
        _node_address: &str,
        _index: &str,
        shard_id: u32,
        doc_id: &str,
        source: &Row,
    ) -> Result<WriteAck> {
        let mut documents = self.documents.lock();
        let key = (shard_id, doc_id.to_string());
        let version = documents.get(&key).map_or(1, |(_, v)| v + 1);
        documents.insert(key, (source.clone(), version));
        Ok(WriteAck { version, shards_acked: 1 })
    }

    async fn delete_document(
        &self,
        _node_address: &str,
        _index: &str,
        shard_id: u32,
        doc_id: &str,
    ) -> Result<Option<WriteAck>> {
        let removed = self.documents.lock().remove(&(shard_id, doc_id.to_string()));
        Ok(removed.map(|(_, version)| WriteAck { version, shards_acked: 1 }))
    }
}

/// Scatters requests across an index's shards and merges the results.
pub struct ShardDispatcher {
    client: Arc<dyn ShardClient>,
}

impl ShardDispatcher {
    pub fn new(client: Arc<dyn ShardClient>) -> Self {
        ShardDispatcher { client }
    }

    pub async fn scatter(
        &self,
        index_meta: &IndexMetadata,
        shard_ids: &[u32],
        request: ShardSearchRequest,
        timeout: &QueryTimeout,
    ) -> Result<ExecutionResult> {
        timeout.check().map_err(|e| Error::UpstreamTimeout {
            elapsed_ms: e.elapsed.as_millis() as u64,
        })?;

        let futures: Vec<_> = shard_ids
            .iter()
            .filter_map(|shard_id| {
                let routing = index_meta.shards.get(shard_id)?;
                Some((*shard_id, routing))
            })
            .map(|(shard_id, routing)| {
                let client = Arc::clone(&self.client);
                let request = request.clone();
                let node_address = routing.node_address.clone();
                let unavailable = routing.state != ShardState::Active;
                let index = index_meta.index.clone();
                async move {
                    if unavailable {
                        return (
                            shard_id,
                            Err(Error::ShardUnavailable {
                                index,
                                shard_id,
                                state: "not active".to_string(),
                            }),
                        );
                    }
                    (shard_id, client.search(&node_address, shard_id, &request).await)
                }
            })
            .collect();

        let results = futures_util::future::join_all(futures).await;

        let shards_total = shard_ids.len() as u32;
        let mut shards_successful = 0u32;
        let mut shards_failed = 0u32;
        let mut hits = Vec::new();
        let mut total_hits: u64 = 0;
        let mut partial_aggs: Vec<BTreeMap<String, AggregationResult>> = Vec::new();

        for (_shard_id, result) in results {
            match result {
                Ok(resp) => {
                    shards_successful += 1;
                    total_hits += resp.total_hits;
                    hits.extend(resp.hits);
                    partial_aggs.push(resp.aggregations);
                }
                Err(_) => shards_failed += 1,
            }
        }

        if shards_successful == 0 && shards_total > 0 {
            return Err(Error::ShardUnavailable {
                index: index_meta.index.clone(),
                shard_id: shard_ids.first().copied().unwrap_or(0),
                state: "all shards unavailable".to_string(),
            });
        }

        let aggregations = merge_aggregations(partial_aggs, &request.aggs);

        Ok(ExecutionResult {
            hits,
            total_hits,
            max_score: None,
            aggregations,
            shards_total,
            shards_successful,
            shards_failed,
            took_ms: 0,
        })
    }
}

/// Merges per-shard partial aggregation results for every agg name
/// present in at least one shard's response. `terms`/`histogram`
/// buckets sum doc counts by key; scalar metrics recombine exactly
/// except `cardinality`, which (like `percentiles`) is an
/// approximation averaged across shards rather than a true global
/// distinct count.
pub fn merge_aggregations(
    partials: Vec<BTreeMap<String, AggregationResult>>,
    specs: &BTreeMap<String, AggSpec>,
) -> BTreeMap<String, AggregationResult> {
    let mut merged: BTreeMap<String, AggregationResult> = BTreeMap::new();
    for partial in partials {
        for (name, result) in partial {
            merged
                .entry(name)
                .and_modify(|existing| *existing = merge_one(existing.clone(), result.clone()))
                .or_insert(result);
        }
    }
    // `terms` is the only agg kind whose spec carries a requested
    // bucket count (§4.2); histogram/date_histogram buckets are kept
    // in full, matching the shard's own interval-derived bucketing.
    for (name, result) in merged.iter_mut() {
        if let (AggregationResult::Buckets(buckets), Some(AggSpec::Terms { size, .. })) =
            (result, specs.get(name))
        {
            buckets.truncate(*size);
        }
    }
    merged
}

pub fn merge_one(a: AggregationResult, b: AggregationResult) -> AggregationResult {
    match (a, b) {
        (AggregationResult::Buckets(mut a_buckets), AggregationResult::Buckets(b_buckets)) => {
            for bucket in b_buckets {
                if let Some(existing) = a_buckets
                    .iter_mut()
                    .find(|existing| existing.key == bucket.key)
                {
                    existing.doc_count += bucket.doc_count;
                } else {
                    a_buckets.push(bucket);
                }
            }
            a_buckets.sort_by(|x, y| {
                y.doc_count.cmp(&x.doc_count).then_with(|| x.key.cmp_total(&y.key))
            });
            AggregationResult::Buckets(a_buckets)
        }
        (AggregationResult::Stats(a), AggregationResult::Stats(b)) => {
            AggregationResult::Stats(a.merge(b))
        }
        (AggregationResult::Metric(a), AggregationResult::Metric(b)) => {
            AggregationResult::Metric(a + b)
        }
        (AggregationResult::Percentiles(a), AggregationResult::Percentiles(b)) => {
            let mut out = BTreeMap::new();
            for key in a.keys().chain(b.keys()).collect::<std::collections::BTreeSet<_>>() {
                let av = a.get(key);
                let bv = b.get(key);
                let merged = match (av, bv) {
                    (Some(x), Some(y)) => (x + y) / 2.0,
                    (Some(x), None) => *x,
                    (None, Some(y)) => *y,
                    (None, None) => 0.0,
                };
                out.insert(key.clone(), merged);
            }
            AggregationResult::Percentiles(out)
        }
        (a, _) => a,
    }
}
