//! # ClusterDirectory Client (C11)
//!
//! Abstracts "where does this index live" behind a trait so the
//! dispatcher and router never talk to the directory service directly.
//! [`StaticClusterDirectory`] is the test double used throughout the
//! unit/integration suites; [`RemoteClusterDirectory`] is the real HTTP
//! client used in production, caching the topology behind an
//! [`arc_swap::ArcSwap`] so readers never block on a refresh in flight.

use crate::error::{Error, Result};
use crate::schema::{ClusterMetadata, IndexMetadata};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Read-only view of cluster topology. Implementations decide how
/// fresh the data is; callers just need to know which shards an index
/// has and whether they're dispatchable right now.
#[async_trait]
pub trait ClusterDirectory: Send + Sync {
    async fn index_metadata(&self, index: &str) -> Result<IndexMetadata>;
    async fn refresh(&self) -> Result<()>;
}

/// Fixed, in-memory directory. Used in tests and for single-node /
/// fixed-topology deployments where there is no external directory
/// service to poll.
pub struct StaticClusterDirectory {
    metadata: ClusterMetadata,
}

impl StaticClusterDirectory {
    pub fn new(metadata: ClusterMetadata) -> Self {
        StaticClusterDirectory { metadata }
    }
}

#[async_trait]
impl ClusterDirectory for StaticClusterDirectory {
    async fn index_metadata(&self, index: &str) -> Result<IndexMetadata> {
        self.metadata
            .indices
            .get(index)
            .cloned()
            .ok_or_else(|| Error::IndexNotFound {
                index: index.to_string(),
            })
    }

    async fn refresh(&self) -> Result<()> {
        Ok(())
    }
}

/// HTTP-backed directory client. Polls `endpoint` for the full cluster
/// topology and caches it; `index_metadata` always answers from the
/// cached snapshot so a slow or failing directory poll never blocks a
/// search request.
pub struct RemoteClusterDirectory {
    endpoint: String,
    client: reqwest::Client,
    cached: ArcSwap<ClusterMetadata>,
    retry_count: u32,
    retry_backoff: Duration,
}

impl RemoteClusterDirectory {
    pub fn new(endpoint: impl Into<String>, retry_count: u32, retry_backoff: Duration) -> Self {
        RemoteClusterDirectory {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
            cached: ArcSwap::from_pointee(ClusterMetadata::default()),
            retry_count,
            retry_backoff,
        }
    }

    async fn fetch(&self) -> Result<ClusterMetadata> {
        let url = format!("{}/cluster/metadata", self.endpoint.trim_end_matches('/'));
        let mut last_err = None;
        for attempt in 0..=self.retry_count {
            if attempt > 0 {
                tokio::time::sleep(self.retry_backoff * attempt).await;
            }
            match self.client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    return resp
                        .json::<ClusterMetadata>()
                        .await
                        .map_err(|e| Error::UpstreamError {
                            reason: format!("malformed cluster metadata: {e}"),
                        });
                }
                Ok(resp) => {
                    last_err = Some(format!("directory returned status {}", resp.status()));
                }
                Err(e) => {
                    last_err = Some(e.to_string());
                }
            }
        }
        Err(Error::UpstreamError {
            reason: last_err.unwrap_or_else(|| "directory unreachable".to_string()),
        })
    }
}

#[async_trait]
impl ClusterDirectory for RemoteClusterDirectory {
    async fn index_metadata(&self, index: &str) -> Result<IndexMetadata> {
        self.cached
            .load()
            .indices
            .get(index)
            .cloned()
            .ok_or_else(|| Error::IndexNotFound {
                index: index.to_string(),
            })
    }

    async fn refresh(&self) -> Result<()> {
        let fresh = self.fetch().await?;
        self.cached.store(Arc::new(fresh));
        Ok(())
    }
}
