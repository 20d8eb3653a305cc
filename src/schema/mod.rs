//! # Cluster Metadata (C11 support types)
//!
//! Shapes describing index layout across the cluster: which shards an
//! index has, which node currently hosts the primary of each shard, and
//! whether that shard is healthy enough to dispatch to. [`crate::schema::directory`]
//! wraps these in a client trait the dispatcher and router query at
//! request time.

pub mod directory;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Health of a single shard replica as reported by the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShardState {
    Active,
    Initializing,
    Unavailable,
}

/// Where a shard's current primary lives, and whether it can be
/// dispatched to right now.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardRouting {
    pub shard_id: u32,
    pub node_address: String,
    pub state: ShardState,
}

/// An index's full shard layout, keyed by shard id so lookups during
/// dispatch don't need a linear scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub index: String,
    pub num_shards: u32,
    pub shards: BTreeMap<u32, ShardRouting>,
}

impl IndexMetadata {
    pub fn shard_ids(&self) -> Vec<u32> {
        self.shards.keys().copied().collect()
    }

    pub fn active_shard_ids(&self) -> Vec<u32> {
        self.shards
            .values()
            .filter(|s| s.state == ShardState::Active)
            .map(|s| s.shard_id)
            .collect()
    }
}

/// Full cluster topology as the directory last observed it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterMetadata {
    pub indices: BTreeMap<String, IndexMetadata>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> IndexMetadata {
        let mut shards = BTreeMap::new();
        shards.insert(
            0,
            ShardRouting {
                shard_id: 0,
                node_address: "node-a:9200".into(),
                state: ShardState::Active,
            },
        );
        shards.insert(
            1,
            ShardRouting {
                shard_id: 1,
                node_address: "node-b:9200".into(),
                state: ShardState::Unavailable,
            },
        );
        IndexMetadata {
            index: "logs".into(),
            num_shards: 2,
            shards,
        }
    }

    #[test]
    fn active_shard_ids_excludes_unavailable() {
        assert_eq!(meta().active_shard_ids(), vec![0]);
    }

    #[test]
    fn shard_ids_includes_every_shard() {
        assert_eq!(meta().shard_ids(), vec![0, 1]);
    }
}
