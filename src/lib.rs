//! Coordination tier for a distributed inverted-index search cluster.
//!
//! A search request enters through the HTTP surface in [`protocol`],
//! gets parsed by [`parser`] into the [`ast`] representation, and then
//! flows through the rest of the pipeline in order:
//!
//! 1. **C1 QueryParser** ([`parser`], [`ast`]) — nested-JSON DSL into a
//!    [`ast::SearchRequest`].
//! 2. **C2 LogicalPlanner** ([`plan::logical`], [`plan::converter`]) —
//!    the request into an unoptimized [`plan::logical::LogicalPlan`]
//!    tree with per-node cardinality estimates.
//! 3. **C3 Optimizer** ([`plan::optimizer`]) — priority-ordered
//!    rewrite rules applied to a fixed point.
//! 4. **C4 CostModel + PhysicalPlanner** ([`plan::physical`]) —
//!    chooses concrete strategies (hash vs. sorted aggregation, TopN
//!    vs. Sort+Limit) and attaches a [`plan::physical::Cost`] to every
//!    node.
//! 5. **C5 PhysicalExecutor** ([`execution`]) — walks the physical
//!    plan, drives the scatter-gather dispatch, and assembles the
//!    final [`execution::ExecutionResult`].
//! 6. **C6 ShardDispatcher** ([`dispatch`]) — fans a
//!    [`dispatch::ShardSearchRequest`] out to every shard an index
//!    owns and merges the partial responses, containing any shard
//!    that fails.
//! 7. **C7 DocumentRouter** ([`router`]) — maps a document id to its
//!    owning shard via FNV-1a hashing, for both the write path and
//!    point reads.
//!
//! Two cross-cutting components sit alongside this pipeline: **C8**
//! the plan cache ([`execution::cache`]), which lets a repeated
//! request short-circuit straight from C1 to C5, and **C9** the
//! pipeline engine ([`pipeline`]), whose named stages run before
//! planning, on document writes, and after result merging. **C10**
//! ([`telemetry`]) and **C11** ([`schema::directory`]) round out the
//! coordinator: metrics for every stage above, and the client used to
//! learn which shards an index has and where they live.
//!
//! [`config`] and [`error`] are the ambient configuration and error
//! types threaded through all of the above; [`value`] is the row/field
//! representation shared by the executor, the dispatcher's wire
//! format, and the HTTP envelope.

pub mod ast;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod execution;
pub mod parser;
pub mod pipeline;
pub mod plan;
pub mod protocol;
pub mod router;
pub mod schema;
pub mod telemetry;
pub mod value;

pub use config::Config;
pub use error::{Error, Result};
