//! # Execution (C5 + C8)
//!
//! Ties the physical executor to the plan cache and request deadline:
//! [`cache`] holds optimized logical/physical plans, [`timeout`]
//! carries the request deadline through every suspension point, and
//! [`executor`] walks the physical plan against a shard dispatcher.

pub mod cache;
pub mod executor;
pub mod timeout;

pub use cache::{cache_key, PlanCache};
pub use executor::{AggregationResult, ExecutionResult, PhysicalExecutor};
pub use timeout::{CancelHandle, QueryTimeout, TimeoutError};
