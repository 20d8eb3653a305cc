//! Error Handling Design
//!
//! A single error enum covers every kind named by the query path: parse
//! and validation failures from the DSL front-end, routing/availability
//! errors from the distributed layers, pipeline and cache errors, and a
//! catch-all `Internal` for invariant violations.
//!
//! Propagation policy (mirrors the component design):
//! - `Parse`/`Validation` surface as HTTP 400.
//! - `ShardUnavailable`/`NodeUnavailable`/`IndexNotFound` surface as 404/503
//!   depending on context; see `protocol::error` for the HTTP mapping.
//! - `UpstreamTimeout` surfaces as 504 with a partial envelope when possible.
//! - `Cache` is never user-facing; it is always handled internally or
//!   promoted to `Internal`.

use thiserror::Error;

/// Errors produced anywhere along the query path.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Malformed JSON body.
    #[error("parse error: {reason}")]
    Parse { reason: String },

    /// Well-formed JSON that fails DSL structural validation.
    #[error("validation error: {reason}")]
    Validation {
        reason: String,
        field: Option<String>,
    },

    /// No such index in cluster metadata.
    #[error("index not found: {index}")]
    IndexNotFound { index: String },

    /// Target shard exists but is not in a servable allocation state.
    #[error("shard unavailable: {index}/{shard_id} (state={state})")]
    ShardUnavailable {
        index: String,
        shard_id: u32,
        state: String,
    },

    /// Routing table has no reachable node for a shard.
    #[error("no route to node for {index}/{shard_id}")]
    NodeUnavailable { index: String, shard_id: u32 },

    /// A shard RPC exceeded the request deadline.
    #[error("upstream timeout after {elapsed_ms}ms")]
    UpstreamTimeout { elapsed_ms: u64 },

    /// A shard RPC failed for a reason other than timeout.
    #[error("upstream error: {reason}")]
    UpstreamError { reason: String },

    /// A pipeline stage failed and its `on_failure` policy was `fail`.
    #[error("pipeline '{pipeline}' stage '{stage}' failed: {reason}")]
    Pipeline {
        pipeline: String,
        stage: String,
        reason: String,
    },

    /// Internal cache inconsistency. Never returned to a client; always
    /// caught at the call site and either retried or promoted to
    /// `Internal`.
    #[error("cache error: {reason}")]
    Cache { reason: String },

    /// Programmer error / invariant violation. Fatal: the caller that
    /// observes this should log at `error!(fatal = true)` and the
    /// process should exit rather than keep serving corrupted state.
    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl Error {
    pub fn parse(reason: impl Into<String>) -> Self {
        Error::Parse {
            reason: reason.into(),
        }
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        Error::Validation {
            reason: reason.into(),
            field: None,
        }
    }

    pub fn validation_field(reason: impl Into<String>, field: impl Into<String>) -> Self {
        Error::Validation {
            reason: reason.into(),
            field: Some(field.into()),
        }
    }

    /// Whether this error kind is safe to report back to an HTTP client
    /// verbatim. `Cache` is the only kind that must never leak.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, Error::Cache { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_errors_are_never_user_facing() {
        let e = Error::Cache {
            reason: "poisoned".into(),
        };
        assert!(!e.is_user_facing());
    }

    #[test]
    fn other_kinds_are_user_facing() {
        assert!(Error::parse("bad json").is_user_facing());
        assert!(Error::validation("bad field").is_user_facing());
        assert!(Error::IndexNotFound {
            index: "a".into()
        }
        .is_user_facing());
    }
}
