//! # HTTP Surface
//!
//! The coordinator's REST API: every route listed in the crate-level
//! overview is a thin `axum` handler in [`handler`] sharing one
//! [`state::AppState`]. [`error`] maps [`crate::error::Error`] onto
//! HTTP status codes and the `{"error": {type, reason}}` JSON body
//! every handler returns on failure.
//!
//! # Module Structure
//!
//! - `state` - shared `AppState` assembled once at startup
//! - `handler` - one function per route
//! - `error` - `Error -> (StatusCode, JSON body)` mapping

pub mod error;
pub mod handler;
pub mod state;

pub use error::status_code;
pub use state::AppState;

use axum::routing::{get, post, put};
use axum::Router;

/// Builds the coordinator's `axum` router. Split out from the binary
/// so integration tests can mount the same routes against an
/// in-process `AppState` without spawning a real listener.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handler::health))
        .route("/metrics", get(handler::metrics))
        .route("/_search", get(handler::search).post(handler::search))
        .route("/:index/_search", get(handler::search).post(handler::search))
        .route("/_msearch", post(handler::msearch))
        .route("/:index/_msearch", post(handler::msearch))
        .route("/:index/_count", get(handler::count).post(handler::count))
        .route(
            "/:index/_doc",
            put(handler::index_doc_auto).post(handler::index_doc_auto),
        )
        .route(
            "/:index/_doc/:id",
            put(handler::index_doc)
                .post(handler::index_doc)
                .get(handler::get_doc)
                .delete(handler::delete_doc),
        )
        .route("/_bulk", post(handler::bulk))
        .route("/:index/_bulk", post(handler::bulk))
        .with_state(state)
}
