//! Axum router construction.
//!
//! [`build`] assembles the complete application router:
//! - Middleware layers (CORS, per-request trace-ID injection)
//! - Health / heartbeat route
//! - Chat routes under `/api`
//! - The OpenAPI document at `/api-docs/openapi.json`

mod api;
pub mod doc;
mod health;

use axum::routing::get;
use axum::{Json, Router, middleware};
use std::sync::Arc;
use tower::ServiceBuilder;

use crate::middleware::{cors, trace};
use crate::state::AppState;

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let api_doc = doc::get_docs();

    Router::new()
        .merge(health::router())
        .nest("/api", api::router())
        .route("/api-docs/openapi.json", get(move || async move { Json(api_doc) }))
        // Outermost layers execute first on the way in.
        .layer(ServiceBuilder::new().layer(cors::cors_layer(state.clone())))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            trace::trace_middleware,
        ))
        .with_state(state)
}
