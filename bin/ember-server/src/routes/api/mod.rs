pub mod channels;
pub mod messages;

use crate::state::AppState;
use utoipa::OpenApi;

use axum::Router;
use std::sync::Arc;

/// Routes nested under `/api`.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(channels::router())
        .merge(messages::router())
}

pub fn api_docs() -> utoipa::openapi::OpenApi {
    let mut spec = channels::ChannelsApi::openapi();
    spec.merge(messages::MessagesApi::openapi());
    spec
}
