use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use ember_types::{Channel, ChannelList, CreateChannelRequest};
use tracing::info;
use utoipa::OpenApi;

use crate::entities::{ChannelRecord, ChannelStore};
use crate::error::ServerError;
use crate::state::AppState;

const DEFAULT_CHANNEL_NAME: &str = "New Channel";

#[derive(OpenApi)]
#[openapi(
    paths(create_channel, list_channels),
    components(schemas(CreateChannelRequest, Channel, ChannelList))
)]
pub struct ChannelsApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/channels", get(list_channels).post(create_channel))
}

#[utoipa::path(
    post,
    path = "/api/channels",
    tag = "channels",
    request_body = CreateChannelRequest,
    responses(
        (status = 200, description = "Channel created", body = Channel),
        (status = 500, description = "Backend error"),
    )
)]
pub async fn create_channel(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateChannelRequest>,
) -> Result<Json<Channel>, ServerError> {
    let name = req
        .name
        .map(|n| n.trim().to_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| DEFAULT_CHANNEL_NAME.to_owned());
    let channel = ChannelRecord::new(name);
    state.store.create_channel(channel.clone()).await?;
    info!(channel_id = %channel.id, name = %channel.name, "channel created");
    Ok(Json(channel.to_response()))
}

#[utoipa::path(
    get,
    path = "/api/channels",
    tag = "channels",
    responses(
        (status = 200, description = "Channels, oldest first", body = ChannelList),
        (status = 500, description = "Backend error"),
    )
)]
pub async fn list_channels(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ChannelList>, ServerError> {
    let channels = state.store.list_channels().await?;
    Ok(Json(ChannelList {
        channels: channels.iter().map(ChannelRecord::to_response).collect(),
    }))
}
