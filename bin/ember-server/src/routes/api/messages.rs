use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use ember_types::{
    ListMessagesQuery, Message, MessageList, Role, SubmitTurnRequest, SubmitTurnResponse,
};
use utoipa::OpenApi;

use crate::entities::{ChannelStore, MessageRecord, MessageStore};
use crate::error::ServerError;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(send, list_messages),
    components(schemas(SubmitTurnRequest, SubmitTurnResponse, MessageList, Message, Role))
)]
pub struct MessagesApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/send", post(send))
        .route("/messages", get(list_messages))
}

/// Submit a user turn.
///
/// Responds as soon as the user message and an empty, pending assistant
/// placeholder are stored. Poll `GET /api/messages` until the placeholder's
/// `pending` flag clears.
#[utoipa::path(
    post,
    path = "/api/send",
    tag = "messages",
    request_body = SubmitTurnRequest,
    responses(
        (status = 200, description = "Turn accepted", body = SubmitTurnResponse),
        (status = 400, description = "Missing channel id, or neither text nor image"),
        (status = 404, description = "Unknown channel or image"),
        (status = 500, description = "Backend error"),
    )
)]
pub async fn send(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitTurnRequest>,
) -> Result<Json<SubmitTurnResponse>, ServerError> {
    let channel_id = req.channel_id.trim();
    if channel_id.is_empty() {
        return Err(ServerError::BadRequest("missing channelId".into()));
    }
    let text = req.text.filter(|t| !t.trim().is_empty());
    let image_ref = req
        .image_ref
        .map(|r| r.trim().to_owned())
        .filter(|r| !r.is_empty());
    if text.is_none() && image_ref.is_none() {
        return Err(ServerError::BadRequest("a turn needs text or an image".into()));
    }

    let turn = state
        .orchestrator
        .submit_turn(channel_id, text, image_ref)
        .await?;
    Ok(Json(SubmitTurnResponse {
        user_message: turn.user_message.to_response(),
        assistant_placeholder: turn.placeholder.to_response(),
    }))
}

/// All messages of a channel, ascending creation time.
#[utoipa::path(
    get,
    path = "/api/messages",
    tag = "messages",
    params(ListMessagesQuery),
    responses(
        (status = 200, description = "Channel messages", body = MessageList),
        (status = 400, description = "Missing channel id"),
        (status = 404, description = "Unknown channel"),
        (status = 500, description = "Backend error"),
    )
)]
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListMessagesQuery>,
) -> Result<Json<MessageList>, ServerError> {
    let channel_id = query
        .channel_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ServerError::BadRequest("missing channelId".into()))?;
    if state.store.get_channel(channel_id).await?.is_none() {
        return Err(ServerError::NotFound(format!("channel {channel_id} not found")));
    }
    let messages = state.store.list_messages(channel_id).await?;
    Ok(Json(MessageList {
        messages: messages.iter().map(MessageRecord::to_response).collect(),
    }))
}
