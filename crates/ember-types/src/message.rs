use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{FULFILLMENT_FAILED_TEXT, IMAGE_GENERATED_TEXT};

/// Author of a message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    /// Capitalised speaker label used when rendering conversation context.
    pub fn label(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::System => "System",
        }
    }
}

/// One entry in a channel's message log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub channel_id: String,
    pub role: Role,
    pub text: String,
    /// Id of an attached (user) or generated (assistant) image.
    pub image_ref: Option<String>,
    /// `true` while an assistant reply is still being generated.
    pub pending: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Whether this is an assistant reply that ended in the failure fallback.
    pub fn is_failed_reply(&self) -> bool {
        self.role == Role::Assistant && !self.pending && self.text == FULFILLMENT_FAILED_TEXT
    }

    /// Whether this is an assistant reply carrying a generated image.
    pub fn is_generated_image(&self) -> bool {
        self.role == Role::Assistant && self.image_ref.is_some() && self.text == IMAGE_GENERATED_TEXT
    }
}

/// Request body for `POST /api/send`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct SubmitTurnRequest {
    /// Target channel. Required; an empty value is rejected.
    #[serde(default)]
    pub channel_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Id of a previously stored image to attach to the turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
}

/// Response body for `POST /api/send`, returned before generation starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct SubmitTurnResponse {
    pub user_message: Message,
    pub assistant_placeholder: Message,
}

/// Query string for `GET /api/messages`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema, utoipa::IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
#[serde(rename_all = "camelCase")]
pub struct ListMessagesQuery {
    pub channel_id: Option<String>,
}

/// Response body for `GET /api/messages`, ascending creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct MessageList {
    pub messages: Vec<Message>,
}

impl MessageList {
    /// Look up a message by id.
    pub fn find(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }
}
