//! Wire types shared by `ember-server` and its clients.
//!
//! Every type here serialises with camelCase field names, which is the JSON
//! shape the HTTP API speaks. Enable the `openapi` feature to derive
//! `utoipa::ToSchema` for the server's OpenAPI document.

pub mod channel;
pub mod message;

pub use channel::{Channel, ChannelList, CreateChannelRequest};
pub use message::{
    ListMessagesQuery, Message, MessageList, Role, SubmitTurnRequest, SubmitTurnResponse,
};

/// Text written onto an assistant placeholder when fulfillment fails for any
/// reason. Clients tell failure apart from success only by this literal.
pub const FULFILLMENT_FAILED_TEXT: &str = "⚠️ (AI failed) — please try again later.";

/// Text written onto an assistant placeholder whose reply is a generated image.
pub const IMAGE_GENERATED_TEXT: &str = "[Image generated]";
