use chrono::{DateTime, Utc};
use ember_types::Role;
use uuid::Uuid;

/// A single row in the `messages` table.
#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub id: String,
    pub channel_id: String,
    pub role: Role,
    pub text: String,
    pub image_ref: Option<String>,
    /// Set only on assistant placeholders awaiting fulfillment.
    pub pending: bool,
    pub created_at: DateTime<Utc>,
}

impl MessageRecord {
    /// A settled user turn.
    pub fn user(channel_id: &str, text: Option<String>, image_ref: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            channel_id: channel_id.to_owned(),
            role: Role::User,
            text: text.unwrap_or_default(),
            image_ref,
            pending: false,
            created_at: Utc::now(),
        }
    }

    /// An empty assistant reply that fulfillment will fill in.
    pub fn placeholder(channel_id: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            channel_id: channel_id.to_owned(),
            role: Role::Assistant,
            text: String::new(),
            image_ref: None,
            pending: true,
            created_at: Utc::now(),
        }
    }
}
