use chrono::{DateTime, Utc};

/// A row in the `channels` table.
#[derive(Debug, Clone)]
pub struct ChannelRecord {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl ChannelRecord {
    /// A fresh channel with a random id.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}
