use chrono::{DateTime, Utc};

/// A row in the `images` table.
#[derive(Debug, Clone)]
pub struct ImageRecord {
    pub id: String,
    /// Original upload name; `None` for generated images.
    pub filename: Option<String>,
    pub content_type: String,
    pub data: Vec<u8>,
    pub created_at: DateTime<Utc>,
}
