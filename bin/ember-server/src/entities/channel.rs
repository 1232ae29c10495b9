use crate::entities::{ChannelRecord, SqliteStore, decode_ts, encode_ts};
use std::future::Future;

pub trait ChannelStore: Send + Sync + 'static {
    fn create_channel(
        &self,
        channel: ChannelRecord,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
    fn get_channel(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<ChannelRecord>, sqlx::Error>> + Send;
    fn list_channels(&self) -> impl Future<Output = Result<Vec<ChannelRecord>, sqlx::Error>> + Send;
}

type ChannelRow = (String, String, String);

fn from_row((id, name, created_at): ChannelRow) -> ChannelRecord {
    ChannelRecord {
        id,
        name,
        created_at: decode_ts(&created_at, "channels.created_at"),
    }
}

impl ChannelStore for SqliteStore {
    async fn create_channel(&self, channel: ChannelRecord) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO channels (id, name, created_at) VALUES (?1, ?2, ?3)")
            .bind(&channel.id)
            .bind(&channel.name)
            .bind(encode_ts(&channel.created_at))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_channel(&self, id: &str) -> Result<Option<ChannelRecord>, sqlx::Error> {
        let row: Option<ChannelRow> =
            sqlx::query_as("SELECT id, name, created_at FROM channels WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(from_row))
    }

    async fn list_channels(&self) -> Result<Vec<ChannelRecord>, sqlx::Error> {
        let rows: Vec<ChannelRow> = sqlx::query_as(
            "SELECT id, name, created_at FROM channels ORDER BY created_at ASC, rowid ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(from_row).collect())
    }
}
