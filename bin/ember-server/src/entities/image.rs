use crate::entities::{ImageRecord, SqliteStore, encode_ts};
use std::future::Future;

pub trait ImageStore: Send + Sync + 'static {
    fn insert_image(
        &self,
        image: ImageRecord,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
    fn image_exists(&self, id: &str) -> impl Future<Output = Result<bool, sqlx::Error>> + Send;
}

impl ImageStore for SqliteStore {
    async fn insert_image(&self, image: ImageRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO images (id, filename, content_type, data, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&image.id)
        .bind(&image.filename)
        .bind(&image.content_type)
        .bind(&image.data)
        .bind(encode_ts(&image.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn image_exists(&self, id: &str) -> Result<bool, sqlx::Error> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM images WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}
