use crate::entities::{MessageRecord, SqliteStore, decode_ts, encode_ts};
use ember_types::Role;
use sqlx::Sqlite;
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use std::future::Future;

pub trait MessageStore: Send + Sync + 'static {
    fn insert_message(
        &self,
        msg: MessageRecord,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
    /// Persist a user turn and its assistant placeholder together.
    ///
    /// Either both rows are written or neither is.
    fn insert_turn(
        &self,
        user: MessageRecord,
        placeholder: MessageRecord,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
    fn get_message(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<MessageRecord>, sqlx::Error>> + Send;
    /// All messages of a channel, ascending creation time.
    fn list_messages(
        &self,
        channel_id: &str,
    ) -> impl Future<Output = Result<Vec<MessageRecord>, sqlx::Error>> + Send;
    /// The last `limit` messages written to a channel before message `before_id`,
    /// in write order.
    fn recent_messages_before(
        &self,
        channel_id: &str,
        before_id: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<MessageRecord>, sqlx::Error>> + Send;
    /// Write the terminal state onto an assistant placeholder.
    ///
    /// Returns `false` when no assistant message with that id exists.
    fn resolve_placeholder(
        &self,
        id: &str,
        text: &str,
        image_ref: Option<&str>,
    ) -> impl Future<Output = Result<bool, sqlx::Error>> + Send;
    /// Resolve every assistant message still pending with `text`.
    fn fail_pending_placeholders(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<u64, sqlx::Error>> + Send;
}

const MESSAGE_COLUMNS: &str = "id, channel_id, role, text, image_ref, pending, created_at";

type MessageRow = (String, String, String, String, Option<String>, bool, String);

fn from_row((id, channel_id, role, text, image_ref, pending, created_at): MessageRow) -> MessageRecord {
    let role = role.parse().unwrap_or_else(|e: strum::ParseError| {
        tracing::warn!(raw = %role, error = %e, "unknown message role; treating as system");
        Role::System
    });
    MessageRecord {
        id,
        channel_id,
        role,
        text,
        image_ref,
        pending,
        created_at: decode_ts(&created_at, "messages.created_at"),
    }
}

fn insert_query(msg: &MessageRecord) -> Query<'_, Sqlite, SqliteArguments<'_>> {
    sqlx::query(
        "INSERT INTO messages (id, channel_id, role, text, image_ref, pending, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )
    .bind(&msg.id)
    .bind(&msg.channel_id)
    .bind(msg.role.as_ref())
    .bind(&msg.text)
    .bind(&msg.image_ref)
    .bind(msg.pending)
    .bind(encode_ts(&msg.created_at))
}

impl MessageStore for SqliteStore {
    async fn insert_message(&self, msg: MessageRecord) -> Result<(), sqlx::Error> {
        insert_query(&msg).execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_turn(
        &self,
        user: MessageRecord,
        placeholder: MessageRecord,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        insert_query(&user).execute(&mut *tx).await?;
        insert_query(&placeholder).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_message(&self, id: &str) -> Result<Option<MessageRecord>, sqlx::Error> {
        let row: Option<MessageRow> =
            sqlx::query_as(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(from_row))
    }

    async fn list_messages(&self, channel_id: &str) -> Result<Vec<MessageRecord>, sqlx::Error> {
        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE channel_id = ?1 ORDER BY created_at ASC, seq ASC"
        ))
        .bind(channel_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(from_row).collect())
    }

    async fn recent_messages_before(
        &self,
        channel_id: &str,
        before_id: &str,
        limit: usize,
    ) -> Result<Vec<MessageRecord>, sqlx::Error> {
        let mut rows: Vec<MessageRow> = sqlx::query_as(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE channel_id = ?1 AND seq < (SELECT seq FROM messages WHERE id = ?2) \
             ORDER BY seq DESC LIMIT ?3"
        ))
        .bind(channel_id)
        .bind(before_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        rows.reverse();
        Ok(rows.into_iter().map(from_row).collect())
    }

    async fn resolve_placeholder(
        &self,
        id: &str,
        text: &str,
        image_ref: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE messages SET text = ?1, image_ref = ?2, pending = 0 \
             WHERE id = ?3 AND role = 'assistant'",
        )
        .bind(text)
        .bind(image_ref)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn fail_pending_placeholders(&self, text: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE messages SET text = ?1, pending = 0 \
             WHERE pending = 1 AND role = 'assistant'",
        )
        .bind(text)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::{Duration, Utc};

    fn user_at(channel_id: &str, text: &str, offset_secs: i64) -> MessageRecord {
        let mut msg = MessageRecord::user(channel_id, Some(text.into()), None);
        msg.created_at = Utc::now() + Duration::seconds(offset_secs);
        msg
    }

    #[tokio::test]
    async fn list_is_chronological_and_scoped_to_channel() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert_message(user_at("c1", "second", 2)).await.unwrap();
        store.insert_message(user_at("c1", "first", 1)).await.unwrap();
        store.insert_message(user_at("c2", "elsewhere", 0)).await.unwrap();

        let texts: Vec<_> = store
            .list_messages("c1")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn recent_window_stops_before_anchor() {
        let store = SqliteStore::in_memory().await.unwrap();
        for i in 0..5 {
            store.insert_message(user_at("c1", &format!("m{i}"), i)).await.unwrap();
        }
        let anchor = MessageRecord::placeholder("c1");
        let anchor_id = anchor.id.clone();
        store.insert_message(anchor).await.unwrap();
        store.insert_message(user_at("c1", "late", 10)).await.unwrap();

        let texts: Vec<_> = store
            .recent_messages_before("c1", &anchor_id, 3)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn recent_window_follows_write_order_over_timestamps() {
        let store = SqliteStore::in_memory().await.unwrap();
        // Clock stepped backwards between writes.
        store.insert_message(user_at("c1", "a", 30)).await.unwrap();
        store.insert_message(user_at("c1", "b", 20)).await.unwrap();
        store.insert_message(user_at("c1", "c", 10)).await.unwrap();
        let anchor = user_at("c1", "anchor", 0);
        let anchor_id = anchor.id.clone();
        store.insert_message(anchor).await.unwrap();

        let texts = |limit| {
            let store = store.clone();
            let anchor_id = anchor_id.clone();
            async move {
                store
                    .recent_messages_before("c1", &anchor_id, limit)
                    .await
                    .unwrap()
                    .into_iter()
                    .map(|m| m.text)
                    .collect::<Vec<_>>()
            }
        };
        assert_eq!(texts(2).await, vec!["b", "c"]);
        assert_eq!(texts(10).await, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn turn_is_written_together() {
        let store = SqliteStore::in_memory().await.unwrap();
        let user = MessageRecord::user("c1", Some("hi".into()), None);
        let placeholder = MessageRecord::placeholder("c1");
        store.insert_turn(user, placeholder).await.unwrap();

        let stored = store.list_messages("c1").await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].role, Role::User);
        assert_eq!(stored[1].role, Role::Assistant);
        assert!(stored[1].pending);
    }

    #[tokio::test]
    async fn failed_placeholder_write_rolls_back_user_turn() {
        let store = SqliteStore::in_memory().await.unwrap();
        sqlx::query(
            "CREATE TRIGGER reject_assistant BEFORE INSERT ON messages \
             WHEN NEW.role = 'assistant' BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(&store.pool)
        .await
        .unwrap();

        let user = MessageRecord::user("c1", Some("hi".into()), None);
        let placeholder = MessageRecord::placeholder("c1");
        assert!(store.insert_turn(user, placeholder).await.is_err());
        assert!(store.list_messages("c1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn resolve_clears_pending_once_written() {
        let store = SqliteStore::in_memory().await.unwrap();
        let placeholder = MessageRecord::placeholder("c1");
        let id = placeholder.id.clone();
        store.insert_message(placeholder).await.unwrap();

        assert!(store.resolve_placeholder(&id, "hello", None).await.unwrap());
        let stored = store.get_message(&id).await.unwrap().unwrap();
        assert!(!stored.pending);
        assert_eq!(stored.text, "hello");
        assert_eq!(stored.role, Role::Assistant);
    }

    #[tokio::test]
    async fn resolve_refuses_user_messages_and_unknown_ids() {
        let store = SqliteStore::in_memory().await.unwrap();
        let user = MessageRecord::user("c1", Some("hi".into()), None);
        let id = user.id.clone();
        store.insert_message(user).await.unwrap();

        assert!(!store.resolve_placeholder(&id, "hijack", None).await.unwrap());
        assert!(!store.resolve_placeholder("missing", "x", None).await.unwrap());
        assert_eq!(store.get_message(&id).await.unwrap().unwrap().text, "hi");
    }

    #[tokio::test]
    async fn stale_placeholders_are_failed_in_bulk() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert_message(MessageRecord::placeholder("c1")).await.unwrap();
        store.insert_message(MessageRecord::placeholder("c2")).await.unwrap();
        store.insert_message(user_at("c1", "done", 0)).await.unwrap();

        assert_eq!(store.fail_pending_placeholders("gone").await.unwrap(), 2);
        assert_eq!(store.fail_pending_placeholders("gone").await.unwrap(), 0);
    }
}
