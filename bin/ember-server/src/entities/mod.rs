//! Persistence layer.
//!
//! Each concern gets its own store trait ([`ChannelStore`], [`MessageStore`],
//! [`ImageStore`]), all implemented by [`SqliteStore`]. To move to another
//! database, implement the traits for the new type and change the concrete
//! type in [`crate::state::AppState`].
//!
//! All trait methods use `impl Future` in their signatures, so no
//! `async-trait` boxing is needed on this hot path.
//!
//! Queries use the runtime-checked `sqlx::query` form so no `DATABASE_URL` is
//! needed at compile time.

pub mod channel;
pub mod dao;
pub mod image;
pub mod message;

pub use dao::{ChannelRecord, ImageRecord, MessageRecord};

pub use channel::ChannelStore;
pub use image::ImageStore;
pub use message::MessageStore;

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

/// SQLite-backed store for channels, messages and images.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the SQLite database at `url` and run pending migrations.
    ///
    /// `url` should be a sqlx-compatible SQLite URL, e.g. `"sqlite://ember.db"`.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Self::migrate(pool).await
    }

    /// A private in-memory database.
    ///
    /// Every SQLite `:memory:` connection is a separate database, so the pool
    /// is pinned to one connection that never expires.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::migrate(pool).await
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(pool: SqlitePool) -> Result<Self, sqlx::Error> {
        // Path is resolved relative to CARGO_MANIFEST_DIR at compile time.
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }
}

/// Fixed-width RFC 3339 so that stored timestamps sort lexically.
pub(crate) fn encode_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn decode_ts(raw: &str, column: &'static str) -> DateTime<Utc> {
    raw.parse().unwrap_or_else(|e: chrono::ParseError| {
        tracing::warn!(raw = %raw, column, error = %e, "failed to parse timestamp; using now");
        Utc::now()
    })
}
