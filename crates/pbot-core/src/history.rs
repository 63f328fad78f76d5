//! Chat log persistence.
//!
//! One row per exchange. Rows are appended with a null output and completed
//! later through the id returned by `append`.

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::{
    domain::{EntryId, UserId},
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatLogEntry {
    pub id: EntryId,
    pub user_id: UserId,
    pub input_text: String,
    pub output_text: Option<String>,
    pub created_at: String,
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, user: UserId, input: &str, output: Option<&str>) -> Result<EntryId>;
    async fn update_output(&self, entry: EntryId, output: &str) -> Result<()>;
    async fn delete_all(&self, user: UserId) -> Result<u64>;
    /// Oldest first.
    async fn entries(&self, user: UserId) -> Result<Vec<ChatLogEntry>>;
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS chat (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    user_message TEXT NOT NULL,
    bot_response TEXT,
    timestamp TEXT NOT NULL
)
"#;

const USER_INDEX: &str = "CREATE INDEX IF NOT EXISTS chat_user_id ON chat (user_id, id)";

#[derive(sqlx::FromRow)]
struct ChatRow {
    id: i64,
    user_id: i64,
    user_message: String,
    bot_response: Option<String>,
    timestamp: String,
}

impl From<ChatRow> for ChatLogEntry {
    fn from(r: ChatRow) -> Self {
        Self {
            id: EntryId(r.id),
            user_id: UserId(r.user_id),
            input_text: r.user_message,
            output_text: r.bot_response,
            created_at: r.timestamp,
        }
    }
}

/// SQLite-backed history (the `chat` table).
#[derive(Clone, Debug)]
pub struct SqliteHistoryStore {
    pool: SqlitePool,
}

impl SqliteHistoryStore {
    /// Open (or create) the database file and ensure the schema exists.
    pub async fn connect(path: &Path) -> Result<Self> {
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await?;
        Self::with_pool(pool).await
    }

    /// Private in-memory database; a single long-lived connection keeps it alive.
    pub async fn in_memory() -> Result<Self> {
        let opts: SqliteConnectOptions = "sqlite::memory:".parse()?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(SCHEMA).execute(&pool).await?;
        sqlx::query(USER_INDEX).execute(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn append(&self, user: UserId, input: &str, output: Option<&str>) -> Result<EntryId> {
        let res = sqlx::query(
            "INSERT INTO chat (user_id, user_message, bot_response, timestamp) VALUES (?, ?, ?, ?)",
        )
        .bind(user.0)
        .bind(input)
        .bind(output)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(EntryId(res.last_insert_rowid()))
    }

    async fn update_output(&self, entry: EntryId, output: &str) -> Result<()> {
        sqlx::query("UPDATE chat SET bot_response = ? WHERE id = ?")
            .bind(output)
            .bind(entry.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_all(&self, user: UserId) -> Result<u64> {
        let res = sqlx::query("DELETE FROM chat WHERE user_id = ?")
            .bind(user.0)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    async fn entries(&self, user: UserId) -> Result<Vec<ChatLogEntry>> {
        let rows = sqlx::query_as::<_, ChatRow>(
            "SELECT id, user_id, user_message, bot_response, timestamp FROM chat WHERE user_id = ? ORDER BY id",
        )
        .bind(user.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ChatLogEntry::from).collect())
    }
}
