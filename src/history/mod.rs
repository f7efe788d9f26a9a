use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::core::errors::ApiError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub message_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub id: i64,
    pub session_id: String,
    pub role: String,
    pub content: String,
    pub created_at: String,
}

/// Sessions and their messages. Deleting a session only stamps
/// `deleted_at`; such sessions disappear from every read.
#[derive(Clone)]
pub struct HistoryStore {
    pool: SqlitePool,
}

impl HistoryStore {
    pub async fn new(db_path: PathBuf) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to connect to history db: {}", e)))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to init sessions table: {}", e)))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY(session_id) REFERENCES sessions(id)
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to init messages table: {}", e)))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_session_id ON messages(session_id)")
            .execute(&pool)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to create index: {}", e)))?;

        tracing::debug!(path = %db_path.display(), "History store ready");
        Ok(Self { pool })
    }

    pub async fn create_session(&self, title: &str) -> Result<SessionInfo, ApiError> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query("INSERT INTO sessions (id, title, created_at, updated_at) VALUES (?, ?, ?, ?)")
            .bind(&session_id)
            .bind(title)
            .bind(&now)
            .bind(&now)
            .execute(&self.pool)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to create session: {}", e)))?;

        Ok(SessionInfo {
            id: session_id,
            title: title.to_string(),
            created_at: now.clone(),
            updated_at: now,
            message_count: 0,
        })
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<SessionInfo>, ApiError> {
        let row = sqlx::query(
            "SELECT s.id, s.title, s.created_at, s.updated_at, COUNT(m.id) AS msg_count \
             FROM sessions s \
             LEFT JOIN messages m ON s.id = m.session_id \
             WHERE s.id = ? AND s.deleted_at IS NULL \
             GROUP BY s.id",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        row.map(|row| session_from_row(&row)).transpose()
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionInfo>, ApiError> {
        let rows = sqlx::query(
            "SELECT s.id, s.title, s.created_at, s.updated_at, COUNT(m.id) AS msg_count \
             FROM sessions s \
             LEFT JOIN messages m ON s.id = m.session_id \
             WHERE s.deleted_at IS NULL \
             GROUP BY s.id \
             ORDER BY s.updated_at DESC \
             LIMIT 100",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        rows.iter().map(session_from_row).collect()
    }

    /// Returns false when the session does not exist or was deleted.
    pub async fn rename_session(&self, session_id: &str, title: &str) -> Result<bool, ApiError> {
        let now = chrono::Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE sessions SET title = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(title)
        .bind(now)
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;
        Ok(result.rows_affected() > 0)
    }

    /// Returns false when the session does not exist or was already deleted.
    pub async fn delete_session(&self, session_id: &str) -> Result<bool, ApiError> {
        let now = chrono::Utc::now().to_rfc3339();
        let result =
            sqlx::query("UPDATE sessions SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL")
                .bind(now)
                .bind(session_id)
                .execute(&self.pool)
                .await
                .map_err(ApiError::internal)?;
        Ok(result.rows_affected() > 0)
    }

    /// Appends a message and bumps the session's `updated_at` in one transaction.
    pub async fn add_message(
        &self,
        session_id: &str,
        role: &str,
        content: &str,
    ) -> Result<i64, ApiError> {
        let now = chrono::Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        let touched =
            sqlx::query("UPDATE sessions SET updated_at = ? WHERE id = ? AND deleted_at IS NULL")
                .bind(&now)
                .bind(session_id)
                .execute(&mut *tx)
                .await
                .map_err(ApiError::internal)?;
        if touched.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("session {} not found", session_id)));
        }

        let result = sqlx::query(
            "INSERT INTO messages (session_id, role, content, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(role)
        .bind(content)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

        tx.commit().await.map_err(ApiError::internal)?;

        Ok(result.last_insert_rowid())
    }

    /// Messages in insertion order. A positive `limit` keeps only the latest ones.
    pub async fn get_history(
        &self,
        session_id: &str,
        limit: i64,
    ) -> Result<Vec<HistoryMessage>, ApiError> {
        let rows = if limit > 0 {
            sqlx::query(
                "SELECT * FROM (SELECT * FROM messages WHERE session_id = ? ORDER BY id DESC LIMIT ?) ORDER BY id ASC",
            )
            .bind(session_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?
        } else {
            sqlx::query("SELECT * FROM messages WHERE session_id = ? ORDER BY id ASC")
                .bind(session_id)
                .fetch_all(&self.pool)
                .await
                .map_err(ApiError::internal)?
        };

        rows.iter()
            .map(|row| {
                Ok(HistoryMessage {
                    id: row.try_get("id").map_err(ApiError::internal)?,
                    session_id: row.try_get("session_id").map_err(ApiError::internal)?,
                    role: row.try_get("role").map_err(ApiError::internal)?,
                    content: row.try_get("content").map_err(ApiError::internal)?,
                    created_at: row.try_get("created_at").map_err(ApiError::internal)?,
                })
            })
            .collect()
    }
}

fn session_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<SessionInfo, ApiError> {
    Ok(SessionInfo {
        id: row.try_get("id").map_err(ApiError::internal)?,
        title: row.try_get("title").map_err(ApiError::internal)?,
        created_at: row.try_get("created_at").map_err(ApiError::internal)?,
        updated_at: row.try_get("updated_at").map_err(ApiError::internal)?,
        message_count: row.try_get("msg_count").map_err(ApiError::internal)?,
    })
}
