//! SQLite-backed knowledge store.
//!
//! Vectors are stored as JSON float arrays next to the scalar columns.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::error::RagError;
use super::store::{ensure_storable, KnowledgeStore};
use super::types::KnowledgeChunk;

#[derive(Clone)]
pub struct SqliteKnowledgeStore {
    pool: SqlitePool,
}

impl SqliteKnowledgeStore {
    pub async fn with_path(db_path: PathBuf) -> Result<Self, RagError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(RagError::storage)?;

        let store = Self { pool };
        store.init_schema().await?;
        tracing::debug!(path = %db_path.display(), "Knowledge store ready");
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), RagError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS knowledge (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                vector TEXT NOT NULL,
                source TEXT NOT NULL DEFAULT '',
                namespace TEXT NOT NULL DEFAULT '',
                embedding_model TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(RagError::storage)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_knowledge_namespace ON knowledge(namespace)")
            .execute(&self.pool)
            .await
            .map_err(RagError::storage)?;

        Ok(())
    }

    fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Result<KnowledgeChunk, RagError> {
        let vector_json: String = row.try_get("vector").map_err(RagError::storage)?;
        // Unreadable vectors come back empty and are skipped by search.
        let vector = serde_json::from_str::<Vec<f32>>(&vector_json).unwrap_or_default();
        let created_at: String = row.try_get("created_at").map_err(RagError::storage)?;
        let updated_at: String = row.try_get("updated_at").map_err(RagError::storage)?;

        Ok(KnowledgeChunk {
            id: row.try_get("id").map_err(RagError::storage)?,
            title: row.try_get("title").map_err(RagError::storage)?,
            content: row.try_get("content").map_err(RagError::storage)?,
            vector,
            source: row.try_get("source").map_err(RagError::storage)?,
            namespace: row.try_get("namespace").map_err(RagError::storage)?,
            embedding_model: row.try_get("embedding_model").map_err(RagError::storage)?,
            created_at: parse_timestamp(&created_at),
            updated_at: parse_timestamp(&updated_at),
        })
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .unwrap_or_default()
}

#[async_trait]
impl KnowledgeStore for SqliteKnowledgeStore {
    async fn create(&self, chunk: KnowledgeChunk) -> Result<KnowledgeChunk, RagError> {
        ensure_storable(&chunk)?;
        let vector_json = serde_json::to_string(&chunk.vector).map_err(RagError::storage)?;

        sqlx::query(
            "INSERT INTO knowledge
                (id, title, content, vector, source, namespace, embedding_model, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(&chunk.id)
        .bind(&chunk.title)
        .bind(&chunk.content)
        .bind(&vector_json)
        .bind(&chunk.source)
        .bind(&chunk.namespace)
        .bind(&chunk.embedding_model)
        .bind(chunk.created_at.to_rfc3339())
        .bind(chunk.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(RagError::storage)?;

        Ok(chunk)
    }

    async fn find_by_namespace(&self, namespace: &str) -> Result<Vec<KnowledgeChunk>, RagError> {
        let rows = if namespace.is_empty() {
            sqlx::query("SELECT * FROM knowledge ORDER BY rowid ASC")
                .fetch_all(&self.pool)
                .await
                .map_err(RagError::storage)?
        } else {
            sqlx::query("SELECT * FROM knowledge WHERE namespace = ?1 ORDER BY rowid ASC")
                .bind(namespace)
                .fetch_all(&self.pool)
                .await
                .map_err(RagError::storage)?
        };

        rows.iter().map(Self::row_to_chunk).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::types::new_knowledge_id;
    use std::sync::Arc;

    async fn test_store(dir: &tempfile::TempDir) -> SqliteKnowledgeStore {
        SqliteKnowledgeStore::with_path(dir.path().join("knowledge.db"))
            .await
            .unwrap()
    }

    fn make_chunk(title: &str, namespace: &str, vector: Vec<f32>) -> KnowledgeChunk {
        let now = Utc::now();
        KnowledgeChunk {
            id: new_knowledge_id(),
            title: title.to_string(),
            content: format!("{title} body"),
            vector,
            source: "manual".to_string(),
            namespace: namespace.to_string(),
            embedding_model: "mock-v1".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn create_and_find_round_trips_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;

        let chunk = make_chunk("Policy", "hr", vec![0.25, -0.5, 1.0]);
        store.create(chunk.clone()).await.unwrap();

        let found = store.find_by_namespace("hr").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, chunk.id);
        assert_eq!(found[0].vector, vec![0.25, -0.5, 1.0]);
        assert_eq!(found[0].embedding_model, "mock-v1");
        assert_eq!(found[0].created_at.timestamp(), chunk.created_at.timestamp());
    }

    #[tokio::test]
    async fn namespace_filter_and_empty_namespace_scan() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;

        store.create(make_chunk("a", "ns1", vec![1.0])).await.unwrap();
        store.create(make_chunk("b", "ns2", vec![1.0])).await.unwrap();
        store.create(make_chunk("c", "ns1", vec![1.0])).await.unwrap();

        let ns1: Vec<String> = store
            .find_by_namespace("ns1")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.title)
            .collect();
        assert_eq!(ns1, vec!["a", "c"]);
        assert_eq!(store.find_by_namespace("").await.unwrap().len(), 3);
        assert!(store.find_by_namespace("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejects_duplicate_ids_and_empty_vectors() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;

        let chunk = make_chunk("a", "ns", vec![1.0]);
        store.create(chunk.clone()).await.unwrap();
        assert!(matches!(
            store.create(chunk).await,
            Err(RagError::Storage(_))
        ));
        assert!(matches!(
            store.create(make_chunk("b", "ns", vec![])).await,
            Err(RagError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_creates_all_land() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(test_store(&dir).await);

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .create(make_chunk(&format!("doc-{i}"), "shared", vec![i as f32, 1.0]))
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.find_by_namespace("shared").await.unwrap().len(), 16);
    }
}
