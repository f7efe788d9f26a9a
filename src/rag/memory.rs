//! Process-local knowledge store. Contents are lost on restart.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::error::RagError;
use super::store::{ensure_storable, KnowledgeStore};
use super::types::KnowledgeChunk;

#[derive(Default)]
pub struct InMemoryKnowledgeStore {
    chunks: RwLock<Vec<KnowledgeChunk>>,
}

impl InMemoryKnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.chunks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.chunks.read().await.is_empty()
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    async fn create(&self, chunk: KnowledgeChunk) -> Result<KnowledgeChunk, RagError> {
        ensure_storable(&chunk)?;

        let mut chunks = self.chunks.write().await;
        if chunks.iter().any(|existing| existing.id == chunk.id) {
            return Err(RagError::Storage(format!("duplicate chunk id {}", chunk.id)));
        }
        chunks.push(chunk.clone());
        Ok(chunk)
    }

    async fn find_by_namespace(&self, namespace: &str) -> Result<Vec<KnowledgeChunk>, RagError> {
        let chunks = self.chunks.read().await;
        Ok(chunks
            .iter()
            .filter(|chunk| namespace.is_empty() || chunk.namespace == namespace)
            .cloned()
            .collect())
    }
}
