//! Persistence boundary for knowledge chunks.
//!
//! Chunks are write-once: there is no update or delete path. The primary
//! implementation is `SqliteKnowledgeStore`; `InMemoryKnowledgeStore` serves
//! tests and throwaway deployments.

use async_trait::async_trait;

use super::error::RagError;
use super::types::KnowledgeChunk;

#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Persist a new chunk. Rejects empty vectors and duplicate ids.
    async fn create(&self, chunk: KnowledgeChunk) -> Result<KnowledgeChunk, RagError>;

    /// All chunks in `namespace` in insertion order, or every chunk when
    /// `namespace` is empty.
    async fn find_by_namespace(&self, namespace: &str) -> Result<Vec<KnowledgeChunk>, RagError>;
}

pub(crate) fn ensure_storable(chunk: &KnowledgeChunk) -> Result<(), RagError> {
    if chunk.vector.is_empty() {
        return Err(RagError::InvalidInput(format!(
            "chunk {} has an empty vector",
            chunk.id
        )));
    }
    Ok(())
}
