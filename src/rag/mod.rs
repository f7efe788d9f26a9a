//! Retrieval-augmented generation pipeline.
//!
//! - `TextChunker`: splits documents into code-point windows
//! - `Embedder`: text to vector (stub or OpenAI-compatible)
//! - `KnowledgeStore`: chunk persistence (SQLite or in-memory)
//! - `VectorSearch`: exact cosine ranking over a namespace
//! - `RagService`: ingest and query orchestration with plain-chat fallback

mod chunker;
mod embedder;
mod error;
mod memory;
mod prompt;
mod search;
mod service;
mod sqlite;
mod store;
mod types;

use std::path::PathBuf;
use std::sync::Arc;

pub use chunker::TextChunker;
pub use embedder::{
    embedder_from_settings, Embedder, OpenAiEmbedder, StubEmbedder, STUB_MODEL_VERSION,
};
pub use error::RagError;
pub use memory::InMemoryKnowledgeStore;
pub use prompt::{build_prompt, PromptTemplate};
pub use search::{cosine_similarity, LinearScanSearch, VectorSearch};
pub use service::{AnswerMode, IngestRequest, QueryMode, QueryOutcome, QueryRequest, RagService};
pub use sqlite::SqliteKnowledgeStore;
pub use store::KnowledgeStore;
pub use types::{new_knowledge_id, KnowledgeChunk, ScoredChunk};

use crate::core::config::StoreKind;

pub async fn store_from_settings(
    kind: StoreKind,
    db_path: PathBuf,
) -> Result<Arc<dyn KnowledgeStore>, RagError> {
    match kind {
        StoreKind::Sqlite => Ok(Arc::new(SqliteKnowledgeStore::with_path(db_path).await?)),
        StoreKind::Memory => Ok(Arc::new(InMemoryKnowledgeStore::new())),
    }
}
