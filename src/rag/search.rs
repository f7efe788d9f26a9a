//! Similarity ranking over stored chunks.

use std::sync::Arc;

use async_trait::async_trait;

use super::error::RagError;
use super::store::KnowledgeStore;
use super::types::ScoredChunk;

#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// At most `top_k` chunks from `namespace` (all namespaces when empty),
    /// ordered by descending similarity to `query`.
    async fn search(
        &self,
        query: &[f32],
        namespace: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, RagError>;
}

/// Exact search: scores every candidate, O(N) per query plus an O(N log N) sort.
pub struct LinearScanSearch {
    store: Arc<dyn KnowledgeStore>,
    min_similarity: f32,
}

impl LinearScanSearch {
    pub fn new(store: Arc<dyn KnowledgeStore>, min_similarity: f32) -> Self {
        Self {
            store,
            min_similarity,
        }
    }
}

#[async_trait]
impl VectorSearch for LinearScanSearch {
    async fn search(
        &self,
        query: &[f32],
        namespace: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, RagError> {
        if top_k == 0 {
            return Err(RagError::InvalidInput(
                "top_k must be greater than zero".to_string(),
            ));
        }

        let candidates = self.store.find_by_namespace(namespace).await?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<ScoredChunk> = candidates
            .into_iter()
            .filter(|chunk| !chunk.vector.is_empty())
            .filter_map(|chunk| {
                let score = cosine_similarity(query, &chunk.vector);
                (score >= self.min_similarity).then_some(ScoredChunk { chunk, score })
            })
            .collect();

        // Stable: equal scores keep store order.
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);

        Ok(scored)
    }
}

/// Cosine similarity in `[-1, 1]`.
///
/// Returns 0 for empty vectors, mismatched lengths, or a zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| (*x as f64) * (*y as f64)).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0) as f32
}
