//! Ingestion and query orchestration.
//!
//! Ingest: chunk → embed (one batch) → create each chunk in order.
//! Query: embed → search → prompt → LLM, or plain chat when nothing matches.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::chunker::TextChunker;
use super::embedder::Embedder;
use super::error::RagError;
use super::prompt::{build_prompt, PromptTemplate};
use super::search::VectorSearch;
use super::store::KnowledgeStore;
use super::types::{new_knowledge_id, KnowledgeChunk};
use crate::core::config::defaults::{DEFAULT_NAMESPACE, DEFAULT_SOURCE};
use crate::core::config::RagSettings;
use crate::llm::{ChatMessage, ChatRequest, LlmProvider};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngestRequest {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    #[default]
    Rag,
    Normal,
}

/// Path a query actually took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerMode {
    Rag,
    Normal,
    Fallback,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub mode: QueryMode,
    #[serde(default)]
    pub namespace: Option<String>,
    /// Values of zero or below use the configured default.
    #[serde(default)]
    pub top_k: Option<i64>,
    #[serde(default)]
    pub debug: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryOutcome {
    pub answer: String,
    pub mode: AnswerMode,
    pub docs_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hit_docs: Vec<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub fallback: bool,
}

/// Collaborators are injected at construction; nothing here is global.
pub struct RagService {
    chunker: TextChunker,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn KnowledgeStore>,
    search: Arc<dyn VectorSearch>,
    llm: Arc<dyn LlmProvider>,
    template: PromptTemplate,
    rag_system_prompt: String,
    default_top_k: usize,
}

impl RagService {
    pub fn new(
        settings: &RagSettings,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn KnowledgeStore>,
        search: Arc<dyn VectorSearch>,
        llm: Arc<dyn LlmProvider>,
    ) -> Result<Self, RagError> {
        let chunker = TextChunker::new(settings.chunk_size, settings.chunk_overlap);
        if chunker.default_overlap() >= chunker.default_size() {
            return Err(RagError::Config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                chunker.default_overlap(),
                chunker.default_size()
            )));
        }

        Ok(Self {
            chunker,
            embedder,
            store,
            search,
            llm,
            template: settings.prompt.clone(),
            rag_system_prompt: settings.rag_system_prompt.clone(),
            default_top_k: settings.top_k.max(1),
        })
    }

    /// Splits, embeds and persists a document.
    ///
    /// Chunks are written one by one in order. A store failure stops the
    /// ingestion and is returned; chunks written before it stay persisted.
    pub async fn ingest(&self, request: IngestRequest) -> Result<Vec<KnowledgeChunk>, RagError> {
        let title = request.title.as_str();
        if title.trim().is_empty() {
            return Err(RagError::InvalidInput("title is required".to_string()));
        }
        if request.content.trim().is_empty() {
            return Err(RagError::InvalidInput("content is required".to_string()));
        }
        let source = non_empty_or(request.source, DEFAULT_SOURCE);
        let namespace = non_empty_or(request.namespace, DEFAULT_NAMESPACE);

        let segments = self
            .chunker
            .chunk(&request.content, self.chunker.default_size());
        let embedding_model = self.embedder.model_version();
        let vectors = self.embedder.embed_batch(&segments).await?;
        if vectors.len() != segments.len() {
            return Err(RagError::Embedding(format!(
                "expected {} vectors, got {}",
                segments.len(),
                vectors.len()
            )));
        }
        if let Some(i) = vectors.iter().position(|v| v.is_empty()) {
            return Err(RagError::Embedding(format!(
                "empty vector for segment {}/{}",
                i + 1,
                segments.len()
            )));
        }

        let total = segments.len();
        let mut persisted = Vec::with_capacity(total);
        for (i, (content, vector)) in segments.into_iter().zip(vectors).enumerate() {
            let chunk_title = if total > 1 {
                format!("{} (segment {}/{})", title, i + 1, total)
            } else {
                title.to_string()
            };

            let now = Utc::now();
            let chunk = KnowledgeChunk {
                id: new_knowledge_id(),
                title: chunk_title,
                content,
                vector,
                source: source.clone(),
                namespace: namespace.clone(),
                embedding_model: embedding_model.clone(),
                created_at: now,
                updated_at: now,
            };
            persisted.push(self.store.create(chunk).await?);
        }

        Ok(persisted)
    }

    /// Answers a question, grounding it in stored knowledge when possible.
    pub async fn query(&self, request: QueryRequest) -> Result<QueryOutcome, RagError> {
        let query = request.query.as_str();
        if query.trim().is_empty() {
            return Err(RagError::InvalidInput("query is required".to_string()));
        }

        if request.mode == QueryMode::Normal {
            let answer = self.complete(vec![ChatMessage::user(query)]).await?;
            return Ok(QueryOutcome {
                answer,
                mode: AnswerMode::Normal,
                docs_count: 0,
                namespace: None,
                hit_docs: Vec::new(),
                fallback: false,
            });
        }

        let namespace = request.namespace.unwrap_or_default();
        let top_k = request
            .top_k
            .filter(|k| *k > 0)
            .map_or(self.default_top_k, |k| k as usize);

        let query_vector = self.embedder.embed(query).await?;
        let hits = self.search.search(&query_vector, &namespace, top_k).await?;

        if hits.is_empty() {
            let answer = self.complete(vec![ChatMessage::user(query)]).await?;
            return Ok(QueryOutcome {
                answer,
                mode: AnswerMode::Fallback,
                docs_count: 0,
                namespace: None,
                hit_docs: Vec::new(),
                fallback: true,
            });
        }

        let chunks: Vec<KnowledgeChunk> = hits.into_iter().map(|hit| hit.chunk).collect();
        let prompt = build_prompt(query, &chunks, &self.template);
        let answer = self
            .complete(vec![
                ChatMessage::system(self.rag_system_prompt.clone()),
                ChatMessage::user(prompt),
            ])
            .await?;

        let hit_docs = if request.debug {
            chunks.iter().map(|c| c.title.clone()).collect()
        } else {
            Vec::new()
        };

        Ok(QueryOutcome {
            answer,
            mode: AnswerMode::Rag,
            docs_count: chunks.len(),
            namespace: Some(namespace),
            hit_docs,
            fallback: false,
        })
    }

    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, RagError> {
        self.llm
            .chat(ChatRequest::new(messages))
            .await
            .map_err(|e| RagError::Generation(e.to_string()))
    }
}

fn non_empty_or(value: Option<String>, default: &str) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ApiError;
    use crate::rag::embedder::StubEmbedder;
    use crate::rag::memory::InMemoryKnowledgeStore;
    use crate::rag::search::LinearScanSearch;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingLlm {
        calls: Mutex<Vec<Vec<ChatMessage>>>,
        fail: bool,
    }

    #[async_trait]
    impl LlmProvider for RecordingLlm {
        fn name(&self) -> &str {
            "recording"
        }

        async fn chat(&self, request: ChatRequest) -> Result<String, ApiError> {
            self.calls.lock().unwrap().push(request.messages.clone());
            if self.fail {
                return Err(ApiError::BadGateway("upstream down".to_string()));
            }
            Ok(format!("answer #{}", self.calls.lock().unwrap().len()))
        }
    }

    /// Maps text to a vector by keyword so tests control similarity.
    struct KeywordEmbedder;

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
            if text.contains("refund") {
                Ok(vec![1.0, 0.1])
            } else {
                Ok(vec![-1.0, 0.0])
            }
        }

        fn model_version(&self) -> String {
            "keyword-v1".to_string()
        }
    }

    /// Returns an empty vector for any text containing 'z'.
    struct HoleyEmbedder;

    #[async_trait]
    impl Embedder for HoleyEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
            if text.contains('z') {
                Ok(Vec::new())
            } else {
                Ok(vec![1.0, 0.0])
            }
        }

        fn model_version(&self) -> String {
            "holey".to_string()
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, RagError> {
            Err(RagError::Embedding("model offline".to_string()))
        }

        fn model_version(&self) -> String {
            "broken".to_string()
        }
    }

    /// Accepts the first `limit` creates, then fails.
    struct FlakyStore {
        inner: InMemoryKnowledgeStore,
        accepted: AtomicUsize,
        limit: usize,
    }

    #[async_trait]
    impl KnowledgeStore for FlakyStore {
        async fn create(&self, chunk: KnowledgeChunk) -> Result<KnowledgeChunk, RagError> {
            if self.accepted.fetch_add(1, Ordering::SeqCst) >= self.limit {
                return Err(RagError::Storage("disk full".to_string()));
            }
            self.inner.create(chunk).await
        }

        async fn find_by_namespace(
            &self,
            namespace: &str,
        ) -> Result<Vec<KnowledgeChunk>, RagError> {
            self.inner.find_by_namespace(namespace).await
        }
    }

    fn settings(chunk_size: usize) -> RagSettings {
        RagSettings {
            chunk_size,
            chunk_overlap: 1,
            ..RagSettings::default()
        }
    }

    fn service_with(
        settings: &RagSettings,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn KnowledgeStore>,
        llm: Arc<RecordingLlm>,
    ) -> RagService {
        let search = Arc::new(LinearScanSearch::new(store.clone(), settings.min_similarity));
        RagService::new(settings, embedder, store, search, llm).unwrap()
    }

    fn ingest_request(title: &str, content: String) -> IngestRequest {
        IngestRequest {
            title: title.to_string(),
            content,
            source: None,
            namespace: None,
        }
    }

    #[tokio::test]
    async fn ingest_600_chars_makes_two_titled_segments() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let llm = Arc::new(RecordingLlm::default());
        let service = service_with(&settings(500), Arc::new(StubEmbedder), store.clone(), llm);

        let chunks = service
            .ingest(ingest_request("Policy", "x".repeat(600)))
            .await
            .unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].title, "Policy (segment 1/2)");
        assert_eq!(chunks[1].title, "Policy (segment 2/2)");
        assert_eq!(chunks[0].content.chars().count(), 500);
        assert_eq!(chunks[1].content.chars().count(), 100);
        for chunk in &chunks {
            assert_eq!(chunk.source, "manual");
            assert_eq!(chunk.namespace, "default");
            assert_eq!(chunk.embedding_model, "mock-v1");
        }
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn ingest_three_segments_and_single_segment_titles() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let llm = Arc::new(RecordingLlm::default());
        let service = service_with(&settings(10), Arc::new(StubEmbedder), store, llm);

        let three = service
            .ingest(ingest_request("Guide", "a".repeat(25)))
            .await
            .unwrap();
        let titles: Vec<&str> = three.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Guide (segment 1/3)", "Guide (segment 2/3)", "Guide (segment 3/3)"]
        );

        let one = service
            .ingest(ingest_request("Note", "short".to_string()))
            .await
            .unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].title, "Note");
    }

    #[tokio::test]
    async fn ingest_rejects_missing_fields_without_side_effects() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let llm = Arc::new(RecordingLlm::default());
        let service = service_with(&settings(500), Arc::new(StubEmbedder), store.clone(), llm);

        assert!(matches!(
            service.ingest(ingest_request("  ", "body".to_string())).await,
            Err(RagError::InvalidInput(_))
        ));
        assert!(matches!(
            service.ingest(ingest_request("Title", String::new())).await,
            Err(RagError::InvalidInput(_))
        ));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn embedding_failure_writes_nothing() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let llm = Arc::new(RecordingLlm::default());
        let service = service_with(&settings(5), Arc::new(FailingEmbedder), store.clone(), llm);

        let err = service
            .ingest(ingest_request("Doc", "abcdefghij".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn store_failure_keeps_earlier_chunks_and_surfaces_error() {
        let store = Arc::new(FlakyStore {
            inner: InMemoryKnowledgeStore::new(),
            accepted: AtomicUsize::new(0),
            limit: 1,
        });
        let llm = Arc::new(RecordingLlm::default());
        let service = service_with(&settings(5), Arc::new(StubEmbedder), store.clone(), llm);

        let err = service
            .ingest(ingest_request("Doc", "abcdefghijklmno".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Storage(_)));

        let kept = store.find_by_namespace("").await.unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].title, "Doc (segment 1/3)");
    }

    #[tokio::test]
    async fn empty_store_falls_back_to_raw_query() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let llm = Arc::new(RecordingLlm::default());
        let service = service_with(&settings(500), Arc::new(StubEmbedder), store, llm.clone());

        let outcome = service
            .query(QueryRequest {
                query: "what is the refund policy?".to_string(),
                ..QueryRequest::default()
            })
            .await
            .unwrap();

        assert_eq!(outcome.mode, AnswerMode::Fallback);
        assert!(outcome.fallback);
        assert_eq!(outcome.docs_count, 0);

        let calls = llm.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], vec![ChatMessage::user("what is the refund policy?")]);
    }

    #[tokio::test]
    async fn normal_mode_skips_retrieval() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let llm = Arc::new(RecordingLlm::default());
        let service = service_with(
            &settings(500),
            Arc::new(FailingEmbedder),
            store,
            llm.clone(),
        );

        let outcome = service
            .query(QueryRequest {
                query: "hello".to_string(),
                mode: QueryMode::Normal,
                ..QueryRequest::default()
            })
            .await
            .unwrap();

        assert_eq!(outcome.mode, AnswerMode::Normal);
        assert_eq!(outcome.docs_count, 0);
        assert!(!outcome.fallback);
        assert_eq!(llm.calls.lock().unwrap()[0], vec![ChatMessage::user("hello")]);
    }

    #[tokio::test]
    async fn refund_policy_query_returns_two_ranked_hits() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let llm = Arc::new(RecordingLlm::default());
        let service = service_with(
            &settings(500),
            Arc::new(KeywordEmbedder),
            store.clone(),
            llm.clone(),
        );

        for (title, content) in [
            ("Shipping", "Orders ship in two days."),
            ("Refunds", "A refund is issued within 30 days."),
            ("Careers", "We are hiring engineers."),
            ("Refund exceptions", "Gift cards get no refund."),
            ("Office", "The office opens at nine."),
        ] {
            service
                .ingest(ingest_request(title, content.to_string()))
                .await
                .unwrap();
        }

        let outcome = service
            .query(QueryRequest {
                query: "refund policy".to_string(),
                top_k: Some(3),
                debug: true,
                ..QueryRequest::default()
            })
            .await
            .unwrap();

        assert_eq!(outcome.mode, AnswerMode::Rag);
        assert_eq!(outcome.docs_count, 2);
        assert_eq!(outcome.hit_docs, vec!["Refunds", "Refund exceptions"]);
        assert_eq!(outcome.namespace.as_deref(), Some(""));

        let calls = llm.calls.lock().unwrap();
        let messages = &calls[0];
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
        assert!(messages[1].content.contains("[Knowledge 1 - Refunds]"));
        assert!(messages[1].content.contains("[Knowledge 2 - Refund exceptions]"));
        assert!(messages[1].content.ends_with("Question: refund policy"));
    }

    #[tokio::test]
    async fn hit_titles_are_omitted_without_debug() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let llm = Arc::new(RecordingLlm::default());
        let service = service_with(&settings(500), Arc::new(StubEmbedder), store, llm);

        service
            .ingest(IngestRequest {
                title: "Doc".to_string(),
                content: "body".to_string(),
                source: Some("wiki".to_string()),
                namespace: Some("hr".to_string()),
            })
            .await
            .unwrap();

        let outcome = service
            .query(QueryRequest {
                query: "anything".to_string(),
                namespace: Some("hr".to_string()),
                ..QueryRequest::default()
            })
            .await
            .unwrap();
        assert_eq!(outcome.docs_count, 1);
        assert!(outcome.hit_docs.is_empty());
        assert_eq!(outcome.namespace.as_deref(), Some("hr"));

        let other = service
            .query(QueryRequest {
                query: "anything".to_string(),
                namespace: Some("finance".to_string()),
                ..QueryRequest::default()
            })
            .await
            .unwrap();
        assert_eq!(other.mode, AnswerMode::Fallback);
    }

    #[tokio::test]
    async fn query_embedding_failure_makes_no_llm_call() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let llm = Arc::new(RecordingLlm::default());
        let service = service_with(
            &settings(500),
            Arc::new(FailingEmbedder),
            store,
            llm.clone(),
        );

        let err = service
            .query(QueryRequest {
                query: "hello".to_string(),
                ..QueryRequest::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));
        assert!(llm.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn generation_failure_is_not_replaced_by_fallback() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let llm = Arc::new(RecordingLlm {
            fail: true,
            ..RecordingLlm::default()
        });
        let service = service_with(&settings(500), Arc::new(StubEmbedder), store, llm.clone());

        let err = service
            .query(QueryRequest {
                query: "hello".to_string(),
                ..QueryRequest::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Generation(_)));
        assert_eq!(llm.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let llm = Arc::new(RecordingLlm::default());
        let service = service_with(&settings(500), Arc::new(StubEmbedder), store, llm.clone());

        assert!(matches!(
            service.query(QueryRequest::default()).await,
            Err(RagError::InvalidInput(_))
        ));
        assert!(llm.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_vector_fails_ingestion_before_any_write() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let llm = Arc::new(RecordingLlm::default());
        let service = service_with(&settings(5), Arc::new(HoleyEmbedder), store.clone(), llm);

        let err = service
            .ingest(ingest_request("Doc", "abcdezzzzz".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn raw_query_and_title_reach_llm_and_store_untrimmed() {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let llm = Arc::new(RecordingLlm::default());
        let service = service_with(&settings(500), Arc::new(StubEmbedder), store, llm.clone());

        let chunks = service
            .ingest(ingest_request(" Handbook ", "body".to_string()))
            .await
            .unwrap();
        assert_eq!(chunks[0].title, " Handbook ");

        service
            .query(QueryRequest {
                query: "  spaced question \n".to_string(),
                mode: QueryMode::Normal,
                ..QueryRequest::default()
            })
            .await
            .unwrap();
        assert_eq!(
            llm.calls.lock().unwrap()[0],
            vec![ChatMessage::user("  spaced question \n")]
        );
    }

    #[test]
    fn zero_overlap_setting_is_checked_after_defaults() {
        let store: Arc<dyn KnowledgeStore> = Arc::new(InMemoryKnowledgeStore::new());
        let search = Arc::new(LinearScanSearch::new(store.clone(), 0.0));
        let result = RagService::new(
            &RagSettings {
                chunk_size: 40,
                chunk_overlap: 0,
                ..RagSettings::default()
            },
            Arc::new(StubEmbedder),
            store,
            search,
            Arc::new(RecordingLlm::default()),
        );
        assert!(matches!(result, Err(RagError::Config(_))));
    }

    #[test]
    fn overlap_not_below_chunk_size_fails_construction() {
        let store: Arc<dyn KnowledgeStore> = Arc::new(InMemoryKnowledgeStore::new());
        let search = Arc::new(LinearScanSearch::new(store.clone(), 0.0));
        let result = RagService::new(
            &RagSettings {
                chunk_size: 10,
                chunk_overlap: 10,
                ..RagSettings::default()
            },
            Arc::new(StubEmbedder),
            store,
            search,
            Arc::new(RecordingLlm::default()),
        );
        assert!(matches!(result, Err(RagError::Config(_))));
    }
}
