use thiserror::Error;

/// Failures surfaced by the ingestion and query pipeline.
///
/// An empty retrieval is not an error; it routes the query to the fallback path.
#[derive(Error, Debug)]
pub enum RagError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("embedding provider error: {0}")]
    Embedding(String),

    #[error("knowledge store error: {0}")]
    Storage(String),

    #[error("generation error: {0}")]
    Generation(String),
}

impl RagError {
    pub fn storage<E: std::fmt::Display>(err: E) -> Self {
        RagError::Storage(err.to_string())
    }

    pub fn embedding<E: std::fmt::Display>(err: E) -> Self {
        RagError::Embedding(err.to_string())
    }
}
