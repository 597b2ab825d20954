pub mod gemini;

pub use gemini::{GeminiClient, RetryPolicy};

use crate::Result;

/// Task hint forwarded to the embedding service so document and query
/// vectors land in the same retrieval-tuned space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    RetrievalDocument,
    RetrievalQuery,
}

impl TaskType {
    #[inline]
    pub fn as_api_str(self) -> &'static str {
        match self {
            TaskType::RetrievalDocument => "RETRIEVAL_DOCUMENT",
            TaskType::RetrievalQuery => "RETRIEVAL_QUERY",
        }
    }
}

/// Converts text into fixed-dimension vectors. The pipeline and answerer
/// depend on this seam so tests can substitute a deterministic service.
pub trait Embedder {
    fn embed(&self, text: &str, task: TaskType) -> Result<Vec<f32>>;

    #[inline]
    fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text, TaskType::RetrievalDocument)
    }

    #[inline]
    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text, TaskType::RetrievalQuery)
    }
}

/// Single-shot text generation, no streaming.
pub trait TextGenerator {
    fn generate(&self, prompt: &str) -> Result<String>;
}
