use thiserror::Error;

pub type Result<T> = std::result::Result<T, StudyError>;

#[derive(Error, Debug)]
pub enum StudyError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Model output could not be parsed as JSON")]
    MalformedOutput {
        /// Raw model output, preserved so callers can show it to the user
        /// instead of discarding generated content.
        raw: String,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod chunking;
pub mod commands;
pub mod config;
pub mod embeddings;
pub mod extract;
pub mod generate;
pub mod index;
pub mod pipeline;
pub mod qa;
pub mod storage;
