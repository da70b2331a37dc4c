//! 에러 타입
//!
//! 호출자가 분기해야 하는 조건만 타입으로 정의합니다.
//! 나머지는 `anyhow::Context`로 문맥을 붙여 전파합니다.

use std::path::PathBuf;

use thiserror::Error;

/// RAG 도메인 에러
#[derive(Error, Debug)]
pub enum RagError {
    #[error(
        "API key not found. Set GOOGLE_API_KEY (or GEMINI_API_KEY / GOOGLE_AI_API_KEY) \
         in the environment or in a .env file.\n\
         Get your API key at: https://aistudio.google.com/app/apikey"
    )]
    MissingApiKey,

    #[error("Invalid value for {key}: {value:?}")]
    Config { key: String, value: String },

    #[error("Books directory not found: {0}")]
    BooksDirNotFound(PathBuf),

    #[error("No PDF files found in {0}")]
    NoPdfFiles(PathBuf),

    #[error("PDF file not found: {0}")]
    PdfNotFound(PathBuf),

    #[error("Invalid chunk config: overlap ({overlap}) must be smaller than chunk size ({size})")]
    InvalidChunkConfig { size: usize, overlap: usize },

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Gemini API error ({status}): {message}")]
    Api { status: String, message: String },
}
