//! textbook-rag - 교재 PDF 기반 RAG 질의응답 시스템
//!
//! 교재 PDF를 페이지 단위로 추출해 고정 길이 청크로 나누고,
//! Gemini 임베딩과 LanceDB 벡터 검색으로 찾은 문맥을 바탕으로
//! 출처(교재, 페이지)가 달린 답변을 생성합니다.

pub mod citation;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod export;
pub mod extractor;
pub mod gemini;
pub mod history;
pub mod knowledge;
pub mod llm;
pub mod logging;
pub mod rag;

// Re-exports
pub use config::{get_data_dir, Settings};
pub use embedding::{EmbeddingProvider, GeminiEmbedding};
pub use error::RagError;
pub use export::{ExportFormat, Exporter};
pub use extractor::{extract_book, BookMetadata, ExtractedBook, PageText};
pub use history::{HistoryEntry, HistoryStore};
pub use knowledge::{
    BookRecord, BookTracker, Chunk, ChunkConfig, DocumentProcessor, LanceVectorStore,
    PageChunker, SearchHit, VectorEntry, VectorStore,
};
pub use llm::{GeminiChat, LanguageModel};
pub use rag::{QueryMode, QueryResponse, RagEngine, Source};
