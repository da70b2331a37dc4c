//! Knowledge 모듈 - 교재 지식 저장소
//!
//! - Chunker: 페이지 인식 고정 길이 분할
//! - Processor: PDF 추출 + 청킹
//! - LanceDB: 벡터 검색 (ANN)
//! - Tracker: 처리된 교재 해시 추적 (JSON)

mod chunker;
mod lance;
mod processor;
mod tracker;
mod vector;

// Re-exports
pub use chunker::{Chunk, ChunkConfig, PageChunker, CHARS_PER_TOKEN};
pub use lance::LanceVectorStore;
pub use processor::DocumentProcessor;
pub use tracker::{BookRecord, BookTracker, TrackerStats};
pub use vector::{distance_to_similarity, SearchHit, VectorEntry, VectorStore};
