//! Vector Store - 벡터 검색 트레이트 및 유틸리티
//!
//! 구현체는 LanceDB ANN 검색을 사용합니다 (lance.rs).

use anyhow::Result;
use async_trait::async_trait;

use super::chunker::Chunk;

// ============================================================================
// Types
// ============================================================================

/// 벡터 엔트리 (저장용)
#[derive(Debug, Clone)]
pub struct VectorEntry {
    pub chunk: Chunk,
    /// 임베딩 벡터
    pub embedding: Vec<f32>,
}

/// 검색 결과
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub book_name: String,
    pub page: u32,
    pub chunk_index: u32,
    pub source: String,
    pub text: String,
    /// 원시 거리 (L2)
    pub distance: f32,
    /// 유사도 스코어 1 / (1 + distance)
    pub similarity: f32,
}

impl SearchHit {
    pub fn new(chunk: Chunk, distance: f32) -> Self {
        Self {
            id: chunk.id,
            book_name: chunk.book_name,
            page: chunk.page,
            chunk_index: chunk.chunk_index,
            source: chunk.source,
            text: chunk.text,
            distance,
            similarity: distance_to_similarity(distance),
        }
    }
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// VectorStore 트레이트 (async)
///
/// 벡터 저장소의 공통 인터페이스입니다.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 벡터 배치 삽입
    async fn insert_batch(&self, entries: &[VectorEntry]) -> Result<usize>;

    /// 벡터 검색 (book이 주어지면 해당 교재만)
    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        book: Option<&str>,
    ) -> Result<Vec<SearchHit>>;

    /// 교재 이름으로 벡터 삭제
    async fn delete_book(&self, book_name: &str) -> Result<usize>;

    /// 벡터 개수 조회
    async fn count(&self) -> Result<usize>;

    /// 교재 존재 여부
    async fn has_book(&self, book_name: &str) -> Result<bool>;

    /// 인덱스에 있는 교재 이름 (정렬, 중복 제거)
    async fn book_names(&self) -> Result<Vec<String>>;

    /// 전체 삭제
    async fn clear(&self) -> Result<()>;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// L2 거리를 0.0 ~ 1.0 유사도로 변환
pub fn distance_to_similarity(distance: f32) -> f32 {
    1.0 / (1.0 + distance.max(0.0))
}

/// 필터 문자열용 작은따옴표 이스케이프
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_to_similarity() {
        assert_eq!(distance_to_similarity(0.0), 1.0);
        assert!((distance_to_similarity(1.0) - 0.5).abs() < 1e-6);
        assert!(distance_to_similarity(3.0) < distance_to_similarity(1.0));
        assert_eq!(distance_to_similarity(-0.5), 1.0);
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("Perry"), "'Perry'");
        assert_eq!(quote_literal("Smith's Handbook"), "'Smith''s Handbook'");
    }
}
