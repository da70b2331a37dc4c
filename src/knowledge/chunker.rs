//! Text Chunking Module
//!
//! 페이지 순서대로 텍스트를 이어 붙이며 고정 길이(문자 수) 청크로 자릅니다.
//! 청크 사이에는 설정된 만큼 겹치는 구간이 있습니다.

use serde::{Deserialize, Serialize};

use crate::error::RagError;
use crate::extractor::{BookMetadata, PageText};

/// 토큰당 문자 수 근사치
pub const CHARS_PER_TOKEN: usize = 4;

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkConfig {
    /// 청크 크기 (문자 수)
    pub chunk_characters: usize,
    /// 오버랩 크기 (문자 수)
    pub overlap_characters: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self::from_tokens(
            crate::config::DEFAULT_CHUNK_SIZE,
            crate::config::DEFAULT_CHUNK_OVERLAP,
        )
    }
}

impl ChunkConfig {
    /// 토큰 단위 설정을 문자 단위로 변환
    pub fn from_tokens(chunk_tokens: usize, overlap_tokens: usize) -> Self {
        Self {
            chunk_characters: chunk_tokens * CHARS_PER_TOKEN,
            overlap_characters: overlap_tokens * CHARS_PER_TOKEN,
        }
    }

    /// 오버랩은 청크 크기보다 작아야 합니다 (아니면 진행하지 않음)
    pub fn validate(&self) -> Result<(), RagError> {
        if self.chunk_characters == 0 || self.overlap_characters >= self.chunk_characters {
            return Err(RagError::InvalidChunkConfig {
                size: self.chunk_characters,
                overlap: self.overlap_characters,
            });
        }
        Ok(())
    }

    /// 다음 청크 시작 위치까지의 거리
    fn stride(&self) -> usize {
        self.chunk_characters - self.overlap_characters
    }
}

// ============================================================================
// Chunk
// ============================================================================

/// 교재 청크
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// "{book_name}_chunk_{chunk_index}"
    pub id: String,
    /// 교재 내 순번 (0부터)
    pub chunk_index: u32,
    pub book_name: String,
    /// 청크가 만들어질 때 읽고 있던 페이지
    pub page: u32,
    /// 원본 파일 경로
    pub source: String,
    pub text: String,
}

impl Chunk {
    pub fn make_id(book_name: &str, chunk_index: u32) -> String {
        format!("{}_chunk_{}", book_name, chunk_index)
    }
}

// ============================================================================
// PageChunker
// ============================================================================

/// 페이지 인식 고정 길이 청커
#[derive(Debug, Clone)]
pub struct PageChunker {
    config: ChunkConfig,
}

impl PageChunker {
    /// 설정 검증 후 생성
    pub fn new(config: ChunkConfig) -> Result<Self, RagError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// 페이지들을 청크로 분할
    pub fn chunk_pages(&self, metadata: &BookMetadata, pages: &[PageText]) -> Vec<Chunk> {
        let size = self.config.chunk_characters;
        let stride = self.config.stride();
        let source = metadata.file_path.display().to_string();

        let mut builder = ChunkBuilder {
            book_name: &metadata.book_name,
            source: &source,
            chunks: Vec::new(),
        };

        // 문자 단위 버퍼 (UTF-8 경계 문제 회피)
        let mut buffer: Vec<char> = Vec::new();
        let mut last_page = 0;

        for page in pages {
            last_page = page.page;
            if page.text.is_empty() {
                continue;
            }

            if !buffer.is_empty() {
                buffer.push(' ');
            }
            buffer.extend(page.text.chars());

            while buffer.len() >= size {
                builder.push(&buffer[..size], page.page);
                buffer.drain(..stride);
            }
        }

        builder.push(&buffer, last_page);
        builder.chunks
    }
}

struct ChunkBuilder<'a> {
    book_name: &'a str,
    source: &'a str,
    chunks: Vec<Chunk>,
}

impl ChunkBuilder<'_> {
    fn push(&mut self, chars: &[char], page: u32) {
        let text: String = chars.iter().collect();
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        let chunk_index = self.chunks.len() as u32;
        self.chunks.push(Chunk {
            id: Chunk::make_id(self.book_name, chunk_index),
            chunk_index,
            book_name: self.book_name.to_string(),
            page,
            source: self.source.to_string(),
            text: text.to_string(),
        });
    }
}

// ============================================================================
// Tests
// ============================================================================
