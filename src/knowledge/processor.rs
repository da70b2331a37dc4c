//! Document Processor - PDF 교재를 청크로 변환
//!
//! 추출(extractor)과 청킹(chunker)을 묶어 교재 단위/디렉토리 단위로 처리합니다.

use std::path::Path;
use std::time::Instant;

use anyhow::Result;

use super::chunker::{Chunk, ChunkConfig, PageChunker};
use crate::config::list_pdfs;
use crate::error::RagError;
use crate::extractor::{extract_book, ExtractedBook};

/// 교재 처리기
#[derive(Debug, Clone)]
pub struct DocumentProcessor {
    chunker: PageChunker,
}

impl DocumentProcessor {
    pub fn new(config: ChunkConfig) -> Result<Self> {
        Ok(Self {
            chunker: PageChunker::new(config)?,
        })
    }

    pub fn config(&self) -> &ChunkConfig {
        self.chunker.config()
    }

    /// 교재 하나를 추출하고 청크로 분할
    pub async fn process_book(&self, path: &Path) -> Result<Vec<Chunk>> {
        let book = extract_book(path).await?;
        Ok(self.chunk_book(&book))
    }

    /// 추출된 교재를 청크로 분할
    pub fn chunk_book(&self, book: &ExtractedBook) -> Vec<Chunk> {
        let started = Instant::now();
        let chunks = self.chunker.chunk_pages(&book.metadata, &book.pages);

        tracing::info!(
            "Chunked {}: {} chunks from {} pages in {:?}",
            book.metadata.book_name,
            chunks.len(),
            book.pages.len(),
            started.elapsed()
        );

        chunks
    }

    /// 디렉토리의 모든 PDF 처리 (실패한 교재는 건너뜀)
    pub async fn process_directory(&self, dir: &Path) -> Result<Vec<Chunk>> {
        if !dir.exists() {
            return Err(RagError::BooksDirNotFound(dir.to_path_buf()).into());
        }

        let pdfs = list_pdfs(dir);
        if pdfs.is_empty() {
            return Err(RagError::NoPdfFiles(dir.to_path_buf()).into());
        }

        tracing::info!("Processing {} PDF files in {:?}", pdfs.len(), dir);

        let mut all_chunks = Vec::new();
        for path in &pdfs {
            match self.process_book(path).await {
                Ok(chunks) => all_chunks.extend(chunks),
                Err(e) => tracing::error!("Failed to process {:?}: {:#}", path, e),
            }
        }

        tracing::info!("Total chunks created: {}", all_chunks.len());
        Ok(all_chunks)
    }
}

// ============================================================================
// Tests
// ============================================================================
