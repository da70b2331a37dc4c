//! 교재 추출 모듈
//!
//! PDF 교재에서 페이지별 텍스트와 메타데이터를 추출합니다.

pub mod pdf;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Instant;

use anyhow::{Context, Result};
use regex::Regex;

use crate::error::RagError;

// ============================================================================
// Extracted Book
// ============================================================================

/// 교재 메타데이터
#[derive(Debug, Clone, PartialEq)]
pub struct BookMetadata {
    /// 파일 이름(확장자 제외) - 인용과 필터링의 기준
    pub book_name: String,
    pub file_path: PathBuf,
    pub total_pages: usize,
    pub title: String,
    pub author: String,
}

impl BookMetadata {
    /// 파일 경로만으로 기본 메타데이터 생성
    pub fn from_path(path: &Path) -> Self {
        let book_name = extract_book_name(path);
        Self {
            title: book_name.clone(),
            book_name,
            file_path: path.to_path_buf(),
            total_pages: 0,
            author: "Unknown".to_string(),
        }
    }
}

/// 페이지 텍스트
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    /// 페이지 번호 (1부터 시작)
    pub page: u32,
    pub text: String,
}

/// 추출된 교재
#[derive(Debug, Clone)]
pub struct ExtractedBook {
    pub metadata: BookMetadata,
    pub pages: Vec<PageText>,
}

impl ExtractedBook {
    /// 전체 텍스트 길이 (문자 수)
    pub fn text_len(&self) -> usize {
        self.pages.iter().map(|p| p.text.chars().count()).sum()
    }
}

// ============================================================================
// Extraction
// ============================================================================

/// PDF 교재 추출 (CPU 바운드이므로 spawn_blocking 사용)
pub async fn extract_book(path: &Path) -> Result<ExtractedBook> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || extract_book_blocking(&path))
        .await
        .context("PDF extraction task failed")?
}

/// PDF 교재 추출 (동기)
pub fn extract_book_blocking(path: &Path) -> Result<ExtractedBook> {
    if !path.exists() {
        return Err(RagError::PdfNotFound(path.to_path_buf()).into());
    }

    let started = Instant::now();
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read PDF: {:?}", path))?;

    let raw_pages = pdf::extract_pages(&bytes)
        .with_context(|| format!("Failed to extract text from PDF: {:?}", path))?;

    let mut metadata = BookMetadata::from_path(path);
    match pdf::read_info(&bytes) {
        Ok(info) => {
            if let Some(title) = info.title {
                metadata.title = title;
            }
            if let Some(author) = info.author {
                metadata.author = author;
            }
            metadata.total_pages = info.page_count.unwrap_or(0);
        }
        Err(e) => tracing::debug!("No document info for {:?}: {}", path, e),
    }
    metadata.total_pages = metadata.total_pages.max(raw_pages.len());

    let pages: Vec<PageText> = raw_pages
        .iter()
        .enumerate()
        .map(|(i, text)| PageText {
            page: (i + 1) as u32,
            text: clean_text(text),
        })
        .collect();

    let book = ExtractedBook { metadata, pages };

    if book.pages.iter().all(|p| p.text.is_empty()) {
        tracing::warn!(
            "No text extracted from PDF: {:?}. It might be a scanned document.",
            path
        );
    }

    tracing::info!(
        "PDF loaded: {} | pages: {} | text: {} chars | {:?}",
        book.metadata.book_name,
        book.metadata.total_pages,
        book.text_len(),
        started.elapsed()
    );

    Ok(book)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 추출 텍스트 정규화 (연속 공백을 하나로, 양끝 공백 제거)
pub fn clean_text(text: &str) -> String {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    let re = WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"));
    re.replace_all(text, " ").trim().to_string()
}

/// 파일 경로에서 교재 이름 추출 (확장자 제외)
pub fn extract_book_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  Heat\n\ntransfer \t coefficient  "), "Heat transfer coefficient");
        assert_eq!(clean_text("\n\n"), "");
    }

    #[test]
    fn test_extract_book_name() {
        assert_eq!(
            extract_book_name(Path::new("/books/Perry Handbook.pdf")),
            "Perry Handbook"
        );
        assert_eq!(extract_book_name(Path::new("notes")), "notes");
    }

    #[test]
    fn test_metadata_defaults() {
        let meta = BookMetadata::from_path(Path::new("/books/Unit Operations.pdf"));
        assert_eq!(meta.book_name, "Unit Operations");
        assert_eq!(meta.title, "Unit Operations");
        assert_eq!(meta.author, "Unknown");
    }

    #[test]
    fn test_missing_pdf_is_error() {
        let err = extract_book_blocking(Path::new("/definitely/not/here.pdf")).unwrap_err();
        assert!(err.to_string().contains("PDF file not found"));
    }
}
