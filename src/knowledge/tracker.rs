//! Book Tracker - 처리된 교재 추적
//!
//! 파일 이름을 키로 내용 해시(MD5)를 JSON 파일에 기록합니다.
//! 해시가 바뀐 교재는 새 교재로 취급되어 다시 인덱싱됩니다.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::list_pdfs;

/// 해시 계산 시 읽기 블록 크기
const HASH_BLOCK_SIZE: usize = 4096;

// ============================================================================
// Types
// ============================================================================

/// 처리된 교재 기록
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookRecord {
    pub file_path: String,
    pub file_hash: String,
    pub chunk_count: usize,
    pub processed_date: DateTime<Utc>,
    pub file_size: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TrackerFile {
    #[serde(default)]
    processed_books: BTreeMap<String, BookRecord>,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
}

/// 추적 통계
#[derive(Debug, Clone, Serialize)]
pub struct TrackerStats {
    pub total_books_processed: usize,
    pub total_chunks: usize,
    pub books: Vec<String>,
}

// ============================================================================
// BookTracker
// ============================================================================

/// JSON 파일 기반 교재 추적기
pub struct BookTracker {
    path: PathBuf,
    data: TrackerFile,
}

impl BookTracker {
    /// 추적 파일 열기 (없거나 손상되었으면 빈 상태로 시작)
    pub fn open(path: &Path) -> Self {
        let data = match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<TrackerFile>(&content) {
                Ok(data) => data,
                Err(e) => {
                    tracing::error!("Error loading tracking data from {:?}: {}", path, e);
                    TrackerFile::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => TrackerFile::default(),
            Err(e) => {
                tracing::error!("Error reading tracking file {:?}: {}", path, e);
                TrackerFile::default()
            }
        };

        tracing::debug!(
            "Book tracker loaded: {} books from {:?}",
            data.processed_books.len(),
            path
        );

        Self {
            path: path.to_path_buf(),
            data,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 파일 내용의 MD5 해시 (hex)
    pub fn file_hash(path: &Path) -> Result<String> {
        let mut file =
            File::open(path).with_context(|| format!("Failed to open file for hashing: {:?}", path))?;
        let mut context = md5::Context::new();
        let mut block = [0u8; HASH_BLOCK_SIZE];

        loop {
            let n = file
                .read(&mut block)
                .with_context(|| format!("Failed to read file for hashing: {:?}", path))?;
            if n == 0 {
                break;
            }
            context.consume(&block[..n]);
        }

        Ok(format!("{:x}", context.compute()))
    }

    /// 이미 처리되었고 내용이 바뀌지 않았는지
    pub fn is_processed(&self, path: &Path) -> bool {
        let Some(record) = self.data.processed_books.get(&file_name(path)) else {
            return false;
        };

        match Self::file_hash(path) {
            Ok(hash) => record.file_hash == hash,
            Err(e) => {
                tracing::warn!("Cannot hash {:?}: {}", path, e);
                false
            }
        }
    }

    /// 처리 완료 기록 후 저장
    pub fn mark_as_processed(&mut self, path: &Path, chunk_count: usize) -> Result<()> {
        let file_hash = Self::file_hash(path)?;
        let file_size = std::fs::metadata(path)
            .with_context(|| format!("Failed to stat {:?}", path))?
            .len();

        let name = file_name(path);
        self.data.processed_books.insert(
            name.clone(),
            BookRecord {
                file_path: path.display().to_string(),
                file_hash,
                chunk_count,
                processed_date: Utc::now(),
                file_size,
            },
        );
        self.save()?;

        tracing::info!("Marked {} as processed ({} chunks)", name, chunk_count);
        Ok(())
    }

    /// 디렉토리에서 새로 추가되었거나 수정된 교재 목록
    pub fn new_books(&self, dir: &Path) -> Vec<PathBuf> {
        if !dir.exists() {
            tracing::warn!("Books directory not found: {:?}", dir);
            return vec![];
        }

        list_pdfs(dir)
            .into_iter()
            .filter(|path| !self.is_processed(path))
            .collect()
    }

    /// 처리된 교재 이름 (정렬)
    pub fn processed_books(&self) -> Vec<String> {
        self.data.processed_books.keys().cloned().collect()
    }

    pub fn book_info(&self, name: &str) -> Option<&BookRecord> {
        self.data.processed_books.get(name)
    }

    /// 교재 기록 삭제 (있었으면 true)
    pub fn remove_book(&mut self, name: &str) -> Result<bool> {
        if self.data.processed_books.remove(name).is_none() {
            return Ok(false);
        }
        self.save()?;
        tracing::info!("Removed {} from tracking", name);
        Ok(true)
    }

    /// 모든 기록 삭제
    pub fn clear_all(&mut self) -> Result<()> {
        self.data.processed_books.clear();
        self.save()?;
        tracing::info!("Cleared all tracking data");
        Ok(())
    }

    pub fn stats(&self) -> TrackerStats {
        TrackerStats {
            total_books_processed: self.data.processed_books.len(),
            total_chunks: self
                .data
                .processed_books
                .values()
                .map(|r| r.chunk_count)
                .sum(),
            books: self.processed_books(),
        }
    }

    /// 추적 파일 저장 (전체 덮어쓰기)
    fn save(&mut self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }

        self.data.last_updated = Some(Utc::now());
        let json = serde_json::to_string_pretty(&self.data)
            .context("Failed to serialize tracking data")?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write tracking file: {:?}", self.path))?;
        Ok(())
    }
}

/// 추적 키 (파일 이름)
fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_book(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_file_hash_is_md5_hex() {
        let dir = TempDir::new().unwrap();
        let path = write_book(dir.path(), "a.pdf", b"abc");
        assert_eq!(
            BookTracker::file_hash(&path).unwrap(),
            "900150983cd24fb0d6963f7d28e17f72"
        );
    }

    #[test]
    fn test_file_hash_large_file_spans_blocks() {
        let dir = TempDir::new().unwrap();
        let content = vec![7u8; HASH_BLOCK_SIZE * 3 + 17];
        let path = write_book(dir.path(), "big.pdf", &content);

        let expected = format!("{:x}", md5::compute(&content));
        assert_eq!(BookTracker::file_hash(&path).unwrap(), expected);
    }

    #[test]
    fn test_mark_and_detect_changes() {
        let dir = TempDir::new().unwrap();
        let books = dir.path().join("books");
        std::fs::create_dir_all(&books).unwrap();
        let perry = write_book(&books, "Perry.pdf", b"version 1");
        write_book(&books, "McCabe.pdf", b"mccabe");

        let mut tracker = BookTracker::open(&dir.path().join("book_tracker.json"));
        assert_eq!(tracker.new_books(&books).len(), 2);

        tracker.mark_as_processed(&perry, 42).unwrap();
        assert!(tracker.is_processed(&perry));
        assert_eq!(tracker.new_books(&books), vec![books.join("McCabe.pdf")]);

        // 내용이 바뀌면 다시 새 교재
        std::fs::write(&perry, b"version 2").unwrap();
        assert!(!tracker.is_processed(&perry));
        assert_eq!(tracker.new_books(&books).len(), 2);
    }

    #[test]
    fn test_persistence_and_stats() {
        let dir = TempDir::new().unwrap();
        let tracker_path = dir.path().join("data").join("book_tracker.json");
        let a = write_book(dir.path(), "A.pdf", b"a");
        let b = write_book(dir.path(), "B.pdf", b"bb");

        {
            let mut tracker = BookTracker::open(&tracker_path);
            tracker.mark_as_processed(&a, 10).unwrap();
            tracker.mark_as_processed(&b, 5).unwrap();
        }

        let tracker = BookTracker::open(&tracker_path);
        let stats = tracker.stats();
        assert_eq!(stats.total_books_processed, 2);
        assert_eq!(stats.total_chunks, 15);
        assert_eq!(stats.books, vec!["A.pdf".to_string(), "B.pdf".to_string()]);

        let info = tracker.book_info("B.pdf").unwrap();
        assert_eq!(info.file_size, 2);
        assert_eq!(info.chunk_count, 5);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&tracker_path).unwrap()).unwrap();
        assert!(raw["processed_books"]["A.pdf"]["file_hash"].is_string());
        assert!(raw["last_updated"].is_string());
    }

    #[test]
    fn test_remove_and_clear() {
        let dir = TempDir::new().unwrap();
        let a = write_book(dir.path(), "A.pdf", b"a");
        let mut tracker = BookTracker::open(&dir.path().join("t.json"));
        tracker.mark_as_processed(&a, 1).unwrap();

        assert!(tracker.remove_book("A.pdf").unwrap());
        assert!(!tracker.remove_book("A.pdf").unwrap());

        tracker.mark_as_processed(&a, 1).unwrap();
        tracker.clear_all().unwrap();
        assert!(tracker.processed_books().is_empty());
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.json");
        std::fs::write(&path, "{ not json").unwrap();

        let tracker = BookTracker::open(&path);
        assert_eq!(tracker.stats().total_books_processed, 0);
    }

    #[test]
    fn test_missing_dir_has_no_new_books() {
        let dir = TempDir::new().unwrap();
        let tracker = BookTracker::open(&dir.path().join("t.json"));
        assert!(tracker.new_books(&dir.path().join("nope")).is_empty());
    }
}
