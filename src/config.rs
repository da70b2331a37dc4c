//! 설정 모듈
//!
//! 환경변수(.env 포함)에서 설정을 읽고 데이터 디렉토리 구조를 관리합니다.
//!
//! 데이터 위치: ~/.textbook-rag/
//! - books/            입력 PDF
//! - vectors.lance/    LanceDB 벡터 인덱스
//! - book_tracker.json 처리된 교재 목록
//! - history.db        질의응답 기록
//! - exports/          PDF/DOCX 내보내기
//! - logs/             로그 파일

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};

use crate::error::RagError;

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_SUBJECT: &str = "Chemical Engineering";
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;
pub const DEFAULT_TOP_K: usize = 8;
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 768;
pub const DEFAULT_LLM_MODEL: &str = "gemini-2.5-flash";

/// API 키 환경변수 (우선순위 순)
const API_KEY_VARS: [&str; 3] = ["GOOGLE_API_KEY", "GEMINI_API_KEY", "GOOGLE_AI_API_KEY"];

/// 기본 데이터 디렉토리 경로 (~/.textbook-rag/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".textbook-rag")
}

// ============================================================================
// Settings
// ============================================================================

/// LLM 생성 파라미터
#[derive(Debug, Clone, PartialEq)]
pub struct LlmSettings {
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub top_p: f32,
    pub top_k: u32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_LLM_MODEL.to_string(),
            temperature: 0.7,
            max_output_tokens: 4096,
            top_p: 0.95,
            top_k: 40,
        }
    }
}

/// 애플리케이션 설정
#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub books_dir: PathBuf,
    pub api_key: Option<String>,
    /// 프롬프트와 내보내기 제목에 쓰이는 분야 이름
    pub subject: String,
    /// 청크 크기 (토큰, 1 토큰 ≈ 4 문자)
    pub chunk_size: usize,
    /// 청크 오버랩 (토큰)
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub embedding_dimension: usize,
    pub llm: LlmSettings,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = get_data_dir();
        Self {
            books_dir: data_dir.join("books"),
            data_dir,
            api_key: None,
            subject: DEFAULT_SUBJECT.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            top_k: DEFAULT_TOP_K,
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            llm: LlmSettings::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// 프로세스 환경변수에서 설정 로드
    ///
    /// 호출 전에 `dotenvy::dotenv()`로 .env를 읽어두면 그 값도 반영됩니다.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 임의의 조회 함수로 설정 로드 (테스트용으로도 사용)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut settings = Self::default();

        if let Some(dir) = get("RAG_DATA_DIR") {
            settings.data_dir = PathBuf::from(dir);
            settings.books_dir = settings.data_dir.join("books");
        }
        if let Some(dir) = get("RAG_BOOKS_DIR") {
            settings.books_dir = PathBuf::from(dir);
        }

        settings.api_key = API_KEY_VARS.iter().find_map(|key| get(key));

        if let Some(subject) = get("RAG_SUBJECT") {
            settings.subject = subject;
        }
        if let Some(level) = get("LOG_LEVEL") {
            settings.log_level = level.to_lowercase();
        }

        settings.chunk_size = parse_or("RAG_CHUNK_SIZE", get("RAG_CHUNK_SIZE"), settings.chunk_size)?;
        settings.chunk_overlap =
            parse_or("RAG_CHUNK_OVERLAP", get("RAG_CHUNK_OVERLAP"), settings.chunk_overlap)?;
        settings.top_k = parse_or("RAG_TOP_K", get("RAG_TOP_K"), settings.top_k)?;
        settings.embedding_dimension = parse_or(
            "RAG_EMBEDDING_DIMENSION",
            get("RAG_EMBEDDING_DIMENSION"),
            settings.embedding_dimension,
        )?;

        if let Some(model) = get("RAG_LLM_MODEL") {
            settings.llm.model = model;
        }
        settings.llm.temperature =
            parse_or("RAG_LLM_TEMPERATURE", get("RAG_LLM_TEMPERATURE"), settings.llm.temperature)?;
        settings.llm.max_output_tokens = parse_or(
            "RAG_LLM_MAX_TOKENS",
            get("RAG_LLM_MAX_TOKENS"),
            settings.llm.max_output_tokens,
        )?;
        settings.llm.top_p = parse_or("RAG_LLM_TOP_P", get("RAG_LLM_TOP_P"), settings.llm.top_p)?;
        settings.llm.top_k = parse_or("RAG_LLM_TOP_K", get("RAG_LLM_TOP_K"), settings.llm.top_k)?;

        Ok(settings)
    }

    /// 데이터 디렉토리 재지정 (하위 경로 포함)
    pub fn with_data_dir(mut self, data_dir: PathBuf) -> Self {
        if self.books_dir == self.data_dir.join("books") {
            self.books_dir = data_dir.join("books");
        }
        self.data_dir = data_dir;
        self
    }

    pub fn vectors_path(&self) -> PathBuf {
        self.data_dir.join("vectors.lance")
    }

    pub fn tracker_path(&self) -> PathBuf {
        self.data_dir.join("book_tracker.json")
    }

    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join("history.db")
    }

    pub fn export_dir(&self) -> PathBuf {
        self.data_dir.join("exports")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// API 키 반환 (없으면 설정 안내 에러)
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| RagError::MissingApiKey.into())
    }

    /// 필요한 디렉토리 생성
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            self.data_dir.clone(),
            self.books_dir.clone(),
            self.export_dir(),
            self.log_dir(),
        ] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory: {:?}", dir))?;
        }
        Ok(())
    }

    /// 교재 디렉토리의 PDF 개수
    pub fn books_in_dir(&self) -> usize {
        list_pdfs(&self.books_dir).len()
    }
}

/// 디렉토리 바로 아래의 PDF 파일 목록 (이름순)
///
/// 벡터는 확장자를 뺀 교재 이름으로 저장되므로, 이름이 겹치는 파일
/// (예: `Foo.pdf`, `Foo.PDF`)은 첫 파일만 남기고 경고합니다.
pub fn list_pdfs(dir: &Path) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return vec![];
    }

    let mut pdfs: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("pdf"))
                .unwrap_or(false)
        })
        .collect();

    pdfs.sort();

    let mut seen = std::collections::HashSet::new();
    pdfs.retain(|path| {
        let book_name = crate::extractor::extract_book_name(path);
        if seen.insert(book_name.clone()) {
            true
        } else {
            tracing::warn!(
                "Skipping {:?}: another PDF already uses the book name '{}'",
                path,
                book_name
            );
            false
        }
    });
    pdfs
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T> {
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse::<T>().map_err(|_| {
            RagError::Config {
                key: key.to_string(),
                value,
            }
            .into()
        }),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(|_| None).unwrap();
        assert_eq!(settings.chunk_size, 1000);
        assert_eq!(settings.chunk_overlap, 200);
        assert_eq!(settings.top_k, 8);
        assert_eq!(settings.llm.model, "gemini-2.5-flash");
        assert_eq!(settings.subject, "Chemical Engineering");
        assert!(settings.api_key.is_none());
        assert_eq!(settings.books_dir, settings.data_dir.join("books"));
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("RAG_DATA_DIR", "/tmp/rag"),
            ("RAG_TOP_K", "3"),
            ("RAG_LLM_TEMPERATURE", "0.2"),
            ("RAG_SUBJECT", "Thermodynamics"),
        ]))
        .unwrap();

        assert_eq!(settings.data_dir, PathBuf::from("/tmp/rag"));
        assert_eq!(settings.books_dir, PathBuf::from("/tmp/rag/books"));
        assert_eq!(settings.top_k, 3);
        assert!((settings.llm.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(settings.subject, "Thermodynamics");
    }

    #[test]
    fn test_api_key_priority() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("GEMINI_API_KEY", "second"),
            ("GOOGLE_API_KEY", "first"),
        ]))
        .unwrap();
        assert_eq!(settings.api_key.as_deref(), Some("first"));

        // 빈 값은 건너뜀
        let settings = Settings::from_lookup(lookup_from(&[
            ("GOOGLE_API_KEY", "  "),
            ("GOOGLE_AI_API_KEY", "third"),
        ]))
        .unwrap();
        assert_eq!(settings.api_key.as_deref(), Some("third"));
    }

    #[test]
    fn test_invalid_number_names_variable() {
        let err = Settings::from_lookup(lookup_from(&[("RAG_TOP_K", "many")])).unwrap_err();
        assert!(err.to_string().contains("RAG_TOP_K"));
    }

    #[test]
    fn test_require_api_key() {
        let settings = Settings::from_lookup(|_| None).unwrap();
        assert!(settings.require_api_key().is_err());
    }

    #[test]
    fn test_with_data_dir_moves_default_books_dir() {
        let settings = Settings::default().with_data_dir(PathBuf::from("/srv/rag"));
        assert_eq!(settings.books_dir, PathBuf::from("/srv/rag/books"));
        assert_eq!(settings.vectors_path(), PathBuf::from("/srv/rag/vectors.lance"));
    }

    #[test]
    fn test_list_pdfs() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.pdf"), b"%PDF").unwrap();
        std::fs::write(dir.path().join("a.PDF"), b"%PDF").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("c.pdf"), b"%PDF").unwrap();

        let pdfs = list_pdfs(dir.path());
        let names: Vec<_> = pdfs
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.PDF", "b.pdf"]);

        assert!(list_pdfs(&dir.path().join("missing")).is_empty());
    }

    #[test]
    fn test_list_pdfs_skips_duplicate_book_names() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Foo.pdf"), b"%PDF").unwrap();
        std::fs::write(dir.path().join("Foo.PDF"), b"%PDF").unwrap();
        std::fs::write(dir.path().join("Bar.pdf"), b"%PDF").unwrap();

        let names: Vec<_> = list_pdfs(dir.path())
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["Bar.pdf", "Foo.PDF"]);
    }
}
