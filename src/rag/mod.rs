//! RAG 엔진 - 검색과 생성 조율
//!
//! 질문을 임베딩해 교재 청크를 찾고, 청크를 문맥으로 LLM 답변을 만듭니다.
//! 일반 지식 모드는 검색을 건너뛰고 LLM에 바로 묻습니다.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use futures::stream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::citation::format_citations_list;
use crate::config::{list_pdfs, Settings};
use crate::embedding::{EmbeddingProvider, GeminiEmbedding};
use crate::knowledge::{
    BookTracker, Chunk, DocumentProcessor, LanceVectorStore, SearchHit, VectorEntry, VectorStore,
};
use crate::llm::prompt::{general_knowledge_prompt, rag_prompt};
use crate::llm::{GeminiChat, LanguageModel, TextStream};

/// 일반 지식 모드 인용 문구
pub const GENERAL_KNOWLEDGE_CITATION: &str = "Based on general knowledge (not from textbooks)";
/// 검색 결과가 없을 때 (일반 질의)
pub const NO_RESULTS_ANSWER: &str =
    "I couldn't find relevant information in the books to answer this question.";
/// 검색 결과가 없을 때 (스트리밍)
pub const NO_RESULTS_STREAM: &str = "No relevant information found in the books.";

/// 미리보기 길이 (문자 수)
const PREVIEW_CHARS: usize = 200;
/// 인덱싱 시 한 번에 임베딩/삽입할 청크 수
const INDEX_BATCH_SIZE: usize = 100;

// ============================================================================
// Types
// ============================================================================

/// 질의 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    BookBased,
    GeneralKnowledge,
}

impl QueryMode {
    pub fn from_general(use_general_knowledge: bool) -> Self {
        if use_general_knowledge {
            Self::GeneralKnowledge
        } else {
            Self::BookBased
        }
    }

    /// 저장용 식별자
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BookBased => "book_based",
            Self::GeneralKnowledge => "general_knowledge",
        }
    }

    /// 표시용 이름
    pub fn label(&self) -> &'static str {
        match self {
            Self::BookBased => "Book Based",
            Self::GeneralKnowledge => "General Knowledge",
        }
    }
}

impl std::str::FromStr for QueryMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "book_based" => Ok(Self::BookBased),
            "general_knowledge" => Ok(Self::GeneralKnowledge),
            other => anyhow::bail!("Unknown query mode: {}", other),
        }
    }
}

/// 답변 출처
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub book: String,
    pub page: u32,
    pub text_preview: String,
}

impl Source {
    fn from_hit(hit: &SearchHit) -> Self {
        Self {
            book: hit.book_name.clone(),
            page: hit.page,
            text_preview: preview(&hit.text),
        }
    }
}

/// 질의 결과
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub question: String,
    pub answer: String,
    pub mode: QueryMode,
    pub sources: Vec<Source>,
    pub citations: String,
    #[serde(default)]
    pub book_filter: Option<String>,
}

/// 스트리밍 질의 결과
///
/// 출처는 검색 시점에 이미 정해져 있고, 답변만 스트림으로 나옵니다.
pub struct QueryStream {
    pub mode: QueryMode,
    pub sources: Vec<Source>,
    pub citations: String,
    pub stream: TextStream,
}

impl QueryStream {
    /// 스트림을 다 읽은 뒤 최종 결과로 변환
    pub fn into_response(self, question: &str, answer: String) -> QueryResponse {
        QueryResponse {
            question: question.to_string(),
            answer,
            mode: self.mode,
            sources: self.sources,
            citations: self.citations,
            book_filter: None,
        }
    }

    /// 스트림을 모두 모아 결과 생성
    pub async fn collect(mut self, question: &str) -> Result<QueryResponse> {
        let mut answer = String::new();
        while let Some(part) = self.stream.next().await {
            answer.push_str(&part?);
        }
        Ok(self.into_response(question, answer))
    }
}

/// 시스템 통계
#[derive(Debug, Clone, Serialize)]
pub struct SystemStats {
    pub total_chunks: usize,
    pub books: Vec<String>,
    pub llm_model: String,
    pub embedding_model: String,
    /// 청크 크기 (토큰)
    pub chunk_size: usize,
    pub top_k: usize,
}

/// 수집(ingest) 결과
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub new_books_processed: usize,
    pub skipped_books: usize,
    pub failed_books: usize,
    pub total_new_chunks: usize,
    pub new_book_names: Vec<String>,
    pub skipped_book_names: Vec<String>,
}

/// 엔진 옵션
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub subject: String,
    pub top_k: usize,
    /// 청크 크기 (토큰, 통계 표시용)
    pub chunk_size: usize,
}

impl EngineOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            subject: settings.subject.clone(),
            top_k: settings.top_k,
            chunk_size: settings.chunk_size,
        }
    }
}

// ============================================================================
// RagEngine
// ============================================================================

/// RAG 파이프라인
pub struct RagEngine {
    vector: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LanguageModel>,
    options: EngineOptions,
}

impl RagEngine {
    pub fn new(
        vector: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LanguageModel>,
        options: EngineOptions,
    ) -> Self {
        Self {
            vector,
            embedder,
            llm,
            options,
        }
    }

    /// 설정으로 Gemini + LanceDB 엔진 구성
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let api_key = settings.require_api_key()?.to_string();

        let embedder = GeminiEmbedding::with_dimension(api_key.clone(), settings.embedding_dimension)?;
        let llm = GeminiChat::new(api_key, settings.llm.clone(), &settings.subject)?;
        let vector = LanceVectorStore::open(&settings.vectors_path(), settings.embedding_dimension)
            .await
            .context("Failed to open vector store")?;

        tracing::info!(
            "RAG engine ready | llm: {} | embedding: {} ({}d)",
            llm.name(),
            embedder.name(),
            embedder.dimension()
        );

        Ok(Self::new(
            Arc::new(vector),
            Arc::new(embedder),
            Arc::new(llm),
            EngineOptions::from_settings(settings),
        ))
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// 청크 임베딩 후 벡터 저장소에 추가
    pub async fn index_chunks(&self, chunks: &[Chunk]) -> Result<usize> {
        if chunks.is_empty() {
            tracing::warn!("No chunks to index");
            return Ok(0);
        }

        let started = Instant::now();
        let mut inserted = 0;

        for batch in chunks.chunks(INDEX_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embeddings = self
                .embedder
                .embed_batch(&texts)
                .await
                .context("Failed to embed chunks")?;

            let entries: Vec<VectorEntry> = batch
                .iter()
                .cloned()
                .zip(embeddings)
                .map(|(chunk, embedding)| VectorEntry { chunk, embedding })
                .collect();

            inserted += self.vector.insert_batch(&entries).await?;
            tracing::debug!("Indexed {}/{} chunks", inserted, chunks.len());
        }

        tracing::info!("Indexed {} chunks in {:?}", inserted, started.elapsed());
        Ok(inserted)
    }

    /// 질문과 가까운 청크 검색
    pub async fn retrieve(
        &self,
        question: &str,
        top_k: Option<usize>,
        book: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        let k = top_k.unwrap_or(self.options.top_k);
        let embedding = self
            .embedder
            .embed_query(question)
            .await
            .context("Failed to embed question")?;
        let hits = self.vector.search(&embedding, k, book).await?;
        tracing::debug!("Retrieved {} chunks (top_k: {}, book: {:?})", hits.len(), k, book);
        Ok(hits)
    }

    /// 교재 기반 질의
    pub async fn query_books(
        &self,
        question: &str,
        top_k: Option<usize>,
    ) -> Result<(String, Vec<Source>)> {
        let started = Instant::now();
        tracing::info!("Query (books mode) | question: '{}'", log_preview(question));

        let hits = self.retrieve(question, top_k, None).await?;
        if hits.is_empty() {
            tracing::warn!("No relevant chunks found for query");
            return Ok((NO_RESULTS_ANSWER.to_string(), vec![]));
        }

        let prompt = rag_prompt(&self.options.subject, question, &hits);
        let answer = self.llm.generate(&prompt).await?;
        let sources: Vec<Source> = hits.iter().map(Source::from_hit).collect();

        tracing::info!(
            "Query completed | answer: {} chars | sources: {} | {:?}",
            answer.len(),
            sources.len(),
            started.elapsed()
        );
        Ok((answer, sources))
    }

    /// 일반 지식 질의 (검색 없음)
    pub async fn query_general_knowledge(&self, question: &str) -> Result<String> {
        tracing::info!("Query (general knowledge mode) | question: '{}'", log_preview(question));
        let prompt = general_knowledge_prompt(&self.options.subject, question);
        let answer = self.llm.generate(&prompt).await?;
        tracing::info!("General knowledge query completed | answer: {} chars", answer.len());
        Ok(answer)
    }

    /// 모드에 따라 질의
    pub async fn query(
        &self,
        question: &str,
        mode: QueryMode,
        top_k: Option<usize>,
    ) -> Result<QueryResponse> {
        match mode {
            QueryMode::GeneralKnowledge => {
                let answer = self.query_general_knowledge(question).await?;
                Ok(QueryResponse {
                    question: question.to_string(),
                    answer,
                    mode,
                    sources: vec![],
                    citations: GENERAL_KNOWLEDGE_CITATION.to_string(),
                    book_filter: None,
                })
            }
            QueryMode::BookBased => {
                let (answer, sources) = self.query_books(question, top_k).await?;
                Ok(QueryResponse {
                    question: question.to_string(),
                    answer,
                    mode,
                    citations: citations_for(&sources),
                    sources,
                    book_filter: None,
                })
            }
        }
    }

    /// 스트리밍 질의 (검색은 한 번만)
    pub async fn query_stream(
        &self,
        question: &str,
        mode: QueryMode,
        top_k: Option<usize>,
    ) -> Result<QueryStream> {
        tracing::info!(
            "Streaming query started | mode: {} | question: '{}'",
            mode.as_str(),
            log_preview(question)
        );

        match mode {
            QueryMode::GeneralKnowledge => {
                let prompt = general_knowledge_prompt(&self.options.subject, question);
                Ok(QueryStream {
                    mode,
                    sources: vec![],
                    citations: GENERAL_KNOWLEDGE_CITATION.to_string(),
                    stream: self.llm.stream(&prompt).await?,
                })
            }
            QueryMode::BookBased => {
                let hits = self.retrieve(question, top_k, None).await?;
                if hits.is_empty() {
                    tracing::warn!("{}", NO_RESULTS_STREAM);
                    return Ok(QueryStream {
                        mode,
                        sources: vec![],
                        citations: String::new(),
                        stream: stream::once(async { Ok(NO_RESULTS_STREAM.to_string()) }).boxed(),
                    });
                }

                let prompt = rag_prompt(&self.options.subject, question, &hits);
                let sources: Vec<Source> = hits.iter().map(Source::from_hit).collect();
                Ok(QueryStream {
                    mode,
                    citations: citations_for(&sources),
                    sources,
                    stream: self.llm.stream(&prompt).await?,
                })
            }
        }
    }

    /// 특정 교재 안에서만 검색
    pub async fn search_by_book(
        &self,
        question: &str,
        book_name: &str,
        top_k: Option<usize>,
    ) -> Result<QueryResponse> {
        tracing::info!(
            "Book-specific query | book: {} | question: '{}'",
            book_name,
            log_preview(question)
        );

        let hits = self.retrieve(question, top_k, Some(book_name)).await?;
        if hits.is_empty() {
            tracing::warn!("No relevant information found in book: {}", book_name);
            return Ok(QueryResponse {
                question: question.to_string(),
                answer: format!("No relevant information found in '{}'.", book_name),
                mode: QueryMode::BookBased,
                sources: vec![],
                citations: String::new(),
                book_filter: Some(book_name.to_string()),
            });
        }

        let prompt = rag_prompt(&self.options.subject, question, &hits);
        let answer = self.llm.generate(&prompt).await?;
        let sources: Vec<Source> = hits.iter().map(Source::from_hit).collect();

        Ok(QueryResponse {
            question: question.to_string(),
            answer,
            mode: QueryMode::BookBased,
            citations: citations_for(&sources),
            sources,
            book_filter: Some(book_name.to_string()),
        })
    }

    pub async fn system_stats(&self) -> Result<SystemStats> {
        let stats = SystemStats {
            total_chunks: self.vector.count().await?,
            books: self.vector.book_names().await?,
            llm_model: self.llm.name().to_string(),
            embedding_model: self.embedder.name().to_string(),
            chunk_size: self.options.chunk_size,
            top_k: self.options.top_k,
        };
        tracing::debug!("System stats | total chunks: {}", stats.total_chunks);
        Ok(stats)
    }

    // ------------------------------------------------------------------------
    // Ingestion
    // ------------------------------------------------------------------------

    /// 새로 추가되었거나 수정된 교재만 인덱싱
    pub async fn ingest_new_books(
        &self,
        processor: &DocumentProcessor,
        tracker: &mut BookTracker,
        dir: &Path,
    ) -> Result<IngestReport> {
        let mut report = IngestReport::default();

        if !dir.exists() {
            tracing::warn!("Books directory not found: {:?}", dir);
            return Ok(report);
        }

        for path in list_pdfs(dir) {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();

            if tracker.is_processed(&path) {
                report.skipped_books += 1;
                report.skipped_book_names.push(file_name);
                continue;
            }

            tracing::info!("Processing new book: {}", file_name);
            match self.ingest_book(processor, tracker, &path).await {
                Ok(count) => {
                    report.new_books_processed += 1;
                    report.total_new_chunks += count;
                    report.new_book_names.push(file_name);
                }
                Err(e) => {
                    tracing::error!("Failed to ingest {}: {:#}", file_name, e);
                    report.failed_books += 1;
                }
            }
        }

        tracing::info!(
            "Ingest complete | new: {} | skipped: {} | failed: {} | chunks: {}",
            report.new_books_processed,
            report.skipped_books,
            report.failed_books,
            report.total_new_chunks
        );
        Ok(report)
    }

    /// 교재 하나: 추출/청킹 -> 기존 벡터 삭제 -> 인덱싱 -> 처리 완료 기록
    async fn ingest_book(
        &self,
        processor: &DocumentProcessor,
        tracker: &mut BookTracker,
        path: &Path,
    ) -> Result<usize> {
        let chunks = processor.process_book(path).await?;
        let book_name = crate::extractor::extract_book_name(path);

        let removed = self.vector.delete_book(&book_name).await?;
        if removed > 0 {
            tracing::info!("Removed {} stale vectors for {}", removed, book_name);
        }

        let count = self.index_chunks(&chunks).await?;
        tracker.mark_as_processed(path, count)?;
        Ok(count)
    }

    /// 벡터와 추적 기록을 모두 지우고 전체 재처리
    pub async fn reprocess_all(
        &self,
        processor: &DocumentProcessor,
        tracker: &mut BookTracker,
        dir: &Path,
    ) -> Result<IngestReport> {
        tracing::info!("Reprocessing all books in {:?}", dir);
        self.vector.clear().await?;
        tracker.clear_all()?;
        self.ingest_new_books(processor, tracker, dir).await
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 출처 목록을 번호 붙은 인용으로
fn citations_for(sources: &[Source]) -> String {
    format_citations_list(sources.iter().map(|s| (s.book.as_str(), s.page)))
}

/// 미리보기 (200자 + "...")
fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        let head: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

/// 로그용 질문 앞부분
fn log_preview(question: &str) -> String {
    question.chars().take(50).collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::ChunkConfig;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// 키워드 존재 여부로 만드는 8차원 임베딩
    const KEYWORDS: [&str; 8] = [
        "distillation",
        "reactor",
        "heat",
        "pump",
        "entropy",
        "membrane",
        "catalyst",
        "valve",
    ];

    struct KeywordEmbedder;

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let lower = text.to_lowercase();
            Ok(KEYWORDS
                .iter()
                .map(|k| if lower.contains(k) { 1.0 } else { 0.0 })
                .collect())
        }

        fn dimension(&self) -> usize {
            KEYWORDS.len()
        }

        fn name(&self) -> &str {
            "keyword"
        }
    }

    #[derive(Default)]
    struct RecordingLlm {
        prompts: Mutex<Vec<String>>,
    }

    impl RecordingLlm {
        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }

        fn last_prompt(&self) -> String {
            self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl LanguageModel for RecordingLlm {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("Generated answer".to_string())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    struct Fixture {
        _dir: TempDir,
        engine: RagEngine,
        llm: Arc<RecordingLlm>,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = LanceVectorStore::open(&dir.path().join("vectors.lance"), KEYWORDS.len())
            .await
            .unwrap();
        let llm = Arc::new(RecordingLlm::default());
        let engine = RagEngine::new(
            Arc::new(store),
            Arc::new(KeywordEmbedder),
            llm.clone(),
            EngineOptions {
                subject: "Chemical Engineering".to_string(),
                top_k: 2,
                chunk_size: 1000,
            },
        );
        Fixture {
            _dir: dir,
            engine,
            llm,
        }
    }

    /// 페이지마다 청크 하나
    fn chunks(book: &str, pages: &[(u32, &str)]) -> Vec<Chunk> {
        pages
            .iter()
            .enumerate()
            .map(|(i, (page, text))| Chunk {
                id: Chunk::make_id(book, i as u32),
                chunk_index: i as u32,
                book_name: book.to_string(),
                page: *page,
                source: format!("/books/{}.pdf", book),
                text: text.to_string(),
            })
            .collect()
    }

    async fn seeded() -> Fixture {
        let f = fixture().await;
        f.engine
            .index_chunks(&chunks(
                "Unit Operations",
                &[
                    (10, "distillation columns separate"),
                    (20, "heat exchangers transfer heat"),
                ],
            ))
            .await
            .unwrap();
        f.engine
            .index_chunks(&chunks("Reaction Engineering", &[(5, "a packed reactor with catalyst")]))
            .await
            .unwrap();
        f
    }

    #[test]
    fn test_query_mode_serde() {
        assert_eq!(
            serde_json::to_string(&QueryMode::GeneralKnowledge).unwrap(),
            "\"general_knowledge\""
        );
        assert_eq!("book_based".parse::<QueryMode>().unwrap(), QueryMode::BookBased);
        assert!("other".parse::<QueryMode>().is_err());
        assert_eq!(QueryMode::from_general(true).label(), "General Knowledge");
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("short"), "short");
        let long = "x".repeat(250);
        let p = preview(&long);
        assert_eq!(p.chars().count(), 203);
        assert!(p.ends_with("..."));
    }

    #[tokio::test]
    async fn test_index_and_stats() {
        let f = seeded().await;
        let stats = f.engine.system_stats().await.unwrap();
        assert_eq!(stats.total_chunks, 3);
        assert_eq!(
            stats.books,
            vec!["Reaction Engineering".to_string(), "Unit Operations".to_string()]
        );
        assert_eq!(stats.llm_model, "recording");
        assert_eq!(stats.embedding_model, "keyword");
        assert_eq!(stats.top_k, 2);
    }

    #[tokio::test]
    async fn test_query_books_without_index_skips_llm() {
        let f = fixture().await;
        let (answer, sources) = f.engine.query_books("What is distillation?", None).await.unwrap();
        assert_eq!(answer, NO_RESULTS_ANSWER);
        assert!(sources.is_empty());
        assert_eq!(f.llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_query_book_mode() {
        let f = seeded().await;
        let response = f
            .engine
            .query("How does distillation work?", QueryMode::BookBased, Some(1))
            .await
            .unwrap();

        assert_eq!(response.answer, "Generated answer");
        assert_eq!(response.mode, QueryMode::BookBased);
        assert_eq!(response.sources.len(), 1);
        assert_eq!(response.sources[0].book, "Unit Operations");
        assert_eq!(response.sources[0].page, 10);
        assert_eq!(response.citations, "1. **Unit Operations** (Page 10)");
        assert!(f.llm.last_prompt().contains("[Source 1] Unit Operations, Page 10"));
    }

    #[tokio::test]
    async fn test_query_general_mode() {
        let f = seeded().await;
        let response = f
            .engine
            .query("What is entropy?", QueryMode::GeneralKnowledge, None)
            .await
            .unwrap();

        assert_eq!(response.citations, GENERAL_KNOWLEDGE_CITATION);
        assert!(response.sources.is_empty());
        assert!(!f.llm.last_prompt().contains("[Source"));
    }

    #[tokio::test]
    async fn test_query_stream_book_mode() {
        let f = seeded().await;
        let qs = f
            .engine
            .query_stream("catalyst in a reactor", QueryMode::BookBased, Some(1))
            .await
            .unwrap();
        assert_eq!(qs.sources[0].book, "Reaction Engineering");

        let response = qs.collect("catalyst in a reactor").await.unwrap();
        assert_eq!(response.answer, "Generated answer");
        assert_eq!(response.citations, "1. **Reaction Engineering** (Page 5)");
        assert_eq!(f.llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_query_stream_without_index() {
        let f = fixture().await;
        let response = f
            .engine
            .query_stream("pump curves", QueryMode::BookBased, None)
            .await
            .unwrap()
            .collect("pump curves")
            .await
            .unwrap();

        assert_eq!(response.answer, NO_RESULTS_STREAM);
        assert!(response.citations.is_empty());
        assert_eq!(f.llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_search_by_book() {
        let f = seeded().await;
        let response = f
            .engine
            .search_by_book("heat transfer", "Reaction Engineering", Some(5))
            .await
            .unwrap();
        assert_eq!(response.book_filter.as_deref(), Some("Reaction Engineering"));
        assert!(response.sources.iter().all(|s| s.book == "Reaction Engineering"));

        let empty = f
            .engine
            .search_by_book("heat transfer", "Missing Book", None)
            .await
            .unwrap();
        assert_eq!(empty.answer, "No relevant information found in 'Missing Book'.");
        assert!(empty.sources.is_empty());
    }

    #[tokio::test]
    async fn test_ingest_counts_failures_and_skips() {
        let f = fixture().await;
        let dir = TempDir::new().unwrap();
        let books = dir.path().join("books");
        std::fs::create_dir_all(&books).unwrap();
        std::fs::write(books.join("Broken.pdf"), b"not a pdf").unwrap();

        let processor = DocumentProcessor::new(ChunkConfig::from_tokens(10, 2)).unwrap();
        let mut tracker = BookTracker::open(&dir.path().join("book_tracker.json"));

        let report = f
            .engine
            .ingest_new_books(&processor, &mut tracker, &books)
            .await
            .unwrap();
        assert_eq!(report.failed_books, 1);
        assert_eq!(report.new_books_processed, 0);
        assert!(tracker.processed_books().is_empty());

        let missing = f
            .engine
            .ingest_new_books(&processor, &mut tracker, &dir.path().join("nope"))
            .await
            .unwrap();
        assert_eq!(missing.new_books_processed + missing.failed_books, 0);
    }

    #[tokio::test]
    async fn test_ingest_generated_pdf_and_reprocess() {
        use crate::export::{pdf::render_pdf, Block, ExportDocument};

        let f = fixture().await;
        let dir = TempDir::new().unwrap();
        let books = dir.path().join("books");
        std::fs::create_dir_all(&books).unwrap();

        let doc = ExportDocument {
            title: "Separations".to_string(),
            blocks: vec![Block::Paragraph(
                "Distillation separates liquids by boiling point.".to_string(),
            )],
        };
        std::fs::write(books.join("Separations.pdf"), render_pdf(&doc).unwrap()).unwrap();

        let processor = DocumentProcessor::new(ChunkConfig::from_tokens(50, 10)).unwrap();
        let mut tracker = BookTracker::open(&dir.path().join("book_tracker.json"));

        let report = f
            .engine
            .ingest_new_books(&processor, &mut tracker, &books)
            .await
            .unwrap();
        assert_eq!(report.new_books_processed, 1);
        assert_eq!(report.new_book_names, vec!["Separations.pdf".to_string()]);
        assert!(report.total_new_chunks > 0);

        // 변경 없으면 건너뜀
        let again = f
            .engine
            .ingest_new_books(&processor, &mut tracker, &books)
            .await
            .unwrap();
        assert_eq!(again.skipped_books, 1);
        assert_eq!(again.new_books_processed, 0);

        // 재처리해도 벡터가 중복되지 않음
        let rebuilt = f
            .engine
            .reprocess_all(&processor, &mut tracker, &books)
            .await
            .unwrap();
        assert_eq!(rebuilt.new_books_processed, 1);
        let stats = f.engine.system_stats().await.unwrap();
        assert_eq!(stats.total_chunks, rebuilt.total_new_chunks);
    }
}
