//! CLI 모듈
//!
//! textbook-rag CLI 명령어 정의 및 구현

use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::Settings;
use crate::export::{ExportFormat, Exporter};
use crate::history::{HistoryEntry, HistoryStore};
use crate::knowledge::{BookTracker, ChunkConfig, DocumentProcessor};
use crate::rag::{IngestReport, QueryMode, QueryResponse, RagEngine};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "textbook-rag")]
#[command(version, about = "교재 PDF 기반 RAG 질의응답 시스템", long_about = None)]
pub struct Cli {
    /// 데이터 디렉토리 (RAG_DATA_DIR 대신)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// 교재 PDF 디렉토리 (RAG_BOOKS_DIR 대신)
    #[arg(long, global = true)]
    pub books_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// 명령줄 플래그를 설정에 덮어쓰기
    pub fn apply_overrides(&self, mut settings: Settings) -> Settings {
        if let Some(ref dir) = self.data_dir {
            settings = settings.with_data_dir(dir.clone());
        }
        if let Some(ref dir) = self.books_dir {
            settings.books_dir = dir.clone();
        }
        settings
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// 새로 추가되었거나 수정된 교재를 인덱싱
    Ingest,

    /// 인덱스를 비우고 모든 교재를 다시 처리
    Reprocess {
        /// 확인 없이 실행
        #[arg(long)]
        yes: bool,
    },

    /// 질문 하나에 답변
    Ask(AskArgs),

    /// 대화형 질의 모드
    Chat {
        /// 일반 지식 모드로 시작
        #[arg(short, long)]
        general: bool,

        /// 시작 시 새 교재 인덱싱 건너뛰기
        #[arg(long)]
        skip_ingest: bool,
    },

    /// 처리된 교재 목록
    Books,

    /// 질의 기록 관리
    History {
        #[command(subcommand)]
        command: HistoryCommand,
    },

    /// 질의 결과를 PDF/DOCX로 내보내기 (기본: 마지막 기록)
    Export {
        /// 내보낼 기록 ID
        #[arg(long)]
        id: Option<i64>,

        /// 출력 형식
        #[arg(short, long, value_enum, default_value_t = ExportFormat::Pdf)]
        format: ExportFormat,

        /// 출력 파일 이름 (exports 디렉토리 안)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// 상태 확인
    Status,
}

#[derive(Args)]
pub struct AskArgs {
    /// 질문
    pub question: String,

    /// 교재 대신 일반 지식으로 답변
    #[arg(short, long)]
    pub general: bool,

    /// 특정 교재에서만 검색
    #[arg(short, long, conflicts_with = "general")]
    pub book: Option<String>,

    /// 검색할 청크 수
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// 스트리밍 없이 한 번에 출력
    #[arg(long)]
    pub no_stream: bool,

    /// 답변을 파일로 내보내기
    #[arg(short, long, value_enum)]
    pub export: Option<ExportFormat>,

    /// 질의 기록에 저장하지 않음
    #[arg(long)]
    pub no_history: bool,

    /// 새 교재 인덱싱 건너뛰기
    #[arg(long)]
    pub skip_ingest: bool,
}

#[derive(Subcommand)]
pub enum HistoryCommand {
    /// 최근 기록 목록
    List {
        /// 결과 개수 제한
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// 기록 상세 (기본: 마지막 기록)
    Show {
        /// 기록 ID
        id: Option<i64>,
    },

    /// 질문/답변 전문 검색
    Search {
        /// 검색어
        query: String,

        /// 결과 개수 제한
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// 기록 삭제
    Delete {
        /// 기록 ID
        id: i64,
    },

    /// 모든 기록 삭제
    Clear {
        /// 확인 없이 실행
        #[arg(long)]
        yes: bool,
    },

    /// 기록 전체를 PDF/DOCX로 내보내기
    Export {
        /// 출력 형식
        #[arg(short, long, value_enum, default_value_t = ExportFormat::Pdf)]
        format: ExportFormat,

        /// 출력 파일 이름
        #[arg(short, long)]
        output: Option<String>,

        /// 내보낼 최근 기록 수
        #[arg(short, long, default_value = "100")]
        limit: usize,
    },
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli, settings: Settings) -> Result<()> {
    match cli.command {
        Commands::Ingest => cmd_ingest(&settings).await,
        Commands::Reprocess { yes } => cmd_reprocess(&settings, yes).await,
        Commands::Ask(args) => cmd_ask(&settings, args).await,
        Commands::Chat {
            general,
            skip_ingest,
        } => cmd_chat(&settings, general, skip_ingest).await,
        Commands::Books => cmd_books(&settings).await,
        Commands::History { command } => cmd_history(&settings, command),
        Commands::Export { id, format, output } => {
            cmd_export(&settings, id, format, output.as_deref())
        }
        Commands::Status => cmd_status(&settings).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 인덱싱 명령어 (ingest)
///
/// 추적 기록에 없거나 내용이 바뀐 교재만 처리합니다.
async fn cmd_ingest(settings: &Settings) -> Result<()> {
    let engine = open_engine(settings).await?;
    let processor = open_processor(settings)?;
    let mut tracker = BookTracker::open(&settings.tracker_path());

    println!("[*] 교재 디렉토리: {}", settings.books_dir.display());
    let pending = tracker.new_books(&settings.books_dir);
    if pending.is_empty() {
        println!("[OK] 새로 처리할 교재가 없습니다.");
        return Ok(());
    }
    println!("[*] 처리 대상: {} 권", pending.len());

    let report = engine
        .ingest_new_books(&processor, &mut tracker, &settings.books_dir)
        .await
        .context("교재 인덱싱 실패")?;

    print_report(&report);
    Ok(())
}

/// 재처리 명령어 (reprocess)
async fn cmd_reprocess(settings: &Settings, yes: bool) -> Result<()> {
    if !yes {
        bail!(
            "모든 벡터와 처리 기록이 삭제됩니다.\n\
             계속하려면 --yes 를 지정하세요."
        );
    }

    let engine = open_engine(settings).await?;
    let processor = open_processor(settings)?;
    let mut tracker = BookTracker::open(&settings.tracker_path());

    println!("[*] 인덱스를 비우고 모든 교재를 다시 처리합니다...");
    let report = engine
        .reprocess_all(&processor, &mut tracker, &settings.books_dir)
        .await
        .context("재처리 실패")?;

    print_report(&report);
    Ok(())
}

/// 질의 명령어 (ask)
async fn cmd_ask(settings: &Settings, args: AskArgs) -> Result<()> {
    let engine = open_engine(settings).await?;

    if !args.skip_ingest {
        auto_ingest(&engine, settings).await?;
    }

    let mode = QueryMode::from_general(args.general);
    println!("[*] 질문: \"{}\"", args.question);
    println!();

    let response = if let Some(ref book) = args.book {
        let response = engine
            .search_by_book(&args.question, book, args.top_k)
            .await
            .context("교재 검색 실패")?;
        println!("{}", response.answer);
        response
    } else if args.no_stream {
        let response = engine
            .query(&args.question, mode, args.top_k)
            .await
            .context("질의 실패")?;
        println!("{}", response.answer);
        response
    } else {
        stream_answer(&engine, &args.question, mode, args.top_k).await?
    };

    print_response_footer(&response);

    if !args.no_history {
        save_history(settings, &response);
    }

    if let Some(format) = args.export {
        let exporter = Exporter::new(settings.export_dir(), settings.subject.clone());
        let path = exporter
            .export_response(&response, format, None)
            .context("내보내기 실패")?;
        println!("[OK] 내보내기 완료: {}", path.display());
    }

    Ok(())
}

/// 대화형 명령어 (chat)
///
/// `/general`, `/books` 로 모드를 바꾸고 `/exit` 로 종료합니다.
async fn cmd_chat(settings: &Settings, general: bool, skip_ingest: bool) -> Result<()> {
    let engine = open_engine(settings).await?;
    if !skip_ingest {
        auto_ingest(&engine, settings).await?;
    }

    let history = match HistoryStore::open(&settings.history_path()) {
        Ok(store) => Some(store),
        Err(e) => {
            println!("[!] 질의 기록을 열 수 없습니다: {}", e);
            None
        }
    };

    let mut mode = QueryMode::from_general(general);
    println!("{} RAG 대화 모드", settings.subject);
    println!("  /general  일반 지식 모드");
    println!("  /books    교재 기반 모드");
    println!("  /exit     종료");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("[{}] 질문> ", mode.label());
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();

        match input {
            "" => continue,
            "/exit" | "/quit" => break,
            "/general" => {
                mode = QueryMode::GeneralKnowledge;
                println!("[OK] 일반 지식 모드");
                continue;
            }
            "/books" => {
                mode = QueryMode::BookBased;
                println!("[OK] 교재 기반 모드");
                continue;
            }
            _ => {}
        }

        println!();
        match stream_answer(&engine, input, mode, None).await {
            Ok(response) => {
                print_response_footer(&response);
                if let Some(ref store) = history {
                    if let Err(e) = store.add(&response) {
                        tracing::warn!("Failed to save history: {:#}", e);
                    }
                }
            }
            Err(e) => println!("[!] 답변 생성 실패: {:#}", e),
        }
        println!();
    }

    println!("[OK] 종료합니다.");
    Ok(())
}

/// 교재 목록 명령어 (books)
async fn cmd_books(settings: &Settings) -> Result<()> {
    let tracker = BookTracker::open(&settings.tracker_path());
    let stats = tracker.stats();

    println!("[*] 교재 디렉토리: {}", settings.books_dir.display());
    println!("    PDF 파일: {} 개", settings.books_in_dir());
    println!();

    if stats.books.is_empty() {
        println!("[!] 처리된 교재가 없습니다.");
    } else {
        println!(
            "[OK] 처리된 교재 ({} 권, {} 청크):\n",
            stats.total_books_processed, stats.total_chunks
        );
        for name in &stats.books {
            let Some(record) = tracker.book_info(name) else {
                continue;
            };
            println!("  {}", truncate_text(name, 60));
            println!(
                "        {} 청크 | {} | {}",
                record.chunk_count,
                format_bytes(record.file_size as usize),
                record
                    .processed_date
                    .with_timezone(&chrono::Local)
                    .format("%Y-%m-%d %H:%M")
            );
        }
    }

    // 벡터 인덱스의 교재 (API 키가 있을 때만)
    if settings.has_api_key() {
        match RagEngine::from_settings(settings).await {
            Ok(engine) => match engine.system_stats().await {
                Ok(system) => {
                    println!();
                    println!("[OK] 인덱스에 있는 교재: {} 권", system.books.len());
                    for book in &system.books {
                        println!("  - {}", book);
                    }
                }
                Err(e) => tracing::debug!("Failed to read vector stats: {}", e),
            },
            Err(e) => tracing::debug!("Failed to open RAG engine: {}", e),
        }
    }

    Ok(())
}

/// 질의 기록 명령어 (history)
fn cmd_history(settings: &Settings, command: HistoryCommand) -> Result<()> {
    let store = HistoryStore::open(&settings.history_path()).context("질의 기록 열기 실패")?;

    match command {
        HistoryCommand::List { limit } => {
            let entries = store.list(limit).context("기록 조회 실패")?;
            if entries.is_empty() {
                println!("[!] 저장된 기록이 없습니다.");
                return Ok(());
            }
            println!("[OK] 최근 기록 ({} 건):\n", entries.len());
            for entry in &entries {
                print_entry_summary(entry);
            }
        }
        HistoryCommand::Show { id } => {
            let entry = match id {
                Some(id) => store.get(id).context("기록 조회 실패")?,
                None => store.latest().context("기록 조회 실패")?,
            };
            match entry {
                Some(entry) => print_entry(&entry),
                None => println!("[!] 기록을 찾을 수 없습니다."),
            }
        }
        HistoryCommand::Search { query, limit } => {
            let entries = store.search(&query, limit).context("기록 검색 실패")?;
            if entries.is_empty() {
                println!("[!] 검색 결과가 없습니다.");
                return Ok(());
            }
            println!("[OK] 검색 결과 ({} 건):\n", entries.len());
            for entry in &entries {
                print_entry_summary(entry);
            }
        }
        HistoryCommand::Delete { id } => {
            if store.delete(id).context("기록 삭제 실패")? {
                println!("[OK] 기록 #{} 삭제됨", id);
            } else {
                println!("[!] 삭제할 기록을 찾을 수 없습니다");
            }
        }
        HistoryCommand::Clear { yes } => {
            if !yes {
                bail!("모든 질의 기록이 삭제됩니다. 계속하려면 --yes 를 지정하세요.");
            }
            let removed = store.clear().context("기록 삭제 실패")?;
            println!("[OK] 기록 {} 건 삭제됨", removed);
        }
        HistoryCommand::Export {
            format,
            output,
            limit,
        } => {
            let mut entries = store.list(limit).context("기록 조회 실패")?;
            if entries.is_empty() {
                println!("[!] 내보낼 기록이 없습니다.");
                return Ok(());
            }
            // 오래된 순으로
            entries.reverse();

            let exporter = Exporter::new(settings.export_dir(), settings.subject.clone());
            let path = exporter
                .export_history(&entries, format, output.as_deref())
                .context("내보내기 실패")?;
            println!("[OK] 기록 {} 건 내보내기 완료: {}", entries.len(), path.display());
        }
    }

    Ok(())
}

/// 내보내기 명령어 (export)
fn cmd_export(
    settings: &Settings,
    id: Option<i64>,
    format: ExportFormat,
    output: Option<&str>,
) -> Result<()> {
    let store = HistoryStore::open(&settings.history_path()).context("질의 기록 열기 실패")?;

    let entry = match id {
        Some(id) => store
            .get(id)
            .context("기록 조회 실패")?
            .ok_or_else(|| anyhow::anyhow!("ID {}인 기록을 찾을 수 없습니다", id))?,
        None => store
            .latest()
            .context("기록 조회 실패")?
            .ok_or_else(|| anyhow::anyhow!("내보낼 기록이 없습니다. 먼저 ask 로 질문하세요."))?,
    };

    let exporter = Exporter::new(settings.export_dir(), settings.subject.clone());
    let path = exporter
        .export_response(&entry.to_response(), format, output)
        .context("내보내기 실패")?;

    println!("[OK] 기록 #{} 내보내기 완료: {}", entry.id, path.display());
    Ok(())
}

/// 상태 명령어 (status)
///
/// 시스템 상태를 확인합니다.
async fn cmd_status(settings: &Settings) -> Result<()> {
    println!("textbook-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 주제: {}", settings.subject);
    println!("[*] 데이터 디렉토리: {}", settings.data_dir.display());
    println!("[*] 교재 디렉토리: {}", settings.books_dir.display());
    println!("    PDF 파일: {} 개", settings.books_in_dir());

    if settings.has_api_key() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정");
        println!("    설정: export GOOGLE_API_KEY=your-key (또는 .env 파일)");
    }

    let tracker = BookTracker::open(&settings.tracker_path());
    let stats = tracker.stats();
    println!(
        "[OK] 처리된 교재: {} 권 ({} 청크)",
        stats.total_books_processed, stats.total_chunks
    );

    match HistoryStore::open(&settings.history_path()).and_then(|store| store.count()) {
        Ok(count) => println!("[OK] 질의 기록: {} 건", count),
        Err(e) => println!("[!] 질의 기록 열기 실패: {}", e),
    }

    // 벡터 인덱스 상태 (API 키가 있을 때만)
    if settings.has_api_key() {
        match RagEngine::from_settings(settings).await {
            Ok(engine) => match engine.system_stats().await {
                Ok(system) => {
                    println!("[OK] 벡터 인덱스: {} 청크", system.total_chunks);
                    println!("     LLM: {}", system.llm_model);
                    println!(
                        "     임베딩: {} ({}d)",
                        system.embedding_model, settings.embedding_dimension
                    );
                    println!(
                        "     청크 크기: {} 토큰 | top-k: {}",
                        system.chunk_size, system.top_k
                    );
                }
                Err(e) => {
                    tracing::debug!("Failed to read vector stats: {}", e);
                }
            },
            Err(e) => {
                tracing::debug!("Failed to open RAG engine: {}", e);
            }
        }
    }

    Ok(())
}

// ============================================================================
// Shared Steps
// ============================================================================

async fn open_engine(settings: &Settings) -> Result<RagEngine> {
    RagEngine::from_settings(settings)
        .await
        .context("RAG 엔진 초기화 실패")
}

fn open_processor(settings: &Settings) -> Result<DocumentProcessor> {
    DocumentProcessor::new(ChunkConfig::from_tokens(
        settings.chunk_size,
        settings.chunk_overlap,
    ))
}

/// 질의 전에 새 교재가 있으면 인덱싱
async fn auto_ingest(engine: &RagEngine, settings: &Settings) -> Result<()> {
    let mut tracker = BookTracker::open(&settings.tracker_path());
    let pending = tracker.new_books(&settings.books_dir);
    if pending.is_empty() {
        return Ok(());
    }

    println!("[*] 새 교재 {} 권 발견, 인덱싱 중...", pending.len());
    let processor = open_processor(settings)?;
    let report = engine
        .ingest_new_books(&processor, &mut tracker, &settings.books_dir)
        .await
        .context("교재 인덱싱 실패")?;
    print_report(&report);
    println!();
    Ok(())
}

/// 답변을 받는 대로 출력하고 최종 결과 반환
async fn stream_answer(
    engine: &RagEngine,
    question: &str,
    mode: QueryMode,
    top_k: Option<usize>,
) -> Result<QueryResponse> {
    let mut streaming = engine
        .query_stream(question, mode, top_k)
        .await
        .context("질의 실패")?;

    let mut stdout = std::io::stdout();
    let mut answer = String::new();
    while let Some(part) = streaming.stream.next().await {
        let part = part.context("답변 스트림 오류")?;
        print!("{}", part);
        stdout.flush()?;
        answer.push_str(&part);
    }
    println!();

    Ok(streaming.into_response(question, answer))
}

/// 질의 기록 저장 (실패해도 답변은 유지)
fn save_history(settings: &Settings, response: &QueryResponse) {
    match HistoryStore::open(&settings.history_path()).and_then(|store| store.add(response)) {
        Ok(id) => tracing::debug!("Saved history entry #{}", id),
        Err(e) => println!("[!] 질의 기록 저장 실패: {}", e),
    }
}

// ============================================================================
// Output
// ============================================================================

fn print_report(report: &IngestReport) {
    for name in &report.new_book_names {
        println!("  + {}", name);
    }
    println!(
        "[OK] 완료: 새 교재 {}, 건너뜀 {}, 실패 {}",
        report.new_books_processed, report.skipped_books, report.failed_books
    );
    println!("     새 청크: {}", report.total_new_chunks);
}

/// 모드 표시와 출처
fn print_response_footer(response: &QueryResponse) {
    println!();
    match response.book_filter {
        Some(ref book) => println!("[{}] {}", response.mode.label(), book),
        None => println!("[{}]", response.mode.label()),
    }

    if response.citations.is_empty() {
        return;
    }

    println!();
    println!("출처:");
    match response.mode {
        QueryMode::GeneralKnowledge => println!("  {}", response.citations),
        QueryMode::BookBased => {
            for (i, source) in response.sources.iter().enumerate() {
                println!("  {}. {} (Page {})", i + 1, source.book, source.page);
                println!("     {}", truncate_text(&source.text_preview, 100));
            }
        }
    }
}

fn print_entry_summary(entry: &HistoryEntry) {
    println!(
        "  #{:<4} [{}] {}",
        entry.id,
        entry.mode.label(),
        truncate_text(&entry.question, 60)
    );
    println!(
        "        {} | {}",
        entry
            .created_at
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M"),
        truncate_text(&entry.answer, 60)
    );
    println!();
}

fn print_entry(entry: &HistoryEntry) {
    println!("#{} [{}]", entry.id, entry.mode.label());
    println!(
        "{}",
        entry
            .created_at
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(ref book) = entry.book_filter {
        println!("교재: {}", book);
    }
    println!();
    println!("질문: {}", entry.question);
    println!();
    println!("{}", entry.answer);
    if !entry.citations.is_empty() {
        println!();
        println!("출처:");
        for line in entry.citations.lines() {
            println!("  {}", line);
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
