//! 내보내기 모듈 - 답변/기록을 PDF, DOCX로 저장
//!
//! 질의 결과를 형식과 무관한 `ExportDocument`로 만든 뒤
//! 형식별 렌더러(pdf.rs, docx.rs)가 바이트로 변환합니다.

pub mod docx;
pub mod pdf;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use chrono::Local;
use regex::Regex;

use crate::history::HistoryEntry;
use crate::rag::QueryResponse;

/// 표시용 타임스탬프 형식
const DISPLAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// 파일 이름용 타임스탬프 형식
const FILE_TIME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

// ============================================================================
// Types
// ============================================================================

/// 내보내기 형식
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    Pdf,
    Docx,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
        }
    }
}

/// 문서 블록
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    /// 섹션 제목
    Heading(String),
    /// "라벨: 값" 한 줄 (라벨 굵게)
    Meta { label: String, value: String },
    Paragraph(String),
    /// 글머리표 항목
    Bullet(String),
    /// 인용 (기울임)
    Quote(String),
    Spacer,
}

/// 형식과 무관한 문서
#[derive(Debug, Clone, PartialEq)]
pub struct ExportDocument {
    pub title: String,
    pub blocks: Vec<Block>,
}

// ============================================================================
// Document Builders
// ============================================================================

/// 질의 결과 하나를 문서로
pub fn response_document(subject: &str, response: &QueryResponse, generated: &str) -> ExportDocument {
    let mut blocks = vec![
        Block::Meta {
            label: "Generated".to_string(),
            value: generated.to_string(),
        },
        Block::Meta {
            label: "Mode".to_string(),
            value: response.mode.label().to_string(),
        },
    ];
    if let Some(book) = &response.book_filter {
        blocks.push(Block::Meta {
            label: "Book".to_string(),
            value: book.clone(),
        });
    }
    blocks.push(Block::Spacer);

    blocks.push(Block::Heading("Question".to_string()));
    blocks.push(Block::Paragraph(clean_markdown(&response.question)));

    blocks.push(Block::Heading("Answer".to_string()));
    blocks.extend(paragraphs(&clean_markdown(&response.answer)).map(Block::Paragraph));

    let citations = clean_markdown(&response.citations);
    if !citations.trim().is_empty() {
        blocks.push(Block::Heading("References".to_string()));
        blocks.extend(
            citations
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(|l| Block::Bullet(l.to_string())),
        );
    }

    ExportDocument {
        title: format!("{} RAG System", subject),
        blocks,
    }
}

/// 질의 기록 여러 개를 문서로
pub fn history_document(subject: &str, entries: &[HistoryEntry], generated: &str) -> ExportDocument {
    let mut blocks = vec![
        Block::Meta {
            label: "Generated".to_string(),
            value: generated.to_string(),
        },
        Block::Spacer,
    ];

    for (i, entry) in entries.iter().enumerate() {
        let n = i + 1;
        blocks.push(Block::Heading(format!("Question {}", n)));
        blocks.push(Block::Paragraph(clean_markdown(&entry.question)));

        blocks.push(Block::Heading(format!("Answer {}", n)));
        blocks.extend(paragraphs(&clean_markdown(&entry.answer)).map(Block::Paragraph));

        if !entry.citations.trim().is_empty() {
            blocks.push(Block::Quote(clean_markdown(&entry.citations)));
        }
        blocks.push(Block::Spacer);
    }

    ExportDocument {
        title: format!("{} RAG - Chat History", subject),
        blocks,
    }
}

/// 빈 줄 기준 문단 분리
fn paragraphs(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
}

/// 마크다운 강조 기호 제거 (**bold**, *italic*, `code`)
pub fn clean_markdown(text: &str) -> String {
    static PATTERNS: OnceLock<[Regex; 3]> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        [
            Regex::new(r"\*\*(.*?)\*\*").expect("valid regex"),
            Regex::new(r"\*(.*?)\*").expect("valid regex"),
            Regex::new(r"`(.*?)`").expect("valid regex"),
        ]
    });

    patterns
        .iter()
        .fold(text.to_string(), |acc, re| re.replace_all(&acc, "$1").into_owned())
}

// ============================================================================
// Exporter
// ============================================================================

/// 내보내기 실행기
pub struct Exporter {
    export_dir: PathBuf,
    subject: String,
}

impl Exporter {
    pub fn new(export_dir: PathBuf, subject: impl Into<String>) -> Self {
        Self {
            export_dir,
            subject: subject.into(),
        }
    }

    /// 질의 결과 내보내기
    pub fn export_response(
        &self,
        response: &QueryResponse,
        format: ExportFormat,
        filename: Option<&str>,
    ) -> Result<PathBuf> {
        let now = Local::now();
        let doc = response_document(
            &self.subject,
            response,
            &now.format(DISPLAY_TIME_FORMAT).to_string(),
        );
        let default_name = format!("response_{}", now.format(FILE_TIME_FORMAT));
        self.write(&doc, format, filename, &default_name)
    }

    /// 질의 기록 내보내기
    pub fn export_history(
        &self,
        entries: &[HistoryEntry],
        format: ExportFormat,
        filename: Option<&str>,
    ) -> Result<PathBuf> {
        let now = Local::now();
        let doc = history_document(
            &self.subject,
            entries,
            &now.format(DISPLAY_TIME_FORMAT).to_string(),
        );
        let default_name = format!("chat_history_{}", now.format(FILE_TIME_FORMAT));
        self.write(&doc, format, filename, &default_name)
    }

    fn write(
        &self,
        doc: &ExportDocument,
        format: ExportFormat,
        filename: Option<&str>,
        default_name: &str,
    ) -> Result<PathBuf> {
        let started = std::time::Instant::now();
        let path = self
            .export_dir
            .join(output_file_name(filename.unwrap_or(default_name), format));

        let bytes = match format {
            ExportFormat::Pdf => pdf::render_pdf(doc)?,
            ExportFormat::Docx => docx::render_docx(doc)?,
        };

        std::fs::create_dir_all(&self.export_dir)
            .with_context(|| format!("Failed to create export directory: {:?}", self.export_dir))?;
        std::fs::write(&path, bytes).with_context(|| format!("Failed to write {:?}", path))?;

        tracing::info!(
            "Exported {} ({} blocks) to {:?} in {:?}",
            format.extension(),
            doc.blocks.len(),
            path,
            started.elapsed()
        );
        Ok(path)
    }
}

/// 내보내기 디렉토리 안의 파일 이름 (확장자 보정)
fn output_file_name(name: &str, format: ExportFormat) -> String {
    let base = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "export".to_string());

    let has_ext = Path::new(&base)
        .extension()
        .map(|e| e.eq_ignore_ascii_case(format.extension()))
        .unwrap_or(false);

    if has_ext {
        base
    } else {
        format!("{}.{}", base, format.extension())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::{QueryMode, Source};
    use tempfile::TempDir;

    fn response() -> QueryResponse {
        QueryResponse {
            question: "What is **reflux ratio**?".to_string(),
            answer: "It is *L/D*.\n\nHigher reflux improves `purity`.".to_string(),
            mode: QueryMode::BookBased,
            sources: vec![Source {
                book: "McCabe".to_string(),
                page: 540,
                text_preview: "reflux".to_string(),
            }],
            citations: "1. **McCabe** (Page 540)\n2. **Perry** (Page 13)".to_string(),
            book_filter: None,
        }
    }

    #[test]
    fn test_clean_markdown() {
        assert_eq!(clean_markdown("**bold** and *it* and `code`"), "bold and it and code");
        assert_eq!(clean_markdown("no markup"), "no markup");
    }

    #[test]
    fn test_response_document_layout() {
        let doc = response_document("Chemical Engineering", &response(), "2026-01-01 10:00:00");
        assert_eq!(doc.title, "Chemical Engineering RAG System");
        assert_eq!(
            doc.blocks[1],
            Block::Meta {
                label: "Mode".to_string(),
                value: "Book Based".to_string()
            }
        );
        assert!(doc.blocks.contains(&Block::Paragraph("What is reflux ratio?".to_string())));
        assert!(doc.blocks.contains(&Block::Paragraph("It is L/D.".to_string())));
        assert!(doc
            .blocks
            .contains(&Block::Paragraph("Higher reflux improves purity.".to_string())));
        assert!(doc.blocks.contains(&Block::Heading("References".to_string())));
        assert!(doc.blocks.contains(&Block::Bullet("2. Perry (Page 13)".to_string())));
    }

    #[test]
    fn test_response_document_without_citations() {
        let mut r = response();
        r.citations.clear();
        r.mode = QueryMode::GeneralKnowledge;
        let doc = response_document("Chemical Engineering", &r, "now");
        assert!(!doc.blocks.contains(&Block::Heading("References".to_string())));
    }

    #[test]
    fn test_history_document_layout() {
        let entry = HistoryEntry {
            id: 1,
            question: "Q?".to_string(),
            answer: "A.".to_string(),
            mode: QueryMode::GeneralKnowledge,
            citations: "Based on general knowledge (not from textbooks)".to_string(),
            sources: vec![],
            book_filter: None,
            created_at: chrono::Utc::now(),
        };
        let doc = history_document("Thermodynamics", &[entry.clone(), entry], "now");
        assert_eq!(doc.title, "Thermodynamics RAG - Chat History");
        assert!(doc.blocks.contains(&Block::Heading("Question 2".to_string())));
        assert!(doc.blocks.contains(&Block::Heading("Answer 1".to_string())));
        assert!(doc.blocks.contains(&Block::Quote(
            "Based on general knowledge (not from textbooks)".to_string()
        )));
    }

    #[test]
    fn test_output_file_name() {
        assert_eq!(output_file_name("report", ExportFormat::Pdf), "report.pdf");
        assert_eq!(output_file_name("report.PDF", ExportFormat::Pdf), "report.PDF");
        assert_eq!(output_file_name("report.pdf", ExportFormat::Docx), "report.pdf.docx");
        assert_eq!(output_file_name("../../etc/notes", ExportFormat::Docx), "notes.docx");
    }

    #[test]
    fn test_export_response_writes_files() {
        let dir = TempDir::new().unwrap();
        let exporter = Exporter::new(dir.path().join("exports"), "Chemical Engineering");

        let pdf = exporter
            .export_response(&response(), ExportFormat::Pdf, None)
            .unwrap();
        let name = pdf.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("response_"));
        assert!(name.ends_with(".pdf"));
        assert!(std::fs::read(&pdf).unwrap().starts_with(b"%PDF"));

        let docx = exporter
            .export_response(&response(), ExportFormat::Docx, Some("answer"))
            .unwrap();
        assert_eq!(docx, dir.path().join("exports").join("answer.docx"));
        assert!(std::fs::read(&docx).unwrap().starts_with(b"PK"));
    }

    #[test]
    fn test_export_history_default_name() {
        let dir = TempDir::new().unwrap();
        let exporter = Exporter::new(dir.path().to_path_buf(), "Chemical Engineering");
        let path = exporter.export_history(&[], ExportFormat::Docx, None).unwrap();
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("chat_history_"));
    }
}
