//! Q&A History Store - rusqlite 기반 질의 기록 저장소
//!
//! 질문/답변/출처를 저장하고 FTS5로 검색합니다.
//! 저장 위치: <data_dir>/history.db

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OpenFlags, Row};
use serde::{Deserialize, Serialize};

use crate::rag::{QueryMode, QueryResponse, Source};

// ============================================================================
// Types
// ============================================================================

/// 저장된 질의 기록
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub question: String,
    pub answer: String,
    pub mode: QueryMode,
    pub citations: String,
    pub sources: Vec<Source>,
    pub book_filter: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl HistoryEntry {
    /// 내보내기용 QueryResponse로 변환
    pub fn to_response(&self) -> QueryResponse {
        QueryResponse {
            question: self.question.clone(),
            answer: self.answer.clone(),
            mode: self.mode,
            sources: self.sources.clone(),
            citations: self.citations.clone(),
            book_filter: self.book_filter.clone(),
        }
    }
}

const SELECT_COLUMNS: &str =
    "h.id, h.question, h.answer, h.mode, h.citations, h.sources_json, h.book_filter, h.created_at";

// ============================================================================
// HistoryStore
// ============================================================================

/// History Store - 동기 질의 기록 저장소
pub struct HistoryStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
    fts_enabled: bool,
}

impl HistoryStore {
    /// 저장소 열기 (없으면 생성)
    ///
    /// # Arguments
    /// * `path` - DB 파일 경로 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create database directory")?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open SQLite database")?;

        let fts_enabled = initialize(&conn)?;
        tracing::debug!("History store initialized at {:?} (fts: {})", path, fts_enabled);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
            fts_enabled,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))
    }

    /// 질의 결과 저장
    pub fn add(&self, response: &QueryResponse) -> Result<i64> {
        let conn = self.lock()?;
        let sources_json =
            serde_json::to_string(&response.sources).context("Failed to serialize sources")?;

        conn.execute(
            "INSERT INTO history (question, answer, mode, citations, sources_json, book_filter, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                response.question,
                response.answer,
                response.mode.as_str(),
                response.citations,
                sources_json,
                response.book_filter,
                Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            ],
        )
        .context("Failed to insert history entry")?;

        let id = conn.last_insert_rowid();
        tracing::debug!("Saved history entry {}", id);
        Ok(id)
    }

    /// ID로 조회
    pub fn get(&self, id: i64) -> Result<Option<HistoryEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM history h WHERE h.id = ?1",
            SELECT_COLUMNS
        ))?;

        let mut rows = stmt.query_map(params![id], read_entry)?;
        rows.next().transpose().context("Failed to read history entry")
    }

    /// 가장 최근 기록
    pub fn latest(&self) -> Result<Option<HistoryEntry>> {
        Ok(self.list(1)?.into_iter().next())
    }

    /// 최근 기록 목록 (최신순)
    pub fn list(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM history h ORDER BY h.created_at DESC, h.id DESC LIMIT ?1",
            SELECT_COLUMNS
        ))?;

        let rows = stmt.query_map(params![limit as i64], read_entry)?;
        Ok(collect_entries(rows))
    }

    /// 키워드 검색 (FTS5, 불가 시 LIKE)
    ///
    /// source: https://www.sqlite.org/fts5.html#the_bm25_function
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<HistoryEntry>> {
        let escaped_query = escape_fts5_query(query);
        if escaped_query.is_empty() {
            return Ok(vec![]);
        }

        if !self.fts_enabled {
            return self.search_like(query, limit);
        }

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {}
             FROM history_fts
             JOIN history h ON h.id = history_fts.rowid
             WHERE history_fts MATCH ?1
             ORDER BY bm25(history_fts)
             LIMIT ?2",
            SELECT_COLUMNS
        ))?;

        let rows = stmt.query_map(params![escaped_query, limit as i64], read_entry)?;
        Ok(collect_entries(rows))
    }

    /// LIKE 검색 (FTS5 사용 불가 시 폴백)
    fn search_like(&self, keyword: &str, limit: usize) -> Result<Vec<HistoryEntry>> {
        let conn = self.lock()?;
        let pattern = format!("%{}%", keyword.trim().to_lowercase());

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM history h
             WHERE LOWER(h.question) LIKE ?1 OR LOWER(h.answer) LIKE ?1
             ORDER BY h.created_at DESC
             LIMIT ?2",
            SELECT_COLUMNS
        ))?;

        let rows = stmt.query_map(params![pattern, limit as i64], read_entry)?;
        Ok(collect_entries(rows))
    }

    /// 기록 삭제
    pub fn delete(&self, id: i64) -> Result<bool> {
        let conn = self.lock()?;
        let rows = conn.execute("DELETE FROM history WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    /// 모든 기록 삭제
    pub fn clear(&self) -> Result<usize> {
        let conn = self.lock()?;
        let rows = conn.execute("DELETE FROM history", [])?;
        tracing::info!("Cleared {} history entries", rows);
        Ok(rows)
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

/// 스키마 초기화 (FTS5 사용 가능 여부 반환)
fn initialize(conn: &Connection) -> Result<bool> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            question TEXT NOT NULL,
            answer TEXT NOT NULL,
            mode TEXT NOT NULL,
            citations TEXT NOT NULL DEFAULT '',
            sources_json TEXT NOT NULL DEFAULT '[]',
            book_filter TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )
    .context("Failed to create history table")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_history_created_at ON history(created_at)",
        [],
    )
    .context("Failed to create created_at index")?;

    // FTS5 가상 테이블
    // source: https://www.sqlite.org/fts5.html
    let fts_result = conn.execute(
        "CREATE VIRTUAL TABLE IF NOT EXISTS history_fts USING fts5(
            question,
            answer,
            content=history,
            content_rowid=id
        )",
        [],
    );

    if let Err(e) = fts_result {
        tracing::warn!("FTS5 not available, history search falls back to LIKE: {}", e);
        return Ok(false);
    }

    conn.execute_batch(
        r#"
        CREATE TRIGGER IF NOT EXISTS history_ai AFTER INSERT ON history BEGIN
            INSERT INTO history_fts(rowid, question, answer)
            VALUES (new.id, new.question, new.answer);
        END;

        CREATE TRIGGER IF NOT EXISTS history_ad AFTER DELETE ON history BEGIN
            INSERT INTO history_fts(history_fts, rowid, question, answer)
            VALUES('delete', old.id, old.question, old.answer);
        END;

        CREATE TRIGGER IF NOT EXISTS history_au AFTER UPDATE ON history BEGIN
            INSERT INTO history_fts(history_fts, rowid, question, answer)
            VALUES('delete', old.id, old.question, old.answer);
            INSERT INTO history_fts(rowid, question, answer)
            VALUES (new.id, new.question, new.answer);
        END;
        "#,
    )
    .context("Failed to create FTS5 triggers")?;

    Ok(true)
}

// ============================================================================
// Helper Functions
// ============================================================================

fn read_entry(row: &Row<'_>) -> rusqlite::Result<HistoryEntry> {
    let id: i64 = row.get(0)?;
    let mode_raw: String = row.get(3)?;
    let sources_json: String = row.get(5)?;
    let created_raw: String = row.get(7)?;

    let mode = mode_raw.parse().unwrap_or_else(|e| {
        tracing::warn!("History #{}: {} (falling back to book_based)", id, e);
        QueryMode::BookBased
    });
    let sources = serde_json::from_str(&sources_json).unwrap_or_else(|e| {
        tracing::warn!("History #{}: invalid sources JSON, dropping sources: {}", id, e);
        Vec::new()
    });
    let created_at = parse_datetime(&created_raw).unwrap_or_else(|| {
        tracing::warn!(
            "History #{}: invalid created_at '{}', using current time",
            id,
            created_raw
        );
        Utc::now()
    });

    Ok(HistoryEntry {
        id,
        question: row.get(1)?,
        answer: row.get(2)?,
        mode,
        citations: row.get(4)?,
        sources,
        book_filter: row.get(6)?,
        created_at,
    })
}

/// 읽을 수 없는 행은 경고 후 건너뜀
fn collect_entries<I>(rows: I) -> Vec<HistoryEntry>
where
    I: Iterator<Item = rusqlite::Result<HistoryEntry>>,
{
    rows.filter_map(|row| match row {
        Ok(entry) => Some(entry),
        Err(e) => {
            tracing::warn!("Skipping unreadable history row: {}", e);
            None
        }
    })
    .collect()
}

/// RFC3339 문자열을 DateTime<Utc>로 파싱
fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// FTS5 쿼리 이스케이프
///
/// 특수 문자를 제거하고 단어마다 따옴표로 감쌉니다 (AND 결합).
/// source: https://www.sqlite.org/fts5.html#full_text_query_syntax
fn escape_fts5_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|w| {
            w.chars()
                .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
                .collect::<String>()
        })
        .filter(|w| !w.is_empty())
        .map(|w| format!("\"{}\"", w))
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// Tests
// ============================================================================
