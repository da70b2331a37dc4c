//! 로깅 초기화
//!
//! 콘솔: `LOG_LEVEL`/`RUST_LOG` 기준 (기본 info)
//! 파일: logs/textbook-rag.log 에 debug 레벨까지 기록

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// 로그 파일 이름
pub const LOG_FILE_NAME: &str = "textbook-rag.log";
/// 로그 파일 최대 크기 (10 MB)
const LOG_FILE_MAX_BYTES: u64 = 10 * 1024 * 1024;
/// 보관할 백업 수
const LOG_BACKUP_COUNT: usize = 5;

/// 로깅 초기화
///
/// `log_dir`이 None이거나 파일을 열 수 없으면 콘솔만 사용합니다.
pub fn init(console_level: &str, log_dir: Option<&Path>) {
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,textbook_rag={}", console_level)));

    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    let file_layer = log_dir.and_then(|dir| match open_log_file(dir) {
        Ok(file) => Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .with_filter(EnvFilter::new("warn,textbook_rag=debug")),
        ),
        Err(e) => {
            eprintln!("[!] 로그 파일을 열 수 없습니다: {}", e);
            None
        }
    });

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .init();
}

/// 로그 파일 열기 (필요 시 로테이션)
fn open_log_file(dir: &Path) -> Result<File> {
    std::fs::create_dir_all(dir).context("Failed to create log directory")?;

    let path = dir.join(LOG_FILE_NAME);
    rotate_if_needed(&path, LOG_FILE_MAX_BYTES, LOG_BACKUP_COUNT)?;

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file: {:?}", path))
}

/// 크기 초과 시 `.1`, `.2` ... 로 밀어내기
fn rotate_if_needed(path: &Path, max_bytes: u64, backups: usize) -> Result<bool> {
    let size = match std::fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(_) => return Ok(false),
    };

    if size <= max_bytes || backups == 0 {
        return Ok(false);
    }

    let backup = |n: usize| -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(format!(".{}", n));
        PathBuf::from(name)
    };

    let oldest = backup(backups);
    if oldest.exists() {
        std::fs::remove_file(&oldest).context("Failed to remove oldest log backup")?;
    }

    for n in (1..backups).rev() {
        let from = backup(n);
        if from.exists() {
            std::fs::rename(&from, backup(n + 1)).context("Failed to shift log backup")?;
        }
    }

    std::fs::rename(path, backup(1)).context("Failed to rotate log file")?;
    Ok(true)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_rotate_small_file_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(LOG_FILE_NAME);
        std::fs::write(&path, b"short").unwrap();

        assert!(!rotate_if_needed(&path, 100, 3).unwrap());
        assert!(path.exists());
    }

    #[test]
    fn test_rotate_shifts_backups() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(LOG_FILE_NAME);
        let backup1 = dir.path().join(format!("{}.1", LOG_FILE_NAME));
        let backup2 = dir.path().join(format!("{}.2", LOG_FILE_NAME));

        std::fs::write(&backup1, b"older").unwrap();
        std::fs::write(&path, vec![b'x'; 64]).unwrap();

        assert!(rotate_if_needed(&path, 10, 3).unwrap());
        assert!(!path.exists());
        assert_eq!(std::fs::read(&backup1).unwrap().len(), 64);
        assert_eq!(std::fs::read(&backup2).unwrap(), b"older");
    }

    #[test]
    fn test_rotate_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(!rotate_if_needed(&dir.path().join("none.log"), 10, 3).unwrap());
    }
}
