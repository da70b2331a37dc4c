//! textbook-rag CLI 진입점

use anyhow::Result;
use clap::Parser;

use textbook_rag::{cli, logging, Settings};

fn main() -> Result<()> {
    // .env (없으면 무시)
    dotenvy::dotenv().ok();

    let cli = cli::Cli::parse();
    let settings = cli.apply_overrides(Settings::from_env()?);
    settings.ensure_dirs()?;

    // 로깅 초기화 (콘솔 + 로그 파일)
    logging::init(&settings.log_level, Some(&settings.log_dir()));
    tracing::debug!("Settings loaded | data dir: {:?}", settings.data_dir);

    // CLI 실행
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(cli::run(cli, settings))
}
