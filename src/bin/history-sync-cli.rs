//! 聊天记录同步进程
//!
//! 前台常驻进程：轮询数据库里发生变更的响应记录，
//! 从 OpenAI 拉取完整聊天记录并同步到聊天记录表

use anyhow::Result;
use clap::Parser;
use openai_history_sync_rust::sync::models::SyncerConfig;
use openai_history_sync_rust::sync::service::HistorySyncer;
use std::time::Duration;
use tracing::info;

/// OpenAI 聊天记录同步进程
#[derive(Parser, Debug)]
#[command(name = "history-sync-cli")]
#[command(about = "OpenAI 聊天记录同步进程 - 轮询变更并同步聊天记录", long_about = None)]
struct Args {
    /// 轮询间隔（秒）
    #[arg(short, long, default_value = "10")]
    interval: u64,

    /// 日志级别（默认: info,openai_history_sync_rust=debug）
    #[arg(long, default_value = "info,openai_history_sync_rust=debug")]
    log_level: String,
}

/// 初始化日志（同时输出到 stdout 和文件）
fn init_logger(log_level: &str) {
    use std::fs::OpenOptions;
    use std::io;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    // 优先使用环境变量 RUST_LOG（如果设置了），否则使用命令行参数
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    // 创建日志文件（追加模式）
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("debug.log")
        .expect("无法创建日志文件 debug.log");

    // 输出到 stdout（控制台），保留 ANSI 颜色代码用于终端显示
    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(true);

    // 输出到文件，禁用 ANSI 颜色代码（文件不需要颜色）
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    info!("[CLI] 📝 日志已同时输出到控制台和文件: debug.log");
}

#[tokio::main]
async fn main() -> Result<()> {
    // 先加载 .env，再解析命令行
    dotenvy::dotenv().ok();
    let args = Args::parse();

    init_logger(&args.log_level);

    info!("[CLI] 🚀 OpenAI 聊天记录同步进程");

    let mut config = SyncerConfig::from_env()?;
    config.poll_interval = Duration::from_secs(args.interval);

    info!(
        "[CLI] 🗄️  数据库: {}:{}/{}",
        config.db_host, config.db_port, config.db_name
    );
    info!("[CLI] ⏱️  轮询间隔: {} 秒", args.interval);
    info!("[CLI] 💡 提示：程序将持续运行，按 Ctrl+C 退出");

    // 监督循环内部处理重启，正常情况下永不返回
    HistorySyncer::run_supervised(config).await;

    Ok(())
}
