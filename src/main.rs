//! 应用程序入口 (Application Entrypoint)
//!
//! 负责 CLI 指令解析、遥测层初始化、依赖注入及系统生命周期管理。

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::fmt::MakeWriter;

use novel_spider::core::config::AppConfig;
use novel_spider::core::event::create_event_channel;
use novel_spider::core::metrics::render_metrics;
use novel_spider::engine::{Composer, ScrapeEngine};
use novel_spider::network::HttpFetcher;
use novel_spider::storage::{Repository, StorageLock};
use novel_spider::ui::{Ui, get_multi};

/// 进度条感知的日志写入器 (TUI-aware Log Writer)
///
/// 确保非同步日志输出不会破坏终端进度条的渲染布局。
struct IndicatifWriter;

impl io::Write for IndicatifWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let _ = get_multi().println(s.trim_end());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for IndicatifWriter {
    type Writer = IndicatifWriter;

    fn make_writer(&self) -> Self::Writer {
        IndicatifWriter
    }
}

/// 命令行界面脚手架 (CLI Scaffolding)
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 按目录顺序抓取并组装小说，从上次断点继续
    Crawl {
        /// 清空断点，从第一本小说重新开始
        #[arg(long)]
        reset: bool,
        /// 忽略已存储的章节，全部重新抓取
        #[arg(long)]
        force: bool,
    },
    /// 仅从已存储的章节分片组装一本小说
    Compose {
        /// 小说 ID
        #[arg(short, long)]
        novel: String,
    },
    /// 输出运行状态指标
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 遥测层初始化 (Telemetry Layer Initialization)
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(IndicatifWriter)
        .with_target(false)
        .with_ansi(true)
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::load(&cli.config)?;
    let repo = Repository::open(&config.storage_path);

    match cli.command {
        Commands::Status => {
            let statistic = repo.load_statistic().await?.unwrap_or_default();
            println!("{}", render_metrics(&statistic));
        }
        Commands::Compose { novel } => {
            // 仅读取已存储分片，不需要网络客户端
            let _lock = StorageLock::acquire(&config.storage_path)?;
            let site = config.compile()?;
            let path = Composer::new(&site, &repo, config.output_dir())
                .compose(&novel)
                .await?;
            tracing::info!("已输出: {}", path.display());
        }
        Commands::Crawl { reset, force } => {
            if force {
                config.spider.force_refetch = true;
            }
            let _lock = StorageLock::acquire(&config.storage_path)?;
            let site = Arc::new(config.compile()?);
            let fetcher = Arc::new(HttpFetcher::new(&config.spider)?);

            // 建立 UI 事件反馈链路 (Event feedback loop)
            let (event_sender, event_receiver) = create_event_channel();
            let ui_handle = Ui::run(event_receiver);

            // 信号处理与优雅退出 (Signal Handling)
            let shutdown = CancellationToken::new();
            let token = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("收到中断信号，当前请求结束后退出");
                    token.cancel();
                }
            });

            // 任务域限制 (Scope isolation for proper RAII cleanup)
            let result = {
                let engine = ScrapeEngine::new(Arc::new(config), site, repo, fetcher)
                    .with_events(event_sender)
                    .with_shutdown(shutdown);
                if reset {
                    engine.reset().await?;
                }
                engine.run().await
            };

            // Await UI shutdown after event sender closure
            let _ = ui_handle.await;

            let outputs = result?;
            tracing::info!("本次共输出 {} 个文档", outputs.len());
        }
    }

    Ok(())
}
