use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use intake_orchestrator::models::SessionStatus;
use intake_orchestrator::utils::logging;
use intake_orchestrator::{App, Config, RunRequest};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "intake-orchestrator")]
#[command(about = "PDF 批量处理会话编排", long_about = None)]
struct Cli {
    /// 显示 debug 日志
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 处理一个目录（或单个文件）并等待结束
    Run {
        /// 输入目录；不指定时使用上次的目录
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// 输出目录；不指定时使用上次的目录
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// 输入是单个 PDF 文件
        #[arg(long)]
        file: bool,
        /// 让 worker 输出详细信息（会被记住）
        #[arg(long, action = ArgAction::SetTrue, overrides_with = "no_verbose")]
        verbose: bool,
        /// 关闭详细信息（会被记住）
        #[arg(long, action = ArgAction::SetTrue, overrides_with = "verbose")]
        no_verbose: bool,
    },
    /// 列出目录中的 PDF
    Files { dir: Option<PathBuf> },
    /// 列出输出目录中的 JSON 结果
    Results { dir: Option<PathBuf> },
    /// 显示一个 JSON 结果文件
    Show { path: PathBuf },
    /// 用系统程序打开文件或目录
    Open { path: PathBuf },
    /// 显示持久化的处理日志
    Logs {
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },
    /// 清空处理日志
    ClearLogs,
    /// 修复配置文件
    Repair,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 加载配置
    let config = Config::load()?;

    // 初始化日志
    logging::init(cli.debug || config.verbose_logging);

    let app = App::initialize(config).await.context("初始化应用失败")?;

    match cli.command {
        Commands::Run {
            input,
            output,
            file,
            verbose,
            no_verbose,
        } => {
            let request = RunRequest {
                input,
                output,
                single_file: file,
                verbose: verbose_override(verbose, no_verbose),
            };
            let outcome = tokio::select! {
                result = app.run(request) => result.context("处理失败"),
                _ = tokio::signal::ctrl_c() => {
                    warn!("⏹️ 收到中断信号，正在取消会话");
                    app.shutdown().await;
                    bail!("会话已被中断");
                }
            };
            app.shutdown().await;

            let session = outcome?;
            if session.status == SessionStatus::Failed {
                bail!("会话 {} 以失败结束，共 {} 个错误", session.id, session.errors.len());
            }
            return Ok(());
        }
        Commands::Files { dir } => {
            for info in app.list_pdfs(dir).await? {
                println!("{}\t{} bytes\t{}", info.file_name, info.file_size, info.file_path.display());
            }
        }
        Commands::Results { dir } => {
            for info in app.list_results(dir).await? {
                println!("{}\t{} bytes\t{}", info.file_name, info.file_size, info.file_path.display());
            }
        }
        Commands::Show { path } => {
            let value = app.read_result(&path).await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Commands::Open { path } => app.open(&path).await?,
        Commands::Logs { limit } => {
            let logs = app.persisted_logs().await?;
            let skip = logs.len().saturating_sub(limit);
            for entry in logs.iter().skip(skip) {
                println!("{} [{}] {}", entry.timestamp, entry.kind, entry.message);
            }
        }
        Commands::ClearLogs => app.clear_logs().await?,
        Commands::Repair => {
            let report = app.repair_config().await?;
            info!("{:?}", report.outcome);
            for step in &report.steps {
                println!("{}", step);
            }
        }
    }

    app.shutdown().await;
    Ok(())
}

/// `--verbose` / `--no-verbose` 都没给时沿用保存的设置
fn verbose_override(verbose: bool, no_verbose: bool) -> Option<bool> {
    match (verbose, no_verbose) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}
