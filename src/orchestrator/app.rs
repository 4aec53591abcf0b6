//! 应用入口 - 编排层
//!
//! ## 职责
//!
//! 1. **应用初始化**：读取配置文件（必要时修复）、恢复历史日志、创建 worker
//! 2. **运行一次处理**：解析目录、提交任务、等待会话结束并输出统计
//! 3. **资源管理**：持有会话管理器、日志聚合器和修复协调器
//!
//! 只做装配和调度，不做状态映射（交给 `SessionManager`）。

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::infrastructure::{
    CommandProcessor, DefaultDirectories, FileBrowser, JsonFileConfigBackend, LocalWorker, ProcessingWorker,
};
use crate::models::{DirectoryKind, FileInfo, JobSpec, LogEntry, RepairReport, Session};
use crate::orchestrator::events::SessionEvent;
use crate::orchestrator::SessionManager;
use crate::services::{ConfigStoreClient, DirectoryResolver, LogAggregator, RepairCoordinator};
use crate::utils::logging::{log_session_summary, log_startup};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 一次处理请求
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// 输入目录或文件，为空时使用上次或默认目录
    pub input: Option<PathBuf>,
    /// 输出目录，为空时使用上次或默认目录
    pub output: Option<PathBuf>,
    /// 输入是单个 PDF 文件
    pub single_file: bool,
    /// 覆盖保存的 verbose 设置
    pub verbose: Option<bool>,
}

/// 应用主结构
pub struct App {
    config: Config,
    repair: RepairCoordinator,
    logs: LogAggregator,
    sessions: SessionManager,
    directories: DirectoryResolver,
    browser: Option<Arc<dyn FileBrowser>>,
}

impl App {
    /// 初始化应用（本地 worker + 外部解析命令）
    pub async fn initialize(config: Config) -> AppResult<Self> {
        log_startup(&config);

        let processor = Arc::new(CommandProcessor::new(config.processor_command.clone()));
        let worker = Arc::new(LocalWorker::new(processor, config.database_root.clone()));
        let app = Self::with_worker(config, worker.clone(), worker.clone()).await?;
        Ok(app.with_file_browser(worker))
    }

    /// 使用指定的 worker 初始化
    ///
    /// # 参数
    /// - `config`: 运行配置
    /// - `worker`: 处理 worker
    /// - `defaults`: 默认目录提供者
    pub async fn with_worker(
        config: Config,
        worker: Arc<dyn ProcessingWorker>,
        defaults: Arc<dyn DefaultDirectories>,
    ) -> AppResult<Self> {
        let backend = Arc::new(JsonFileConfigBackend::new(
            config.config_file_path(),
            config.default_max_logs,
        ));
        let store = ConfigStoreClient::new(backend);
        let repair = RepairCoordinator::new(store);

        let saved = repair.load_with_recovery().await?;
        let logs = LogAggregator::from_config(repair.clone(), &config);
        logs.restore(&saved);
        info!(
            "📝 已加载配置，历史日志 {} 条 (上限 {})",
            saved.processing_logs.len(),
            saved.max_logs
        );

        let sessions = SessionManager::new(worker, logs.clone(), config.poll_interval());
        let directories = DirectoryResolver::new(repair.clone(), defaults);

        Ok(Self {
            config,
            repair,
            logs,
            sessions,
            directories,
            browser: None,
        })
    }

    pub fn with_file_browser(mut self, browser: Arc<dyn FileBrowser>) -> Self {
        self.browser = Some(browser);
        self
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn logs(&self) -> &LogAggregator {
        &self.logs
    }

    pub fn directories(&self) -> &DirectoryResolver {
        &self.directories
    }

    /// 运行一次处理，直到会话结束
    ///
    /// # 返回
    /// 结束时的会话快照
    pub async fn run(&self, request: RunRequest) -> AppResult<Session> {
        let spec = self.build_spec(&request).await?;
        info!("{}", "=".repeat(60));
        info!("📂 输入: {}", spec.input.path().display());
        info!("📁 输出: {}", spec.output_directory.display());
        info!("{}", "=".repeat(60));

        let mut events = self.sessions.subscribe();
        let handle = self.sessions.submit(spec).await?;
        if let Some(result) = &handle.immediate_result {
            info!("⚡ worker 直接返回结果: {}", result.message);
        }

        let wait_step = self.config.poll_interval() * 4;
        loop {
            match tokio::time::timeout(wait_step, events.recv()).await {
                Ok(Some(SessionEvent::Finished(session))) if session.id == handle.session_id => {
                    log_session_summary(&session);
                    self.logs.flush().await;
                    return Ok(session);
                }
                Ok(Some(SessionEvent::Cancelled { session_id })) if session_id == handle.session_id => {
                    self.logs.flush().await;
                    return Err(AppError::Other(format!("会话 {} 已取消", session_id)));
                }
                Ok(Some(SessionEvent::Progress(session))) => {
                    debug!("进度 {:.0}%", session.progress_percentage());
                }
                Ok(Some(_)) => {}
                Ok(None) => return Err(AppError::Other("会话事件通道已关闭".to_string())),
                Err(_) => {
                    // 事件可能因缓冲区满而丢失，直接检查状态
                    if !self.sessions.is_active() {
                        if let Some(session) = self
                            .sessions
                            .last_outcome()
                            .filter(|s| s.id == handle.session_id)
                        {
                            log_session_summary(&session);
                            self.logs.flush().await;
                            return Ok(session);
                        }
                    }
                }
            }
        }
    }

    async fn build_spec(&self, request: &RunRequest) -> AppResult<JobSpec> {
        let input = match &request.input {
            Some(path) => {
                let kind_dir = if request.single_file {
                    path.parent().unwrap_or(path.as_path())
                } else {
                    path.as_path()
                };
                self.remember(DirectoryKind::Input, kind_dir).await;
                path.clone()
            }
            None if request.single_file => {
                return Err(AppError::Other("单文件模式需要指定输入文件".to_string()));
            }
            None => self.directories.resolve(DirectoryKind::Input).await?,
        };

        let output = match &request.output {
            Some(path) => {
                self.remember(DirectoryKind::Output, path).await;
                path.clone()
            }
            None => self.directories.resolve(DirectoryKind::Output).await?,
        };

        let verbose = match request.verbose {
            Some(verbose) => {
                let store = self.repair.store();
                if let Err(e) = self.repair.recover(move || store.update_verbose(verbose)).await {
                    warn!("⚠️ 保存 verbose 设置失败: {}", e);
                }
                verbose
            }
            None => self
                .repair
                .load_with_recovery()
                .await
                .map(|c| c.verbose)
                .unwrap_or(self.config.verbose_logging),
        };

        Ok(if request.single_file {
            JobSpec::file(input, output, verbose)
        } else {
            JobSpec::directory(input, output, verbose)
        })
    }

    async fn remember(&self, kind: DirectoryKind, path: &Path) {
        if let Err(e) = self.directories.remember(kind, path).await {
            warn!("⚠️ 保存{:?}目录失败: {}", kind, e);
        }
    }

    /// 列出目录下的 PDF 文件信息（新的在前）
    pub async fn list_pdfs(&self, dir: Option<PathBuf>) -> AppResult<Vec<FileInfo>> {
        let browser = self.file_browser()?;
        let dir = match dir {
            Some(dir) => dir,
            None => self.directories.resolve(DirectoryKind::Input).await?,
        };

        Ok(browser.files_info(&dir, "pdf").await?)
    }

    /// 列出输出目录下的 JSON 结果文件（新的在前）
    pub async fn list_results(&self, dir: Option<PathBuf>) -> AppResult<Vec<FileInfo>> {
        let browser = self.file_browser()?;
        let dir = match dir {
            Some(dir) => dir,
            None => self.directories.resolve(DirectoryKind::Output).await?,
        };

        Ok(browser.files_info(&dir, "json").await?)
    }

    /// 读取一个 JSON 结果文件
    pub async fn read_result(&self, path: &Path) -> AppResult<serde_json::Value> {
        Ok(self.file_browser()?.read_json(path).await?)
    }

    /// 用系统程序打开文件或目录
    pub async fn open(&self, path: &Path) -> AppResult<()> {
        let browser = self.file_browser()?;
        if path.is_dir() {
            browser.open_folder(path).await?;
        } else {
            browser.open_file(path).await?;
        }
        Ok(())
    }

    fn file_browser(&self) -> AppResult<&Arc<dyn FileBrowser>> {
        self.browser
            .as_ref()
            .ok_or_else(|| AppError::Other("当前 worker 不支持文件浏览".to_string()))
    }

    /// 持久化的处理日志
    pub async fn persisted_logs(&self) -> AppResult<Vec<LogEntry>> {
        self.logs.flush().await;
        Ok(self.repair.load_with_recovery().await?.processing_logs)
    }

    pub async fn clear_logs(&self) -> AppResult<()> {
        self.logs.clear().await
    }

    /// 手动修复配置文件
    pub async fn repair_config(&self) -> AppResult<RepairReport> {
        self.logs.flush().await;
        let report = self.repair.repair().await?;
        if !report.is_skipped() {
            self.logs.info(format!("🔧 配置修复完成\n{}", report.summary()), None);
        }
        Ok(report)
    }

    /// 停止会话并等待日志写完
    pub async fn shutdown(&self) {
        self.sessions.teardown().await;
        self.logs.flush().await;
        info!("👋 程序退出");
    }
}
