//! 配置修复协调器 - 业务能力层
//!
//! 保证同一时刻最多只有一次修复在执行，并在修复后通知读者重新加载。

use crate::error::{AppResult, ConfigError, RepairError};
use crate::models::{AppConfig, RepairReport};
use crate::services::ConfigStoreClient;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// 修复协调器
///
/// 可以廉价克隆，所有克隆共享同一个"修复中"标志。
#[derive(Clone)]
pub struct RepairCoordinator {
    inner: Arc<RepairInner>,
}

struct RepairInner {
    store: ConfigStoreClient,
    in_progress: AtomicBool,
    /// 每次修复成功后递增
    reloads: watch::Sender<u64>,
}

/// 持有期间标志为 true，释放时清除
struct RepairGuard {
    inner: Arc<RepairInner>,
}

impl RepairGuard {
    fn acquire(inner: &Arc<RepairInner>) -> Option<Self> {
        inner
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                inner: inner.clone(),
            })
    }
}

impl Drop for RepairGuard {
    fn drop(&mut self) {
        self.inner.in_progress.store(false, Ordering::Release);
    }
}

impl RepairCoordinator {
    pub fn new(store: ConfigStoreClient) -> Self {
        let (reloads, _) = watch::channel(0);
        Self {
            inner: Arc::new(RepairInner {
                store,
                in_progress: AtomicBool::new(false),
                reloads,
            }),
        }
    }

    pub fn store(&self) -> &ConfigStoreClient {
        &self.inner.store
    }

    pub fn is_in_progress(&self) -> bool {
        self.inner.in_progress.load(Ordering::Acquire)
    }

    /// 错误是否表示本配置文件已损坏
    pub fn is_corruption(&self, err: &ConfigError) -> bool {
        match err {
            ConfigError::CorruptedFile { path, .. } => path.as_path() == self.inner.store.identity(),
            _ => false,
        }
    }

    /// 订阅"修复完成，请重新加载"通知
    pub fn subscribe_reloads(&self) -> watch::Receiver<u64> {
        self.inner.reloads.subscribe()
    }

    /// 执行修复
    ///
    /// 已有修复在进行时立即返回 `Skipped` 报告，不触碰配置文件。
    pub async fn repair(&self) -> Result<RepairReport, RepairError> {
        match RepairGuard::acquire(&self.inner) {
            Some(guard) => self.run(guard).await,
            None => {
                info!("⏭️ 配置修复正在进行中，跳过本次请求");
                Ok(RepairReport::skipped())
            }
        }
    }

    /// 在后台安排一次修复
    ///
    /// 标志在返回前同步设置，同一次损坏只会安排一次。
    ///
    /// # 返回
    /// 是否真的安排了修复
    pub fn schedule(&self) -> bool {
        let Some(guard) = RepairGuard::acquire(&self.inner) else {
            return false;
        };

        let coordinator = self.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            if let Err(e) = coordinator.run(guard).await {
                error!("❌ 后台配置修复失败: {}", e);
            }
        });
        true
    }

    async fn run(&self, guard: RepairGuard) -> Result<RepairReport, RepairError> {
        warn!("🔧 开始修复配置文件: {}", self.inner.store.identity().display());

        let result = self.inner.store.repair().await;
        drop(guard);

        match result {
            Ok(report) => {
                info!("✅ 配置修复完成 ({:?})", report.outcome);
                for step in &report.steps {
                    info!("   {}", step);
                }
                self.inner.reloads.send_modify(|generation| *generation += 1);
                Ok(report)
            }
            Err(e) => {
                error!("❌ 配置修复失败: {}", e);
                Err(RepairError::Unrecoverable(e.to_string()))
            }
        }
    }

    /// 执行一次配置操作，遇到损坏时修复并重试一次
    ///
    /// # 参数
    /// - `op`: 可以重复调用的配置操作
    ///
    /// # 返回
    /// 重试后的结果；修复被跳过时返回 `RepairError::AlreadyInProgress`
    pub async fn recover<T, F, Fut>(&self, mut op: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ConfigError>>,
    {
        match op().await {
            Ok(value) => Ok(value),
            Err(e) if self.is_corruption(&e) => {
                warn!("⚠️ 检测到配置文件损坏: {}", e);
                let report = self.repair().await?;
                if report.is_skipped() {
                    return Err(RepairError::AlreadyInProgress.into());
                }
                Ok(op().await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// 加载配置（必要时修复并重试一次）
    pub async fn load_with_recovery(&self) -> AppResult<AppConfig> {
        let store = &self.inner.store;
        self.recover(move || store.initialize()).await
    }
}
