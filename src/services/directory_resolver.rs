//! 工作目录解析服务 - 业务能力层

use crate::error::AppResult;
use crate::infrastructure::DefaultDirectories;
use crate::models::{AppConfig, DirectoryKind};
use crate::services::RepairCoordinator;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// 目录解析器
///
/// 优先使用上次记住的目录，否则使用 worker 提供的默认目录。
/// 不检查目录是否存在。
#[derive(Clone)]
pub struct DirectoryResolver {
    repair: RepairCoordinator,
    defaults: Arc<dyn DefaultDirectories>,
}

impl DirectoryResolver {
    pub fn new(repair: RepairCoordinator, defaults: Arc<dyn DefaultDirectories>) -> Self {
        Self { repair, defaults }
    }

    /// 解析目录
    ///
    /// # 参数
    /// - `kind`: 输入或输出目录
    ///
    /// # 返回
    /// 记住的目录或默认目录
    pub async fn resolve(&self, kind: DirectoryKind) -> AppResult<PathBuf> {
        match self.repair.load_with_recovery().await {
            Ok(config) => {
                if let Some(dir) = remembered(&config, kind) {
                    debug!("使用上次的{:?}目录: {}", kind, dir);
                    return Ok(PathBuf::from(dir));
                }
            }
            Err(e) => warn!("⚠️ 读取配置失败，使用默认目录: {}", e),
        }

        Ok(self.defaults.default_directory(kind).await?)
    }

    /// 记住用户手动选择的目录
    pub async fn remember(&self, kind: DirectoryKind, path: &Path) -> AppResult<()> {
        let value = path.to_string_lossy().into_owned();
        let (input, output) = match kind {
            DirectoryKind::Input => (Some(value), None),
            DirectoryKind::Output => (None, Some(value)),
        };

        let store = self.repair.store();
        self.repair
            .recover(move || store.update_directories(input.clone(), output.clone()))
            .await?;
        Ok(())
    }
}

fn remembered(config: &AppConfig, kind: DirectoryKind) -> Option<&str> {
    let dir = match kind {
        DirectoryKind::Input => config.last_input_directory.as_deref(),
        DirectoryKind::Output => config.last_output_directory.as_deref(),
    };
    dir.filter(|d| !d.trim().is_empty())
}
