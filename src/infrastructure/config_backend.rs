//! 配置存储后端 - 基础设施层
//!
//! 持有配置文件，只暴露整文件的读、写、修复能力。
//! 字段级别的修改由 `services::ConfigStoreClient` 通过"读-改-写"完成。

use crate::error::{ConfigError, CorruptionKind};
use crate::models::{AppConfig, RepairOutcome, RepairReport};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// 配置存储后端
#[async_trait]
pub trait ConfigBackend: Send + Sync {
    /// 配置文件的身份（用于判断错误是否指向本文件）
    fn identity(&self) -> &Path;

    /// 新建配置时使用的默认值
    fn default_config(&self) -> AppConfig;

    async fn load(&self) -> Result<AppConfig, ConfigError>;

    async fn save(&self, config: &AppConfig) -> Result<(), ConfigError>;

    /// 修复原语：写入一份合法的配置（抢救内容或默认值）
    async fn repair(&self) -> Result<RepairReport, ConfigError>;
}

/// JSON 文件配置后端
pub struct JsonFileConfigBackend {
    path: PathBuf,
    default_max_logs: usize,
}

impl JsonFileConfigBackend {
    pub fn new(path: impl Into<PathBuf>, default_max_logs: usize) -> Self {
        Self {
            path: path.into(),
            default_max_logs,
        }
    }

    fn backup_path(&self) -> PathBuf {
        self.path.with_extension("json.backup")
    }

    fn tmp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }

    async fn ensure_parent_dir(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| ConfigError::io(parent, e))?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ConfigBackend for JsonFileConfigBackend {
    fn identity(&self) -> &Path {
        &self.path
    }

    fn default_config(&self) -> AppConfig {
        AppConfig::with_max_logs(self.default_max_logs)
    }

    async fn load(&self) -> Result<AppConfig, ConfigError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ConfigError::NotFound {
                    path: self.path.clone(),
                })
            }
            Err(e) => return Err(ConfigError::io(&self.path, e)),
        };

        parse_config(&self.path, &bytes)
    }

    async fn save(&self, config: &AppConfig) -> Result<(), ConfigError> {
        self.ensure_parent_dir().await?;

        let content = serde_json::to_string_pretty(config)?;
        let tmp = self.tmp_path();

        // 先写临时文件再重命名，避免写到一半留下损坏的配置
        fs::write(&tmp, content)
            .await
            .map_err(|e| ConfigError::io(&tmp, e))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| ConfigError::io(&self.path, e))?;

        debug!("配置已保存: {}", self.path.display());
        Ok(())
    }

    async fn repair(&self) -> Result<RepairReport, ConfigError> {
        let mut report = RepairReport::new(RepairOutcome::Repaired);
        report.step(format!("配置文件路径: {}", self.path.display()));

        let salvaged = match fs::read(&self.path).await {
            Ok(bytes) => {
                report.step(format!("配置文件读取成功 ({} 字节)", bytes.len()));
                match parse_config(&self.path, &bytes) {
                    Ok(_) => {
                        report.outcome = RepairOutcome::AlreadyHealthy;
                        report.step("配置文件完好，无需修复");
                        return Ok(report);
                    }
                    Err(e) => {
                        report.step(format!("配置解析失败: {}", e));
                        let backup = self.backup_path();
                        match fs::write(&backup, &bytes).await {
                            Ok(()) => {
                                report.step(format!("已备份损坏文件: {}", backup.display()));
                                report.backup_path = Some(backup);
                            }
                            Err(e) => {
                                warn!("备份损坏的配置文件失败: {}", e);
                                report.step(format!("备份失败: {}", e));
                            }
                        }
                        salvage_config(&bytes)
                    }
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                report.step("配置文件不存在");
                None
            }
            Err(e) => {
                report.step(format!("读取配置文件失败: {}", e));
                None
            }
        };

        let mut config = match salvaged {
            Some(config) => {
                report.salvaged = true;
                report.step("已从损坏文件中恢复出完整配置");
                config
            }
            None => {
                report.step("使用默认配置重建");
                self.default_config()
            }
        };
        config.trim_logs();
        config.touch();

        self.save(&config).await?;
        report.step("新配置已写入");

        Ok(report)
    }
}

/// 解析配置内容，把编码和结构问题归类为损坏
fn parse_config(path: &Path, bytes: &[u8]) -> Result<AppConfig, ConfigError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| ConfigError::corrupted(path, CorruptionKind::InvalidEncoding, e.to_string()))?;

    serde_json::from_str(text)
        .map_err(|e| ConfigError::corrupted(path, CorruptionKind::Malformed, e.to_string()))
}

/// 尝试取出文件开头第一份完整的配置（应对尾部多余数据）
fn salvage_config(bytes: &[u8]) -> Option<AppConfig> {
    let text = String::from_utf8_lossy(bytes);
    let mut stream = serde_json::Deserializer::from_str(&text).into_iter::<AppConfig>();
    match stream.next() {
        Some(Ok(config)) => Some(config),
        _ => None,
    }
}
