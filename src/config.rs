use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// 程序运行配置
///
/// 与持久化的 `AppConfig` 不同：这里只放启动参数，不会被写回磁盘。
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 轮询 worker 状态的间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 内存日志环的容量
    pub transient_log_capacity: usize,
    /// 新建配置文件时的持久化日志上限
    pub default_max_logs: usize,
    /// 配置文件所在目录
    pub config_dir: PathBuf,
    /// 配置文件名
    pub config_file_name: String,
    /// 默认工作目录根（其下有 PDFs / Results）
    pub database_root: PathBuf,
    /// 外部提取命令（每个 PDF 调用一次）
    pub processor_command: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        let database_root = PathBuf::from("Database");
        Self {
            poll_interval_ms: 500,
            transient_log_capacity: 100,
            default_max_logs: 1000,
            config_dir: database_root.join("Config"),
            config_file_name: "app_config.json".to_string(),
            database_root,
            processor_command: "pdf-extract".to_string(),
            verbose_logging: false,
        }
    }
}

impl Config {
    /// 默认值 → `INTAKE_CONFIG` 指向的 TOML 文件 → 环境变量
    pub fn load() -> Result<Self> {
        let base = match std::env::var("INTAKE_CONFIG") {
            Ok(path) => Self::from_toml_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        Ok(base.with_env_overrides())
    }

    /// 从 TOML 文件读取，缺失的字段使用默认值
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("无法读取配置文件: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("无法解析配置文件: {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn with_env_overrides(self) -> Self {
        Self {
            poll_interval_ms: env_parse("POLL_INTERVAL_MS").unwrap_or(self.poll_interval_ms),
            transient_log_capacity: env_parse("TRANSIENT_LOG_CAPACITY").unwrap_or(self.transient_log_capacity),
            default_max_logs: env_parse("DEFAULT_MAX_LOGS").unwrap_or(self.default_max_logs),
            config_dir: std::env::var("CONFIG_DIR").map(PathBuf::from).unwrap_or(self.config_dir),
            config_file_name: std::env::var("CONFIG_FILE_NAME").unwrap_or(self.config_file_name),
            database_root: std::env::var("DATABASE_ROOT").map(PathBuf::from).unwrap_or(self.database_root),
            processor_command: std::env::var("PROCESSOR_COMMAND").unwrap_or(self.processor_command),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(self.verbose_logging),
        }
    }

    /// 配置文件完整路径
    pub fn config_file_path(&self) -> PathBuf {
        self.config_dir.join(&self.config_file_name)
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
