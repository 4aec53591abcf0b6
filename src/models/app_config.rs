//! 持久化的应用配置

use crate::models::LogEntry;
use serde::{Deserialize, Serialize};

/// 默认保留的持久化日志条数
pub const DEFAULT_MAX_LOGS: usize = 1000;

/// 应用配置（整个文件一次读写）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub last_input_directory: Option<String>,
    pub last_output_directory: Option<String>,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub processing_logs: Vec<LogEntry>,
    #[serde(default = "default_max_logs")]
    pub max_logs: usize,
    pub created_at: String,
    pub updated_at: String,
}

fn default_max_logs() -> usize {
    DEFAULT_MAX_LOGS
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::with_max_logs(DEFAULT_MAX_LOGS)
    }
}

impl AppConfig {
    pub fn with_max_logs(max_logs: usize) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            last_input_directory: None,
            last_output_directory: None,
            verbose: false,
            processing_logs: Vec::new(),
            max_logs,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// 刷新 updated_at
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }

    /// 只保留最新的 max_logs 条日志
    pub fn trim_logs(&mut self) {
        let total = self.processing_logs.len();
        if total > self.max_logs {
            self.processing_logs.drain(..total - self.max_logs);
        }
    }
}
