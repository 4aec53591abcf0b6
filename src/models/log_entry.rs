//! 处理日志条目

use serde::{Deserialize, Serialize};
use std::fmt;

/// 日志类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Info,
    Success,
    Error,
    Progress,
}

impl LogKind {
    /// Progress 日志只进内存，不写配置文件
    pub fn is_persisted(self) -> bool {
        !matches!(self, LogKind::Progress)
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LogKind::Info => "info",
            LogKind::Success => "success",
            LogKind::Error => "error",
            LogKind::Progress => "progress",
        };
        write!(f, "{}", label)
    }
}

/// 一条处理日志
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub message: String,
    #[serde(rename = "log_type")]
    pub kind: LogKind,
    pub session_id: Option<String>,
}

impl LogEntry {
    /// 以当前时间创建日志
    pub fn now(message: impl Into<String>, kind: LogKind, session_id: Option<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            message: message.into(),
            kind,
            session_id,
        }
    }

    /// 与另一条日志是否为重复的进度消息
    pub fn is_duplicate_progress_of(&self, other: &LogEntry) -> bool {
        self.kind == LogKind::Progress && other.kind == self.kind && other.message == self.message
    }
}
