use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 提交任务错误
    #[error("提交错误: {0}")]
    Submit(#[from] SubmitError),
    /// 轮询错误
    #[error("轮询错误: {0}")]
    Poll(#[from] PollError),
    /// 配置存储错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 配置修复错误
    #[error("修复错误: {0}")]
    Repair(#[from] RepairError),
    /// worker 错误
    #[error("worker 错误: {0}")]
    Worker(#[from] WorkerError),
    /// 其他错误
    #[error("错误: {0}")]
    Other(String),
}

/// 提交任务错误
#[derive(Debug, Error)]
pub enum SubmitError {
    /// 已有会话在运行
    #[error("已有会话正在处理中: {active_id}")]
    AlreadyRunning { active_id: String },
    /// 任务参数不完整
    #[error("任务参数无效: {0}")]
    InvalidSpec(String),
    /// worker 拒绝了任务
    #[error("worker 拒绝任务: {0}")]
    Worker(String),
    /// 提交过程中会话被取消
    #[error("会话 {session_id} 在提交过程中被取消")]
    Cancelled { session_id: String },
}

/// 轮询错误
#[derive(Debug, Error)]
pub enum PollError {
    /// worker 无法访问
    #[error("无法获取会话 {session_id} 的状态: {detail}")]
    WorkerUnreachable { session_id: String, detail: String },
}

/// 配置损坏类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorruptionKind {
    /// 文件不是合法的 UTF-8 文本
    InvalidEncoding,
    /// 结构无法反序列化（如尾部多余数据）
    Malformed,
}

impl fmt::Display for CorruptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorruptionKind::InvalidEncoding => write!(f, "编码无效"),
            CorruptionKind::Malformed => write!(f, "结构损坏"),
        }
    }
}

/// 配置存储错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置文件已损坏
    #[error("配置文件已损坏 ({kind}, {}): {detail}", .path.display())]
    CorruptedFile {
        path: PathBuf,
        kind: CorruptionKind,
        detail: String,
    },
    /// 配置文件不存在
    #[error("配置文件不存在: {}", .path.display())]
    NotFound { path: PathBuf },
    /// 读写失败
    #[error("配置文件读写失败 ({}): {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// 序列化失败
    #[error("配置序列化失败: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// 配置修复错误
#[derive(Debug, Error)]
pub enum RepairError {
    /// 另一次修复正在进行
    #[error("配置修复正在进行中，本次跳过")]
    AlreadyInProgress,
    /// 修复失败，不再重试
    #[error("配置无法修复: {0}")]
    Unrecoverable(String),
}

/// worker 错误
#[derive(Debug, Error)]
pub enum WorkerError {
    /// 会话不存在
    #[error("处理会话不存在: {0}")]
    SessionNotFound(String),
    /// 输入不合法
    #[error("输入无效 ({}): {reason}", .path.display())]
    InvalidInput { path: PathBuf, reason: String },
    /// 文件系统错误
    #[error("文件操作失败 ({}): {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// worker 不可用
    #[error("worker 不可用: {0}")]
    Unavailable(String),
}

// ========== 便捷构造函数 ==========

impl ConfigError {
    /// 创建读写错误
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::Io {
            path: path.into(),
            source,
        }
    }

    /// 创建损坏错误
    pub fn corrupted(path: impl Into<PathBuf>, kind: CorruptionKind, detail: impl Into<String>) -> Self {
        ConfigError::CorruptedFile {
            path: path.into(),
            kind,
            detail: detail.into(),
        }
    }
}

impl WorkerError {
    /// 创建文件系统错误
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        WorkerError::Io {
            path: path.into(),
            source,
        }
    }

    /// 创建输入无效错误
    pub fn invalid_input(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        WorkerError::InvalidInput {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
