//! 处理会话模型

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Idle,
    Submitting,
    Processing,
    Completed,
    Failed,
}

impl SessionStatus {
    /// 是否占用"唯一活动会话"名额
    pub fn is_active(self) -> bool {
        matches!(self, SessionStatus::Submitting | SessionStatus::Processing)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionStatus::Idle => "空闲",
            SessionStatus::Submitting => "提交中",
            SessionStatus::Processing => "处理中",
            SessionStatus::Completed => "已完成",
            SessionStatus::Failed => "失败",
        };
        write!(f, "{}", label)
    }
}

/// 一次批量处理任务
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Session {
    pub id: String,
    pub status: SessionStatus,
    pub current_file: Option<String>,
    pub processed_count: usize,
    pub total_count: usize,
    pub errors: Vec<String>,
}

impl Session {
    /// 空闲会话
    pub fn idle() -> Self {
        Self::default()
    }

    /// 进入提交状态的新会话
    pub fn submitting(provisional_id: impl Into<String>) -> Self {
        Self {
            id: provisional_id.into(),
            status: SessionStatus::Submitting,
            ..Default::default()
        }
    }

    pub fn progress_percentage(&self) -> f64 {
        if self.total_count == 0 {
            0.0
        } else {
            (self.processed_count as f64 / self.total_count as f64) * 100.0
        }
    }
}

/// 任务输入：整个目录或单个文件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "path", rename_all = "lowercase")]
pub enum JobInput {
    Directory(PathBuf),
    File(PathBuf),
}

impl JobInput {
    pub fn path(&self) -> &PathBuf {
        match self {
            JobInput::Directory(path) | JobInput::File(path) => path,
        }
    }

    /// 生成临时会话 ID，提交成功后以 worker 返回的为准
    pub fn provisional_id(&self) -> String {
        let millis = chrono::Utc::now().timestamp_millis();
        match self {
            JobInput::Directory(_) => format!("pdf_directory_{}", millis),
            JobInput::File(_) => format!("pdf_file_{}", millis),
        }
    }
}

/// 提交给 worker 的任务参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub input: JobInput,
    pub output_directory: PathBuf,
    pub verbose: bool,
}

impl JobSpec {
    pub fn directory(input: impl Into<PathBuf>, output: impl Into<PathBuf>, verbose: bool) -> Self {
        Self {
            input: JobInput::Directory(input.into()),
            output_directory: output.into(),
            verbose,
        }
    }

    pub fn file(input: impl Into<PathBuf>, output: impl Into<PathBuf>, verbose: bool) -> Self {
        Self {
            input: JobInput::File(input.into()),
            output_directory: output.into(),
            verbose,
        }
    }

    /// 缺失的必填路径，全部齐全时返回 None
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.input.path().as_os_str().is_empty() {
            Some("input")
        } else if self.output_directory.as_os_str().is_empty() {
            Some("output_directory")
        } else {
            None
        }
    }
}

/// 提交成功后返回给调用方的句柄
#[derive(Debug, Clone, PartialEq)]
pub struct SessionHandle {
    pub session_id: String,
    pub immediate_result: Option<crate::models::JobResult>,
}
