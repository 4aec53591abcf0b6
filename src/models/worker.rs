//! worker 接口的数据结构

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 提交任务的响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub session_id: String,
    /// worker 同步完成时直接给出的结果
    pub immediate_result: Option<JobResult>,
}

/// 任务结果摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub success: bool,
    pub message: String,
    pub total_processed: usize,
    pub json_file_path: Option<String>,
}

/// worker 报告的会话状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WorkerStatus {
    pub is_processing: bool,
    pub current_file: Option<String>,
    pub processed_files: usize,
    pub total_files: usize,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub progress_percentage: f64,
}

impl WorkerStatus {
    /// 开始处理时的初始状态
    pub fn started(total_files: usize) -> Self {
        Self {
            is_processing: true,
            total_files,
            ..Default::default()
        }
    }

    pub fn set_progress(&mut self, processed: usize, current_file: Option<String>) {
        self.processed_files = processed;
        self.current_file = current_file;
        self.progress_percentage = if self.total_files > 0 {
            (processed as f64 / self.total_files as f64) * 100.0
        } else {
            0.0
        };
    }
}

/// 文件信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub file_name: String,
    pub file_path: PathBuf,
    pub file_size: u64,
    pub modified_timestamp: u64,
}

/// 工作目录类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectoryKind {
    Input,
    Output,
}
