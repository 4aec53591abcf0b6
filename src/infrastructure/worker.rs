//! worker 接口 - 基础设施层
//!
//! 真正的 PDF 解析在 worker 中完成，编排层只通过这里的 trait 调用它。

use crate::error::WorkerError;
use crate::models::{DirectoryKind, FileInfo, JobInput, SubmitResponse, WorkerStatus};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// 批量处理 worker
#[async_trait]
pub trait ProcessingWorker: Send + Sync {
    /// 提交任务
    ///
    /// `provisional_id` 是编排层预先生成的 ID，worker 可以沿用也可以替换。
    async fn submit_job(
        &self,
        input: &JobInput,
        output_directory: &Path,
        verbose: bool,
        provisional_id: &str,
    ) -> Result<SubmitResponse, WorkerError>;

    /// 查询会话状态
    async fn get_status(&self, session_id: &str) -> Result<WorkerStatus, WorkerError>;

    /// 释放 worker 端的会话资源
    async fn clear_session(&self, session_id: &str) -> Result<(), WorkerError>;
}

/// 文件浏览能力
#[async_trait]
pub trait FileBrowser: Send + Sync {
    /// 递归列出目录下指定扩展名的文件
    async fn list_files(&self, dir: &Path, extension: &str) -> Result<Vec<PathBuf>, WorkerError>;

    async fn get_file_info(&self, path: &Path) -> Result<FileInfo, WorkerError>;

    /// 用系统默认程序打开文件
    async fn open_file(&self, path: &Path) -> Result<(), WorkerError>;

    async fn open_folder(&self, path: &Path) -> Result<(), WorkerError>;

    /// 目录下所有文件信息，按修改时间从新到旧；读不到信息的文件跳过
    async fn files_info(&self, dir: &Path, extension: &str) -> Result<Vec<FileInfo>, WorkerError> {
        let files = self.list_files(dir, extension).await?;
        let mut infos = Vec::with_capacity(files.len());
        for file in files {
            match self.get_file_info(&file).await {
                Ok(info) => infos.push(info),
                Err(e) => debug!("跳过无法读取的文件 {}: {}", file.display(), e),
            }
        }
        infos.sort_by(|a, b| b.modified_timestamp.cmp(&a.modified_timestamp));
        Ok(infos)
    }

    /// 读取并解析一个 JSON 结果文件
    async fn read_json(&self, path: &Path) -> Result<serde_json::Value, WorkerError> {
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if !is_json {
            return Err(WorkerError::invalid_input(path, "文件扩展名必须是 .json"));
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| WorkerError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;
        serde_json::from_str(&content)
            .map_err(|e| WorkerError::invalid_input(path, format!("JSON 解析失败: {}", e)))
    }
}

/// 默认工作目录
#[async_trait]
pub trait DefaultDirectories: Send + Sync {
    async fn default_directory(&self, kind: DirectoryKind) -> Result<PathBuf, WorkerError>;
}
