//! 外部提取命令
//!
//! 每个 PDF 调用一次 `<command> <pdf> <output_dir> [--verbose]`，
//! 约定命令在输出目录写出 `<文件名>.json`。

use crate::error::WorkerError;
use crate::infrastructure::DocumentProcessor;
use crate::utils::logging::truncate_text;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

/// 调用外部命令的文档处理器
pub struct CommandProcessor {
    program: String,
}

impl CommandProcessor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl DocumentProcessor for CommandProcessor {
    async fn process(&self, pdf: &Path, output_dir: &Path, verbose: bool) -> Result<PathBuf, WorkerError> {
        let mut command = Command::new(&self.program);
        command.arg(pdf).arg(output_dir);
        if verbose {
            command.arg("--verbose");
        }

        debug!("执行提取命令: {} {}", self.program, pdf.display());

        let output = command.output().await.map_err(|e| {
            WorkerError::Unavailable(format!("无法启动提取命令 {}: {}", self.program, e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WorkerError::invalid_input(
                pdf,
                format!(
                    "提取命令退出码 {:?}: {}",
                    output.status.code(),
                    truncate_text(stderr.trim(), 200)
                ),
            ));
        }

        let stem = pdf.file_stem().and_then(|s| s.to_str()).unwrap_or("output");
        Ok(output_dir.join(format!("{}.json", stem)))
    }
}
