//! 本地 worker - 基础设施层
//!
//! 在进程内维护会话状态表，逐个把 PDF 交给 `DocumentProcessor`。
//! 同时提供文件浏览和默认目录能力。

use crate::error::WorkerError;
use crate::infrastructure::worker::{DefaultDirectories, FileBrowser, ProcessingWorker};
use crate::models::{DirectoryKind, FileInfo, JobInput, SubmitResponse, WorkerStatus};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::UNIX_EPOCH;
use tokio::fs;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// 单个文档的处理能力（真正的解析逻辑在外部）
#[async_trait]
pub trait DocumentProcessor: Send + Sync {
    /// 处理一个 PDF，返回生成的 JSON 文件路径
    async fn process(&self, pdf: &Path, output_dir: &Path, verbose: bool) -> Result<PathBuf, WorkerError>;
}

type StatusTable = Arc<Mutex<HashMap<String, WorkerStatus>>>;

/// 本地 worker
#[derive(Clone)]
pub struct LocalWorker {
    sessions: StatusTable,
    processor: Arc<dyn DocumentProcessor>,
    database_root: PathBuf,
}

impl LocalWorker {
    pub fn new(processor: Arc<dyn DocumentProcessor>, database_root: impl Into<PathBuf>) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            processor,
            database_root: database_root.into(),
        }
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, WorkerStatus>> {
        lock_table(&self.sessions)
    }

    /// 校验输入并收集待处理的 PDF
    async fn collect_inputs(&self, input: &JobInput) -> Result<Vec<PathBuf>, WorkerError> {
        match input {
            JobInput::Directory(dir) => {
                if !fs::try_exists(dir).await.unwrap_or(false) {
                    return Err(WorkerError::invalid_input(dir, "输入目录不存在"));
                }
                let files = walk_files(dir.clone(), "pdf").await?;
                if files.is_empty() {
                    return Err(WorkerError::invalid_input(dir, "目录中没有找到 PDF 文件"));
                }
                Ok(files)
            }
            JobInput::File(file) => {
                if !fs::try_exists(file).await.unwrap_or(false) {
                    return Err(WorkerError::invalid_input(file, "文件不存在"));
                }
                if !has_extension(file, "pdf") {
                    return Err(WorkerError::invalid_input(file, "文件必须是 .pdf 格式"));
                }
                Ok(vec![file.clone()])
            }
        }
    }
}

#[async_trait]
impl ProcessingWorker for LocalWorker {
    async fn submit_job(
        &self,
        input: &JobInput,
        output_directory: &Path,
        verbose: bool,
        provisional_id: &str,
    ) -> Result<SubmitResponse, WorkerError> {
        let files = self.collect_inputs(input).await?;

        fs::create_dir_all(output_directory)
            .await
            .map_err(|e| WorkerError::io(output_directory, e))?;

        let session_id = if provisional_id.is_empty() {
            input.provisional_id()
        } else {
            provisional_id.to_string()
        };

        {
            let mut table = self.table();
            if table.get(&session_id).is_some_and(|s| s.is_processing) {
                return Err(WorkerError::Unavailable(format!("会话 {} 已在运行", session_id)));
            }
            table.insert(session_id.clone(), WorkerStatus::started(files.len()));
        }

        info!("[worker] 接收会话 {}，共 {} 个 PDF", session_id, files.len());

        tokio::spawn(run_session(
            self.sessions.clone(),
            self.processor.clone(),
            session_id.clone(),
            files,
            output_directory.to_path_buf(),
            verbose,
        ));

        Ok(SubmitResponse {
            session_id,
            immediate_result: None,
        })
    }

    async fn get_status(&self, session_id: &str) -> Result<WorkerStatus, WorkerError> {
        self.table()
            .get(session_id)
            .cloned()
            .ok_or_else(|| WorkerError::SessionNotFound(session_id.to_string()))
    }

    async fn clear_session(&self, session_id: &str) -> Result<(), WorkerError> {
        if self.table().remove(session_id).is_some() {
            debug!("[worker] 会话 {} 已清理", session_id);
        }
        Ok(())
    }
}

/// 后台逐个处理文件；会话被清理后提前结束
async fn run_session(
    sessions: StatusTable,
    processor: Arc<dyn DocumentProcessor>,
    session_id: String,
    files: Vec<PathBuf>,
    output_dir: PathBuf,
    verbose: bool,
) {
    for (index, file) in files.iter().enumerate() {
        let file_name = file
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        {
            let mut table = lock_table(&sessions);
            let Some(status) = table.get_mut(&session_id) else {
                warn!("[worker] 会话 {} 已被清理，停止处理", session_id);
                return;
            };
            status.set_progress(index, Some(file_name.clone()));
        }

        let result = processor.process(file, &output_dir, verbose).await;

        {
            let mut table = lock_table(&sessions);
            let Some(status) = table.get_mut(&session_id) else {
                warn!("[worker] 会话 {} 已被清理，停止处理", session_id);
                return;
            };
            if let Err(e) = result {
                error!("[worker] {} 处理失败: {}", file_name, e);
                status.errors.push(format!("{}: {}", file_name, e));
            }
            status.set_progress(index + 1, Some(file_name));
        }
    }

    if let Some(status) = lock_table(&sessions).get_mut(&session_id) {
        status.current_file = None;
        status.is_processing = false;
        info!(
            "[worker] 会话 {} 处理结束: {}/{}，错误 {}",
            session_id,
            status.processed_files,
            status.total_files,
            status.errors.len()
        );
    }
}

fn lock_table(sessions: &StatusTable) -> MutexGuard<'_, HashMap<String, WorkerStatus>> {
    // 状态表只做插入/读取，持锁方 panic 时数据仍可用
    sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

async fn walk_files(dir: PathBuf, extension: &str) -> Result<Vec<PathBuf>, WorkerError> {
    let extension = extension.to_string();
    let root = dir.clone();
    tokio::task::spawn_blocking(move || {
        let mut files: Vec<PathBuf> = WalkDir::new(&root)
            .into_iter()
            .filter_map(|e| match e {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("⚠️ 跳过无法读取的路径: {}", e);
                    None
                }
            })
            .filter(|e| e.file_type().is_file())
            .filter(|e| has_extension(e.path(), &extension))
            .map(|e| e.into_path())
            .collect();
        files.sort();
        files
    })
    .await
    .map_err(|e| WorkerError::Unavailable(format!("扫描目录失败 {}: {}", dir.display(), e)))
}

#[async_trait]
impl FileBrowser for LocalWorker {
    async fn list_files(&self, dir: &Path, extension: &str) -> Result<Vec<PathBuf>, WorkerError> {
        if !fs::try_exists(dir).await.unwrap_or(false) {
            return Err(WorkerError::invalid_input(dir, "目录不存在"));
        }
        walk_files(dir.to_path_buf(), extension).await
    }

    async fn get_file_info(&self, path: &Path) -> Result<FileInfo, WorkerError> {
        let metadata = fs::metadata(path).await.map_err(|e| WorkerError::io(path, e))?;
        let modified_timestamp = metadata
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|duration| duration.as_secs())
            .unwrap_or(0);

        Ok(FileInfo {
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            file_path: path.to_path_buf(),
            file_size: metadata.len(),
            modified_timestamp,
        })
    }

    async fn open_file(&self, path: &Path) -> Result<(), WorkerError> {
        if !fs::try_exists(path).await.unwrap_or(false) {
            return Err(WorkerError::invalid_input(path, "文件不存在"));
        }
        spawn_opener(path)
    }

    async fn open_folder(&self, path: &Path) -> Result<(), WorkerError> {
        if !fs::try_exists(path).await.unwrap_or(false) {
            return Err(WorkerError::invalid_input(path, "目录不存在"));
        }
        spawn_opener(path)
    }
}

/// 用系统默认程序打开，不等待其退出
fn spawn_opener(path: &Path) -> Result<(), WorkerError> {
    #[cfg(target_os = "windows")]
    let mut command = {
        let mut command = std::process::Command::new("cmd");
        command.args(["/C", "start", ""]).arg(path);
        command
    };

    #[cfg(target_os = "macos")]
    let mut command = {
        let mut command = std::process::Command::new("open");
        command.arg(path);
        command
    };

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    let mut command = {
        let mut command = std::process::Command::new("xdg-open");
        command.arg(path);
        command
    };

    command.spawn().map_err(|e| WorkerError::io(path, e))?;
    Ok(())
}

#[async_trait]
impl DefaultDirectories for LocalWorker {
    async fn default_directory(&self, kind: DirectoryKind) -> Result<PathBuf, WorkerError> {
        let dir = match kind {
            DirectoryKind::Input => self.database_root.join("PDFs"),
            DirectoryKind::Output => self.database_root.join("Results"),
        };
        fs::create_dir_all(&dir).await.map_err(|e| WorkerError::io(&dir, e))?;
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    /// 文件名包含 "bad" 时失败
    struct FakeProcessor;

    #[async_trait]
    impl DocumentProcessor for FakeProcessor {
        async fn process(&self, pdf: &Path, output_dir: &Path, _verbose: bool) -> Result<PathBuf, WorkerError> {
            let name = pdf.file_stem().unwrap().to_string_lossy().to_string();
            if name.contains("bad") {
                return Err(WorkerError::invalid_input(pdf, "无法识别的格式"));
            }
            Ok(output_dir.join(format!("{}.json", name)))
        }
    }

    fn worker_in(dir: &TempDir) -> LocalWorker {
        LocalWorker::new(Arc::new(FakeProcessor), dir.path().join("Database"))
    }

    async fn wait_until_done(worker: &LocalWorker, session_id: &str) -> WorkerStatus {
        for _ in 0..200 {
            let status = worker.get_status(session_id).await.unwrap();
            if !status.is_processing {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session {session_id} did not finish");
    }

    #[tokio::test]
    async fn test_directory_job_counts_nested_pdfs_and_collects_errors() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in");
        std::fs::create_dir_all(input.join("nested")).unwrap();
        std::fs::write(input.join("a.pdf"), b"%PDF").unwrap();
        std::fs::write(input.join("nested").join("bad.PDF"), b"%PDF").unwrap();
        std::fs::write(input.join("notes.txt"), b"skip").unwrap();
        let worker = worker_in(&dir);

        let response = worker
            .submit_job(&JobInput::Directory(input), &dir.path().join("out"), false, "pdf_directory_1")
            .await
            .unwrap();

        assert_eq!(response.session_id, "pdf_directory_1");
        assert!(dir.path().join("out").is_dir());
        let status = wait_until_done(&worker, "pdf_directory_1").await;
        assert_eq!(status.total_files, 2);
        assert_eq!(status.processed_files, 2);
        assert_eq!(status.progress_percentage, 100.0);
        assert_eq!(status.errors.len(), 1);
        assert!(status.errors[0].starts_with("bad.PDF"));
    }

    #[tokio::test]
    async fn test_empty_directory_is_rejected() {
        let dir = TempDir::new().unwrap();
        let worker = worker_in(&dir);

        let err = worker
            .submit_job(&JobInput::Directory(dir.path().to_path_buf()), dir.path(), false, "")
            .await
            .unwrap_err();

        assert!(matches!(err, WorkerError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_single_file_must_be_pdf() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("scan.png");
        std::fs::write(&file, b"png").unwrap();
        let worker = worker_in(&dir);

        let err = worker
            .submit_job(&JobInput::File(file), dir.path(), false, "")
            .await
            .unwrap_err();

        assert!(err.to_string().contains(".pdf"));
    }

    #[tokio::test]
    async fn test_cleared_session_is_unknown() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("one.pdf");
        std::fs::write(&file, b"%PDF").unwrap();
        let worker = worker_in(&dir);

        let response = worker
            .submit_job(&JobInput::File(file), &dir.path().join("out"), false, "")
            .await
            .unwrap();
        assert!(response.session_id.starts_with("pdf_file_"));
        wait_until_done(&worker, &response.session_id).await;

        worker.clear_session(&response.session_id).await.unwrap();
        worker.clear_session(&response.session_id).await.unwrap();

        let err = worker.get_status(&response.session_id).await.unwrap_err();
        assert!(matches!(err, WorkerError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn test_default_directories_are_created() {
        let dir = TempDir::new().unwrap();
        let worker = worker_in(&dir);

        let input = worker.default_directory(DirectoryKind::Input).await.unwrap();
        let output = worker.default_directory(DirectoryKind::Output).await.unwrap();

        assert!(input.ends_with("PDFs") && input.is_dir());
        assert!(output.ends_with("Results") && output.is_dir());
    }

    #[tokio::test]
    async fn test_files_info_sorted_newest_first() {
        let dir = TempDir::new().unwrap();
        let old = dir.path().join("old.pdf");
        let new = dir.path().join("new.pdf");
        std::fs::write(&old, b"1").unwrap();
        std::fs::write(&new, b"22").unwrap();
        let old_time = std::time::SystemTime::now() - Duration::from_secs(3600);
        std::fs::File::options()
            .write(true)
            .open(&old)
            .unwrap()
            .set_modified(old_time)
            .unwrap();
        let worker = worker_in(&dir);

        let infos = worker.files_info(dir.path(), "pdf").await.unwrap();

        let names: Vec<_> = infos.iter().map(|i| i.file_name.as_str()).collect();
        assert_eq!(names, vec!["new.pdf", "old.pdf"]);
        assert_eq!(infos[0].file_size, 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_subdirectory_is_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let locked = dir.path().join("locked");
        std::fs::create_dir_all(&locked).unwrap();
        std::fs::write(locked.join("hidden.pdf"), b"%PDF").unwrap();
        std::fs::write(dir.path().join("a.pdf"), b"%PDF").unwrap();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();
        let worker = worker_in(&dir);

        let files = worker.list_files(dir.path(), "pdf").await;

        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
        let files = files.unwrap();
        assert!(files.contains(&dir.path().join("a.pdf")));
    }

    #[tokio::test]
    async fn test_read_json_parses_results_and_rejects_other_files() {
        let dir = TempDir::new().unwrap();
        let result = dir.path().join("scan.json");
        std::fs::write(&result, br#"{"pages": 3}"#).unwrap();
        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, b"{ nope").unwrap();
        let pdf = dir.path().join("scan.pdf");
        std::fs::write(&pdf, b"%PDF").unwrap();
        let worker = worker_in(&dir);

        let value = worker.read_json(&result).await.unwrap();
        assert_eq!(value["pages"], 3);

        let err = worker.read_json(&broken).await.unwrap_err();
        assert!(err.to_string().contains("JSON"));
        let err = worker.read_json(&pdf).await.unwrap_err();
        assert!(matches!(err, WorkerError::InvalidInput { .. }));
    }
}
