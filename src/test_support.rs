//! 单元测试用的内存后端和脚本化 worker

use crate::error::{ConfigError, CorruptionKind, WorkerError};
use crate::infrastructure::{ConfigBackend, ProcessingWorker};
use crate::models::{AppConfig, JobInput, RepairOutcome, RepairReport, SubmitResponse, WorkerStatus};
use crate::services::{ConfigStoreClient, LogAggregator, RepairCoordinator};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Default)]
pub struct MemoryState {
    pub stored: Option<AppConfig>,
    pub corrupted: bool,
    pub io_failure: bool,
    pub fail_repair: bool,
    pub load_calls: usize,
    pub save_calls: usize,
    pub repair_calls: usize,
}

/// 内存配置后端，可以模拟损坏、I/O 失败和阻塞的修复
pub struct MemoryConfigBackend {
    path: PathBuf,
    max_logs: usize,
    pub state: Mutex<MemoryState>,
    pub repair_gate: Option<Arc<Notify>>,
}

impl MemoryConfigBackend {
    pub fn new(max_logs: usize) -> Self {
        Self {
            path: PathBuf::from("/memory/app_config.json"),
            max_logs,
            state: Mutex::new(MemoryState::default()),
            repair_gate: None,
        }
    }

    pub fn with_repair_gate(mut self, gate: Arc<Notify>) -> Self {
        self.repair_gate = Some(gate);
        self
    }

    pub fn with_state(self, f: impl FnOnce(&mut MemoryState)) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    pub fn snapshot<T>(&self, f: impl FnOnce(&MemoryState) -> T) -> T {
        f(&self.state.lock().unwrap())
    }

    pub fn corruption_error(&self) -> ConfigError {
        ConfigError::corrupted(&self.path, CorruptionKind::Malformed, "trailing characters at line 1 column 12")
    }
}

#[async_trait]
impl ConfigBackend for MemoryConfigBackend {
    fn identity(&self) -> &Path {
        &self.path
    }

    fn default_config(&self) -> AppConfig {
        AppConfig::with_max_logs(self.max_logs)
    }

    async fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut state = self.state.lock().unwrap();
        state.load_calls += 1;
        if state.io_failure {
            return Err(ConfigError::io(
                &self.path,
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            ));
        }
        if state.corrupted {
            drop(state);
            return Err(self.corruption_error());
        }
        state.stored.clone().ok_or_else(|| ConfigError::NotFound {
            path: self.path.clone(),
        })
    }

    async fn save(&self, config: &AppConfig) -> Result<(), ConfigError> {
        let mut state = self.state.lock().unwrap();
        state.save_calls += 1;
        if state.io_failure {
            return Err(ConfigError::io(
                &self.path,
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            ));
        }
        state.stored = Some(config.clone());
        state.corrupted = false;
        Ok(())
    }

    async fn repair(&self) -> Result<RepairReport, ConfigError> {
        self.state.lock().unwrap().repair_calls += 1;
        if let Some(gate) = &self.repair_gate {
            gate.notified().await;
        }

        let mut state = self.state.lock().unwrap();
        if state.fail_repair {
            return Err(ConfigError::io(
                &self.path,
                std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            ));
        }
        state.corrupted = false;
        if state.stored.is_none() {
            state.stored = Some(AppConfig::with_max_logs(self.max_logs));
        }
        let mut report = RepairReport::new(RepairOutcome::Repaired);
        report.step("rewrote configuration");
        Ok(report)
    }
}

pub struct Stack {
    pub backend: Arc<MemoryConfigBackend>,
    pub store: ConfigStoreClient,
    pub repair: RepairCoordinator,
    pub logs: LogAggregator,
}

/// 内存后端 + 修复协调器 + 日志聚合器
pub fn memory_stack(backend: MemoryConfigBackend) -> Stack {
    let backend = Arc::new(backend);
    let store = ConfigStoreClient::new(backend.clone());
    let repair = RepairCoordinator::new(store.clone());
    let logs = LogAggregator::spawn(repair.clone(), 100);
    Stack {
        backend,
        store,
        repair,
        logs,
    }
}

#[derive(Default)]
pub struct WorkerCalls {
    pub submits: usize,
    pub status_calls: usize,
    pub cleared: Vec<String>,
}

/// 按脚本返回状态的 worker
pub struct ScriptedWorker {
    session_id: String,
    fail_submit: bool,
    statuses: Mutex<VecDeque<Result<WorkerStatus, WorkerError>>>,
    pub calls: Mutex<WorkerCalls>,
    pub submit_gate: Option<Arc<Notify>>,
    pub status_gate: Option<Arc<Notify>>,
}

impl ScriptedWorker {
    pub fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            fail_submit: false,
            statuses: Mutex::new(VecDeque::new()),
            calls: Mutex::new(WorkerCalls::default()),
            submit_gate: None,
            status_gate: None,
        }
    }

    pub fn failing_submit(mut self) -> Self {
        self.fail_submit = true;
        self
    }

    pub fn with_submit_gate(mut self, gate: Arc<Notify>) -> Self {
        self.submit_gate = Some(gate);
        self
    }

    pub fn with_status_gate(mut self, gate: Arc<Notify>) -> Self {
        self.status_gate = Some(gate);
        self
    }

    pub fn push_status(&self, status: Result<WorkerStatus, WorkerError>) {
        self.statuses.lock().unwrap().push_back(status);
    }

    pub fn calls<T>(&self, f: impl FnOnce(&WorkerCalls) -> T) -> T {
        f(&self.calls.lock().unwrap())
    }
}

pub fn processing(processed: usize, total: usize, errors: &[&str]) -> WorkerStatus {
    let mut status = WorkerStatus::started(total);
    status.set_progress(processed, None);
    status.errors = errors.iter().map(|e| e.to_string()).collect();
    status
}

pub fn finished(processed: usize, total: usize, errors: &[&str]) -> WorkerStatus {
    let mut status = processing(processed, total, errors);
    status.is_processing = false;
    status
}

#[async_trait]
impl ProcessingWorker for ScriptedWorker {
    async fn submit_job(
        &self,
        _input: &JobInput,
        _output_directory: &Path,
        _verbose: bool,
        _provisional_id: &str,
    ) -> Result<SubmitResponse, WorkerError> {
        self.calls.lock().unwrap().submits += 1;
        if let Some(gate) = &self.submit_gate {
            gate.notified().await;
        }
        if self.fail_submit {
            return Err(WorkerError::Unavailable("worker offline".to_string()));
        }
        Ok(SubmitResponse {
            session_id: self.session_id.clone(),
            immediate_result: None,
        })
    }

    async fn get_status(&self, _session_id: &str) -> Result<WorkerStatus, WorkerError> {
        self.calls.lock().unwrap().status_calls += 1;
        if let Some(gate) = &self.status_gate {
            gate.notified().await;
        }
        let mut statuses = self.statuses.lock().unwrap();
        match statuses.pop_front() {
            Some(status) => status,
            None => Ok(finished(0, 0, &[])),
        }
    }

    async fn clear_session(&self, session_id: &str) -> Result<(), WorkerError> {
        self.calls.lock().unwrap().cleared.push(session_id.to_string());
        Ok(())
    }
}

/// 等待后台任务推进到满足条件
pub async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}
