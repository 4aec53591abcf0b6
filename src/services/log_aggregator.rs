//! 日志聚合服务 - 业务能力层
//!
//! 内存中保留最近的日志供展示，并把非进度日志镜像写入配置文件。
//! 镜像写入由单独的后台任务按顺序执行，调用方不需要等待。

use crate::config::Config;
use crate::models::{AppConfig, LogEntry, LogKind};
use crate::services::RepairCoordinator;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

/// 固定容量的内存日志
struct TransientLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl TransientLog {
    fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// 追加日志，重复的进度消息会被丢弃
    ///
    /// # 返回
    /// 是否真的追加了
    fn push(&mut self, entry: LogEntry) -> bool {
        if let Some(last) = self.entries.back() {
            if entry.is_duplicate_progress_of(last) {
                return false;
            }
        }
        if self.capacity == 0 {
            return false;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
        true
    }
}

type SharedLog = Arc<Mutex<TransientLog>>;

fn lock(log: &SharedLog) -> MutexGuard<'_, TransientLog> {
    log.lock().unwrap_or_else(PoisonError::into_inner)
}

enum PersistCommand {
    Mirror(LogEntry),
    Flush(oneshot::Sender<()>),
}

/// 日志聚合器
///
/// 职责：
/// - 维护最近 N 条内存日志（进度消息去重）
/// - 非进度日志异步镜像到配置文件
/// - 镜像失败时写一条内存错误日志，配置损坏时安排修复
/// - 所有日志同时输出到 tracing
#[derive(Clone)]
pub struct LogAggregator {
    transient: SharedLog,
    repair: RepairCoordinator,
    persist_tx: mpsc::UnboundedSender<PersistCommand>,
}

impl LogAggregator {
    /// 创建聚合器并启动镜像写入任务（需要在 tokio 运行时中调用）
    ///
    /// # 参数
    /// - `repair`: 修复协调器，同时提供配置存储
    /// - `capacity`: 内存日志容量
    pub fn spawn(repair: RepairCoordinator, capacity: usize) -> Self {
        let transient = Arc::new(Mutex::new(TransientLog::new(capacity)));
        let (persist_tx, persist_rx) = mpsc::unbounded_channel();

        let reloads = repair.subscribe_reloads();
        tokio::spawn(run_writer(persist_rx, reloads, transient.clone(), repair.clone()));

        Self {
            transient,
            repair,
            persist_tx,
        }
    }

    pub fn from_config(repair: RepairCoordinator, config: &Config) -> Self {
        Self::spawn(repair, config.transient_log_capacity)
    }

    /// 追加一条日志
    ///
    /// 立即进入内存日志；非进度日志排队镜像，修复进行中时不镜像。
    pub fn append(&self, message: impl Into<String>, kind: LogKind, session_id: Option<&str>) {
        let entry = LogEntry::now(message, kind, session_id.map(str::to_string));
        trace_entry(&entry);

        if !lock(&self.transient).push(entry.clone()) {
            return;
        }

        if !kind.is_persisted() {
            return;
        }
        if self.repair.is_in_progress() {
            debug!("配置修复进行中，日志只保留在内存: {}", entry.message);
            return;
        }
        if self.persist_tx.send(PersistCommand::Mirror(entry)).is_err() {
            warn!("日志写入任务已停止，日志只保留在内存");
        }
    }

    pub fn info(&self, message: impl Into<String>, session_id: Option<&str>) {
        self.append(message, LogKind::Info, session_id);
    }

    pub fn success(&self, message: impl Into<String>, session_id: Option<&str>) {
        self.append(message, LogKind::Success, session_id);
    }

    pub fn error(&self, message: impl Into<String>, session_id: Option<&str>) {
        self.append(message, LogKind::Error, session_id);
    }

    pub fn progress(&self, message: impl Into<String>, session_id: Option<&str>) {
        self.append(message, LogKind::Progress, session_id);
    }

    /// 当前内存日志（从旧到新）
    pub fn entries(&self) -> Vec<LogEntry> {
        lock(&self.transient).entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.transient).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 等待此前排队的镜像写入全部完成
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.persist_tx.send(PersistCommand::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    /// 启动时用持久化日志填充内存日志
    pub fn restore(&self, config: &AppConfig) {
        let mut transient = lock(&self.transient);
        let skip = config.processing_logs.len().saturating_sub(transient.capacity);
        for entry in config.processing_logs.iter().skip(skip) {
            transient.push(entry.clone());
        }
        debug!("恢复了 {} 条历史日志", transient.entries.len());
    }

    /// 清空内存日志和持久化日志
    pub async fn clear(&self) -> crate::error::AppResult<()> {
        self.flush().await;
        lock(&self.transient).entries.clear();
        let store = self.repair.store();
        self.repair.recover(move || store.clear_logs()).await?;
        info!("🧹 处理日志已清空");
        Ok(())
    }
}

async fn run_writer(
    mut rx: mpsc::UnboundedReceiver<PersistCommand>,
    mut reloads: watch::Receiver<u64>,
    transient: SharedLog,
    repair: RepairCoordinator,
) {
    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(PersistCommand::Mirror(entry)) => mirror(&transient, &repair, entry).await,
                Some(PersistCommand::Flush(done)) => {
                    let _ = done.send(());
                }
                None => break,
            },
            Ok(()) = reloads.changed() => reload(&transient, &repair).await,
        }
    }
    debug!("日志写入任务退出");
}

async fn mirror(transient: &SharedLog, repair: &RepairCoordinator, entry: LogEntry) {
    // 排队期间可能已开始修复
    if repair.is_in_progress() {
        debug!("配置修复进行中，日志只保留在内存: {}", entry.message);
        return;
    }

    let session_id = entry.session_id.clone();
    let Err(e) = repair.store().append_log(entry).await else {
        return;
    };

    let message = if repair.is_corruption(&e) {
        let scheduled = repair.schedule();
        format!(
            "⚠️ 配置文件损坏，日志未能保存{}: {}",
            if scheduled { "，已安排修复" } else { "" },
            e
        )
    } else {
        format!("❌ 日志保存失败: {}", e)
    };

    // 直接进内存日志，不再镜像
    let failure = LogEntry::now(message, LogKind::Error, session_id);
    trace_entry(&failure);
    lock(transient).push(failure);
}

/// 修复完成后重新读取配置，并记录一条恢复保存的日志
async fn reload(transient: &SharedLog, repair: &RepairCoordinator) {
    let message = match repair.store().load().await {
        Ok(config) => format!(
            "🔄 配置修复后已重新加载，历史日志 {} 条，日志恢复保存",
            config.processing_logs.len()
        ),
        Err(e) => {
            warn!("修复后重新加载配置失败: {}", e);
            return;
        }
    };

    let entry = LogEntry::now(message, LogKind::Info, None);
    trace_entry(&entry);
    if lock(transient).push(entry.clone()) {
        mirror(transient, repair, entry).await;
    }
}

fn trace_entry(entry: &LogEntry) {
    let prefix = entry
        .session_id
        .as_deref()
        .map(|id| format!("[会话 {}] ", id))
        .unwrap_or_default();
    match entry.kind {
        LogKind::Info | LogKind::Success => info!("{}{}", prefix, entry.message),
        LogKind::Error => error!("{}{}", prefix, entry.message),
        LogKind::Progress => debug!("{}{}", prefix, entry.message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{memory_stack, wait_for, MemoryConfigBackend};

    #[tokio::test]
    async fn test_capacity_drops_oldest() {
        let backend = MemoryConfigBackend::new(1000);
        let stack = memory_stack(backend);
        let logs = LogAggregator::spawn(stack.repair.clone(), 3);

        for i in 0..5 {
            logs.progress(format!("step {}", i), None);
        }

        let messages: Vec<_> = logs.entries().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["step 2", "step 3", "step 4"]);
    }

    #[tokio::test]
    async fn test_identical_progress_is_deduplicated() {
        let stack = memory_stack(MemoryConfigBackend::new(1000));

        stack.logs.progress("Processing a.pdf", Some("s1"));
        stack.logs.progress("Processing a.pdf", Some("s1"));
        stack.logs.info("Processing a.pdf", Some("s1"));
        stack.logs.info("Processing a.pdf", Some("s1"));

        assert_eq!(stack.logs.len(), 3);
    }

    #[tokio::test]
    async fn test_only_non_progress_entries_are_persisted() {
        let stack = memory_stack(MemoryConfigBackend::new(1000));

        stack.logs.info("started", Some("s1"));
        stack.logs.progress("1/3", Some("s1"));
        stack.logs.success("done", Some("s1"));
        stack.logs.flush().await;

        let stored = stack.backend.snapshot(|s| s.stored.clone()).unwrap();
        let kinds: Vec<_> = stored.processing_logs.iter().map(|l| l.kind).collect();
        assert_eq!(kinds, vec![LogKind::Info, LogKind::Success]);
    }

    #[tokio::test]
    async fn test_corruption_during_mirror_schedules_single_repair() {
        let stack = memory_stack(MemoryConfigBackend::new(1000).with_state(|s| s.corrupted = true));

        stack.logs.info("first", None);
        stack.logs.flush().await;
        wait_for(|| !stack.repair.is_in_progress()).await;

        assert_eq!(stack.backend.snapshot(|s| s.repair_calls), 1);
        let errors: Vec<_> = stack
            .logs
            .entries()
            .into_iter()
            .filter(|e| e.kind == LogKind::Error)
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("已安排修复"));
    }

    #[tokio::test]
    async fn test_queued_entries_are_not_mirrored_while_repair_runs() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let stack = memory_stack(
            MemoryConfigBackend::new(1000)
                .with_state(|s| s.corrupted = true)
                .with_repair_gate(gate.clone()),
        );

        stack.logs.info("first", None);
        stack.logs.info("second", None);
        stack.logs.flush().await;
        wait_for(|| stack.backend.snapshot(|s| s.repair_calls) == 1).await;

        assert!(stack.repair.is_in_progress());
        assert_eq!(stack.backend.snapshot(|s| s.load_calls), 1);
        let errors = stack
            .logs
            .entries()
            .into_iter()
            .filter(|e| e.kind == LogKind::Error)
            .count();
        assert_eq!(errors, 1);
        assert!(stack.logs.entries().iter().any(|e| e.message == "second"));

        gate.notify_one();
        wait_for(|| !stack.repair.is_in_progress()).await;
    }

    #[tokio::test]
    async fn test_successful_repair_reloads_and_resumes_mirroring() {
        let stack = memory_stack(MemoryConfigBackend::new(1000).with_state(|s| s.corrupted = true));

        stack.logs.info("lost", None);
        stack.logs.flush().await;
        wait_for(|| stack.logs.entries().iter().any(|e| e.message.contains("重新加载"))).await;
        stack.logs.info("kept", None);
        stack.logs.flush().await;

        let stored = stack.backend.snapshot(|s| s.stored.clone()).unwrap();
        let messages: Vec<_> = stored.processing_logs.iter().map(|l| l.message.as_str()).collect();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].contains("重新加载"));
        assert_eq!(messages[1], "kept");
    }

    #[tokio::test]
    async fn test_io_failure_logs_transient_error_without_repair() {
        let stack = memory_stack(MemoryConfigBackend::new(1000).with_state(|s| s.io_failure = true));

        stack.logs.error("boom", None);
        stack.logs.flush().await;

        let entries = stack.logs.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries[1].message.contains("日志保存失败"));
        assert_eq!(stack.backend.snapshot(|s| s.repair_calls), 0);
    }

    #[tokio::test]
    async fn test_restore_keeps_latest_within_capacity() {
        let stack = memory_stack(MemoryConfigBackend::new(1000));
        let logs = LogAggregator::spawn(stack.repair.clone(), 2);
        let mut config = AppConfig::with_max_logs(1000);
        for i in 0..4 {
            config
                .processing_logs
                .push(LogEntry::now(format!("old {}", i), LogKind::Info, None));
        }

        logs.restore(&config);

        let messages: Vec<_> = logs.entries().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["old 2", "old 3"]);
    }

    #[tokio::test]
    async fn test_clear_empties_both_logs() {
        let stack = memory_stack(MemoryConfigBackend::new(1000));
        stack.logs.info("keep?", None);

        stack.logs.clear().await.unwrap();

        assert!(stack.logs.is_empty());
        let stored = stack.backend.snapshot(|s| s.stored.clone()).unwrap();
        assert!(stored.processing_logs.is_empty());
    }
}
