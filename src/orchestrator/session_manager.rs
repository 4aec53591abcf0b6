//! 会话管理器 - 编排层
//!
//! ## 职责
//!
//! 1. **提交任务**：校验参数，保证同一时刻只有一个活动会话
//! 2. **轮询状态**：按固定间隔查询 worker，把状态映射为本地会话
//! 3. **结束会话**：终态时停止轮询（只停一次）、清理 worker 会话、回到 Idle
//! 4. **取消**：停止轮询，丢弃之后到达的响应
//!
//! ## 状态机
//!
//! ```text
//! Idle --submit--> Submitting --ack--> Processing --{完成|出错}--> Completed|Failed --清理--> Idle
//! ```
//!
//! 会话状态放在同步互斥锁里，锁从不跨越 `.await`。
//! 每个轮询器有一个代号（generation），轮询结果只有在代号仍然有效时才会被应用。

use crate::error::{PollError, SubmitError, WorkerError};
use crate::infrastructure::ProcessingWorker;
use crate::models::{JobSpec, LogKind, Session, SessionHandle, SessionStatus, WorkerStatus};
use crate::orchestrator::events::{EventBus, SessionEvent, Subscription};
use crate::services::LogAggregator;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 会话管理器
///
/// 克隆得到的是同一个管理器的句柄。最后一个句柄释放时轮询器随之停止。
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    worker: Arc<dyn ProcessingWorker>,
    logs: LogAggregator,
    events: EventBus,
    poll_interval: Duration,
    state: Mutex<ManagerState>,
}

#[derive(Default)]
struct ManagerState {
    session: Session,
    poller: Option<PollerHandle>,
    next_generation: u64,
    last_outcome: Option<Session>,
}

impl ManagerState {
    fn is_current(&self, generation: u64) -> bool {
        self.poller.as_ref().map(|p| p.generation) == Some(generation)
    }

    /// 取走并停止轮询器；返回 false 表示已经停过了
    fn stop_poller(&mut self) -> bool {
        match self.poller.take() {
            Some(poller) => {
                poller.cancel.cancel();
                true
            }
            None => false,
        }
    }
}

struct PollerHandle {
    generation: u64,
    cancel: CancellationToken,
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        state.stop_poller();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TickOutcome {
    Continue,
    Stop,
}

/// 一次轮询应用到本地状态后的结果，锁外再做日志和事件
enum StatusUpdate {
    Progress {
        session: Session,
        progress_changed: bool,
        new_errors: Vec<String>,
    },
    Finished {
        session: Session,
        new_errors: Vec<String>,
    },
}

impl SessionManager {
    /// 创建会话管理器
    ///
    /// # 参数
    /// - `worker`: 处理 worker
    /// - `logs`: 日志聚合器
    /// - `poll_interval`: 轮询间隔
    pub fn new(worker: Arc<dyn ProcessingWorker>, logs: LogAggregator, poll_interval: Duration) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                worker,
                logs,
                events: EventBus::new(),
                poll_interval,
                state: Mutex::new(ManagerState::default()),
            }),
        }
    }

    /// 当前会话快照
    pub fn snapshot(&self) -> Session {
        self.lock().session.clone()
    }

    /// 最近一次结束的会话（回到 Idle 后仍可查询）
    pub fn last_outcome(&self) -> Option<Session> {
        self.lock().last_outcome.clone()
    }

    pub fn is_active(&self) -> bool {
        self.lock().session.status.is_active()
    }

    pub fn subscribe(&self) -> Subscription {
        self.inner.events.subscribe(64)
    }

    pub fn logs(&self) -> &LogAggregator {
        &self.inner.logs
    }

    /// 提交任务
    ///
    /// # 参数
    /// - `spec`: 任务参数
    ///
    /// # 返回
    /// worker 接受任务后返回会话句柄，轮询随即开始
    pub async fn submit(&self, spec: JobSpec) -> Result<SessionHandle, SubmitError> {
        if let Some(field) = spec.missing_field() {
            return Err(SubmitError::InvalidSpec(format!("缺少 {}", field)));
        }

        let provisional_id = spec.input.provisional_id();
        {
            let mut state = self.lock();
            if state.session.status.is_active() {
                return Err(SubmitError::AlreadyRunning {
                    active_id: state.session.id.clone(),
                });
            }
            state.session = Session::submitting(&provisional_id);
        }

        self.log(
            LogKind::Info,
            format!(
                "📤 提交任务: {} → {}",
                spec.input.path().display(),
                spec.output_directory.display()
            ),
            &provisional_id,
        );

        let response = self
            .inner
            .worker
            .submit_job(&spec.input, &spec.output_directory, spec.verbose, &provisional_id)
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => return Err(self.reject_submission(&provisional_id, e)),
        };

        let accepted = {
            let mut state = self.lock();
            if state.session.id == provisional_id && state.session.status == SessionStatus::Submitting {
                state.session.id = response.session_id.clone();
                state.session.status = SessionStatus::Processing;
                self.start_poller(&mut state);
                true
            } else {
                false
            }
        };

        if !accepted {
            warn!("[会话 {}] 提交期间已被取消，释放 worker 会话", response.session_id);
            self.release_worker_session(&response.session_id).await;
            return Err(SubmitError::Cancelled {
                session_id: response.session_id,
            });
        }

        self.log(LogKind::Info, "🚀 会话已启动，开始轮询处理状态", &response.session_id);
        self.inner.events.publish(SessionEvent::Submitted {
            session_id: response.session_id.clone(),
        });

        Ok(SessionHandle {
            session_id: response.session_id,
            immediate_result: response.immediate_result,
        })
    }

    /// 取消当前会话；没有活动会话时什么都不做
    pub async fn cancel(&self) {
        let cancelled = {
            let mut state = self.lock();
            if !state.session.status.is_active() {
                return;
            }
            state.stop_poller();
            std::mem::take(&mut state.session)
        };

        self.log(LogKind::Info, "⏹️ 会话已取消", &cancelled.id);
        if cancelled.status == SessionStatus::Processing {
            self.release_worker_session(&cancelled.id).await;
        }
        self.inner.events.publish(SessionEvent::Cancelled {
            session_id: cancelled.id,
        });
    }

    /// 所有者销毁前调用，效果同 `cancel`
    pub async fn teardown(&self) {
        self.cancel().await;
    }

    fn reject_submission(&self, provisional_id: &str, err: WorkerError) -> SubmitError {
        let failed = {
            let mut state = self.lock();
            if state.session.id == provisional_id && state.session.status == SessionStatus::Submitting {
                let mut session = std::mem::take(&mut state.session);
                session.status = SessionStatus::Failed;
                session.errors.push(err.to_string());
                state.last_outcome = Some(session.clone());
                Some(session)
            } else {
                None
            }
        };

        self.log(LogKind::Error, format!("❌ 任务提交失败: {}", err), provisional_id);
        if let Some(session) = failed {
            self.inner.events.publish(SessionEvent::Finished(session));
        }
        SubmitError::Worker(err.to_string())
    }

    fn start_poller(&self, state: &mut ManagerState) {
        state.next_generation += 1;
        let generation = state.next_generation;
        let cancel = CancellationToken::new();
        state.poller = Some(PollerHandle {
            generation,
            cancel: cancel.clone(),
        });

        tokio::spawn(poll_loop(
            Arc::downgrade(&self.inner),
            generation,
            cancel,
            self.inner.poll_interval,
        ));
        debug!("[会话 {}] 轮询器 #{} 已启动", state.session.id, generation);
    }

    /// 执行一次轮询
    async fn poll_tick(&self, generation: u64) -> TickOutcome {
        let session_id = {
            let state = self.lock();
            if !state.is_current(generation) {
                return TickOutcome::Stop;
            }
            state.session.id.clone()
        };

        match self.inner.worker.get_status(&session_id).await {
            Ok(status) => self.apply_status(generation, status).await,
            Err(e) => {
                let err = PollError::WorkerUnreachable {
                    session_id: session_id.clone(),
                    detail: e.to_string(),
                };
                self.fail_polling(generation, err).await
            }
        }
    }

    async fn apply_status(&self, generation: u64, status: WorkerStatus) -> TickOutcome {
        let update = {
            let mut state = self.lock();
            if !state.is_current(generation) {
                debug!("丢弃过期的轮询结果 (#{})", generation);
                return TickOutcome::Stop;
            }

            let session = &mut state.session;
            let progress_changed = session.processed_count != status.processed_files
                || session.total_count != status.total_files
                || session.current_file != status.current_file;
            session.processed_count = status.processed_files;
            session.total_count = status.total_files;
            session.current_file = status.current_file.clone();

            let new_errors: Vec<String> = status.errors.iter().skip(session.errors.len()).cloned().collect();
            session.errors.extend(new_errors.iter().cloned());

            if status.is_processing {
                StatusUpdate::Progress {
                    session: session.clone(),
                    progress_changed,
                    new_errors,
                }
            } else {
                session.status = if session.errors.is_empty() {
                    SessionStatus::Completed
                } else {
                    SessionStatus::Failed
                };
                session.current_file = None;
                let session = session.clone();
                state.stop_poller();
                StatusUpdate::Finished { session, new_errors }
            }
        };

        match update {
            StatusUpdate::Progress {
                session,
                progress_changed,
                new_errors,
            } => {
                self.log_worker_errors(&session.id, &new_errors);
                if progress_changed {
                    self.log(LogKind::Progress, progress_message(&session), &session.id);
                    self.inner.events.publish(SessionEvent::Progress(session));
                }
                TickOutcome::Continue
            }
            StatusUpdate::Finished { session, new_errors } => {
                self.log_worker_errors(&session.id, &new_errors);
                if session.status == SessionStatus::Completed {
                    self.log(
                        LogKind::Success,
                        format!("✅ 处理完成: {}/{} 个文件", session.processed_count, session.total_count),
                        &session.id,
                    );
                } else {
                    self.log(
                        LogKind::Error,
                        format!(
                            "❌ 处理结束，{} 个错误 ({}/{} 个文件)",
                            session.errors.len(),
                            session.processed_count,
                            session.total_count
                        ),
                        &session.id,
                    );
                }
                self.finish(session).await;
                TickOutcome::Stop
            }
        }
    }

    async fn fail_polling(&self, generation: u64, err: PollError) -> TickOutcome {
        let session = {
            let mut state = self.lock();
            if !state.is_current(generation) {
                return TickOutcome::Stop;
            }
            state.stop_poller();
            state.session.status = SessionStatus::Failed;
            state.session.errors.push(err.to_string());
            state.session.clone()
        };

        self.log(LogKind::Error, format!("❌ 轮询已停止: {}", err), &session.id);
        self.finish(session).await;
        TickOutcome::Stop
    }

    /// 终态后的清理：释放 worker 会话，记录结果，回到 Idle
    async fn finish(&self, session: Session) {
        self.release_worker_session(&session.id).await;

        {
            let mut state = self.lock();
            state.last_outcome = Some(session.clone());
            if state.session.id == session.id && state.session.status.is_terminal() {
                state.session = Session::idle();
            }
        }

        info!(
            "[会话 {}] 已结束: {} ({}/{})",
            session.id, session.status, session.processed_count, session.total_count
        );
        self.inner.events.publish(SessionEvent::Finished(session));
    }

    async fn release_worker_session(&self, session_id: &str) {
        if let Err(e) = self.inner.worker.clear_session(session_id).await {
            self.log(LogKind::Error, format!("⚠️ 清理 worker 会话失败: {}", e), session_id);
        }
    }

    fn log_worker_errors(&self, session_id: &str, errors: &[String]) {
        for error in errors {
            self.log(LogKind::Error, format!("❌ {}", error), session_id);
        }
    }

    fn log(&self, kind: LogKind, message: impl Into<String>, session_id: &str) {
        self.inner.logs.append(message, kind, Some(session_id));
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn progress_message(session: &Session) -> String {
    match &session.current_file {
        Some(file) => format!(
            "📄 [{}/{}] 正在处理: {}",
            session.processed_count, session.total_count, file
        ),
        None => format!(
            "📄 [{}/{}] 处理中 ({:.0}%)",
            session.processed_count,
            session.total_count,
            session.progress_percentage()
        ),
    }
}

/// 轮询循环：取消或管理器释放时退出
async fn poll_loop(inner: Weak<ManagerInner>, generation: u64, cancel: CancellationToken, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // 第一次 tick 立即返回，跳过它，第一次查询在一个间隔之后
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let Some(inner) = inner.upgrade() else { break };
                let manager = SessionManager { inner };
                if manager.poll_tick(generation).await == TickOutcome::Stop {
                    break;
                }
            }
        }
    }
    debug!("轮询器 #{} 已退出", generation);
}
