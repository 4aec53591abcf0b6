//! 会话事件通道 - 编排层
//!
//! 会话管理器把生命周期事件推给订阅者，订阅者掉线或处理太慢时直接跳过。

use crate::models::Session;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc;
use tracing::debug;

/// 会话生命周期事件
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// worker 已接受任务
    Submitted { session_id: String },
    /// 进度变化
    Progress(Session),
    /// 会话结束（Completed 或 Failed）
    Finished(Session),
    Cancelled { session_id: String },
}

type Subscribers = Mutex<Vec<(u64, mpsc::Sender<SessionEvent>)>>;

/// 事件总线
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Subscribers>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 订阅事件
    ///
    /// # 参数
    /// - `capacity`: 缓冲区大小，满了之后新事件会被丢弃
    pub fn subscribe(&self, capacity: usize) -> Subscription {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.subscribers).push((id, tx));
        Subscription {
            id,
            rx,
            bus: Arc::downgrade(&self.subscribers),
        }
    }

    /// 发布事件，不会阻塞
    pub fn publish(&self, event: SessionEvent) {
        let mut subscribers = lock(&self.subscribers);
        subscribers.retain(|(_, tx)| !tx.is_closed());
        for (id, tx) in subscribers.iter() {
            if tx.try_send(event.clone()).is_err() {
                debug!("订阅者 {} 缓冲区已满，丢弃事件", id);
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }
}

fn lock(subscribers: &Subscribers) -> MutexGuard<'_, Vec<(u64, mpsc::Sender<SessionEvent>)>> {
    subscribers.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 事件订阅，drop 时自动退订
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<SessionEvent>,
    bus: Weak<Subscribers>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<SessionEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(subscribers) = self.bus.upgrade() {
            lock(&subscribers).retain(|(id, _)| *id != self.id);
        }
    }
}
