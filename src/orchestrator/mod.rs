//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责会话流程调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `app` - 应用入口
//! - 管理应用生命周期（初始化、运行、退出）
//! - 装配 worker、配置存储、日志和会话管理器
//! - 输出会话统计信息
//!
//! ### `session_manager` - 会话管理器
//! - 保证同一时刻只有一个活动会话
//! - 轮询 worker 并映射状态
//! - 停止轮询、清理 worker 会话
//!
//! ### `events` - 会话事件
//! - 向订阅者推送生命周期事件
//!
//! ## 层次关系
//!
//! ```text
//! app (一次运行)
//!     ↓
//! session_manager (一个会话)
//!     ↓
//! services (能力层：config store / logs / repair / directories)
//!     ↓
//! infrastructure (基础设施：worker / 配置文件)
//! ```

pub mod app;
pub mod events;
pub mod session_manager;

// 重新导出主要类型
pub use app::{App, RunRequest};
pub use events::{EventBus, SessionEvent, Subscription};
pub use session_manager::SessionManager;
