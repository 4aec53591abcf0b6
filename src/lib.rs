//! # Intake Orchestrator
//!
//! PDF 批量处理的会话编排：提交任务、轮询进度、记录日志、修复损坏的配置文件
//!
//! ## 架构设计
//!
//! 本系统采用三层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有外部资源，只暴露能力
//! - `ProcessingWorker` - 真正解析 PDF 的 worker
//! - `ConfigBackend` - 配置文件的整体读写和修复原语
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，不认识会话流程
//! - `ConfigStoreClient` - 读-改-写配置
//! - `RepairCoordinator` - 损坏检测和单次修复
//! - `LogAggregator` - 内存日志 + 持久化镜像
//! - `DirectoryResolver` - 工作目录解析
//!
//! ### ③ 编排层（Orchestration）
//! - `orchestrator/session_manager` - 单会话状态机和轮询
//! - `orchestrator/app` - 装配和一次完整运行
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{AppConfig, JobSpec, LogEntry, LogKind, Session, SessionStatus};
pub use orchestrator::{App, RunRequest, SessionEvent, SessionManager};
