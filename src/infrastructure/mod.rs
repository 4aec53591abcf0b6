//! 基础设施层（Infrastructure Layer）
//!
//! 持有外部资源（配置文件、worker 进程），只暴露能力，不认识会话流程。

pub mod command_processor;
pub mod config_backend;
pub mod local_worker;
pub mod worker;

pub use command_processor::CommandProcessor;
pub use config_backend::{ConfigBackend, JsonFileConfigBackend};
pub use local_worker::{DocumentProcessor, LocalWorker};
pub use worker::{DefaultDirectories, FileBrowser, ProcessingWorker};
