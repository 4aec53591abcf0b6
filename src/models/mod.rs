pub mod app_config;
pub mod log_entry;
pub mod repair;
pub mod session;
pub mod worker;

pub use app_config::{AppConfig, DEFAULT_MAX_LOGS};
pub use log_entry::{LogEntry, LogKind};
pub use repair::{RepairOutcome, RepairReport};
pub use session::{JobInput, JobSpec, Session, SessionHandle, SessionStatus};
pub use worker::{DirectoryKind, FileInfo, JobResult, SubmitResponse, WorkerStatus};
