//! 业务能力层（Service Layer）
//!
//! 每个服务只提供一种能力，不认识会话流程。

pub mod config_store;
pub mod directory_resolver;
pub mod log_aggregator;
pub mod repair_coordinator;

pub use config_store::ConfigStoreClient;
pub use directory_resolver::DirectoryResolver;
pub use log_aggregator::LogAggregator;
pub use repair_coordinator::RepairCoordinator;
