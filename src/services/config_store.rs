//! 配置存储客户端 - 业务能力层
//!
//! 把字段级别的修改翻译成"读-改-写"整文件操作，不关心谁在调用

use crate::error::ConfigError;
use crate::infrastructure::ConfigBackend;
use crate::models::{AppConfig, LogEntry, RepairReport};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// 配置存储客户端
///
/// 职责：
/// - 写入前裁剪日志、刷新 updated_at
/// - 文件不存在时写入默认配置
/// - 不处理损坏（交给 `RepairCoordinator`）
///
/// 读-改-写之间没有加锁，并发写入者以最后一次保存为准。
#[derive(Clone)]
pub struct ConfigStoreClient {
    backend: Arc<dyn ConfigBackend>,
}

impl ConfigStoreClient {
    pub fn new(backend: Arc<dyn ConfigBackend>) -> Self {
        Self { backend }
    }

    /// 配置文件身份
    pub fn identity(&self) -> &Path {
        self.backend.identity()
    }

    pub async fn load(&self) -> Result<AppConfig, ConfigError> {
        self.backend.load().await
    }

    /// 读取配置，文件不存在时写入并返回默认配置
    pub async fn initialize(&self) -> Result<AppConfig, ConfigError> {
        match self.backend.load().await {
            Ok(config) => Ok(config),
            Err(ConfigError::NotFound { path }) => {
                info!("📝 配置文件不存在，创建默认配置: {}", path.display());
                self.save(self.backend.default_config()).await
            }
            Err(e) => Err(e),
        }
    }

    /// 裁剪日志、刷新时间戳后保存
    ///
    /// # 返回
    /// 返回实际写入的配置
    pub async fn save(&self, mut config: AppConfig) -> Result<AppConfig, ConfigError> {
        config.trim_logs();
        config.touch();
        self.backend.save(&config).await?;
        Ok(config)
    }

    /// 更新上次使用的目录，`None` 表示保持不变
    pub async fn update_directories(
        &self,
        input: Option<String>,
        output: Option<String>,
    ) -> Result<AppConfig, ConfigError> {
        self.update(|config| {
            if let Some(input) = input {
                config.last_input_directory = Some(input);
            }
            if let Some(output) = output {
                config.last_output_directory = Some(output);
            }
        })
        .await
    }

    pub async fn update_verbose(&self, verbose: bool) -> Result<AppConfig, ConfigError> {
        self.update(|config| config.verbose = verbose).await
    }

    /// 追加一条持久化日志
    pub async fn append_log(&self, entry: LogEntry) -> Result<AppConfig, ConfigError> {
        debug!("持久化日志: [{}] {}", entry.kind, entry.message);
        self.update(|config| config.processing_logs.push(entry)).await
    }

    pub async fn clear_logs(&self) -> Result<AppConfig, ConfigError> {
        self.update(|config| config.processing_logs.clear()).await
    }

    /// 调用后端的修复原语
    pub async fn repair(&self) -> Result<RepairReport, ConfigError> {
        self.backend.repair().await
    }

    async fn update<F>(&self, apply: F) -> Result<AppConfig, ConfigError>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut config = self.initialize().await?;
        apply(&mut config);
        self.save(config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LogKind;
    use crate::test_support::MemoryConfigBackend;

    fn client(backend: MemoryConfigBackend) -> (Arc<MemoryConfigBackend>, ConfigStoreClient) {
        let backend = Arc::new(backend);
        (backend.clone(), ConfigStoreClient::new(backend))
    }

    #[tokio::test]
    async fn test_initialize_writes_defaults_when_missing() {
        let (backend, store) = client(MemoryConfigBackend::new(1000));

        let config = store.initialize().await.unwrap();

        assert_eq!(config.max_logs, 1000);
        assert!(backend.snapshot(|s| s.stored.is_some()));
        assert_eq!(backend.snapshot(|s| s.save_calls), 1);
    }

    #[tokio::test]
    async fn test_append_log_trims_to_max_logs() {
        let (backend, store) = client(MemoryConfigBackend::new(3));

        for i in 0..5 {
            store
                .append_log(LogEntry::now(format!("entry {}", i), LogKind::Info, None))
                .await
                .unwrap();
        }

        let stored = backend.snapshot(|s| s.stored.clone()).unwrap();
        let messages: Vec<_> = stored.processing_logs.iter().map(|l| l.message.clone()).collect();
        assert_eq!(messages, vec!["entry 2", "entry 3", "entry 4"]);
    }

    #[tokio::test]
    async fn test_update_directories_keeps_unspecified_field() {
        let (_, store) = client(MemoryConfigBackend::new(10));
        store
            .update_directories(Some("/in".into()), Some("/out".into()))
            .await
            .unwrap();

        let config = store.update_directories(Some("/in2".into()), None).await.unwrap();

        assert_eq!(config.last_input_directory.as_deref(), Some("/in2"));
        assert_eq!(config.last_output_directory.as_deref(), Some("/out"));
    }

    #[tokio::test]
    async fn test_corrupted_load_is_not_repaired_here() {
        let (backend, store) = client(MemoryConfigBackend::new(10).with_state(|s| s.corrupted = true));

        let err = store.update_verbose(true).await.unwrap_err();

        assert!(matches!(err, ConfigError::CorruptedFile { .. }));
        assert_eq!(backend.snapshot(|s| s.repair_calls), 0);
        assert_eq!(backend.snapshot(|s| s.save_calls), 0);
    }
}
