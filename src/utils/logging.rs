/// 日志工具模块
///
/// 提供 tracing 初始化和日志格式化的辅助函数
use crate::config::Config;
use crate::models::Session;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 初始化 tracing 输出
///
/// 优先使用 `RUST_LOG`，否则 verbose 时为 debug，默认 info。
/// 重复调用不会报错（测试中可能多次初始化）。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
///
/// # 参数
/// - `config`: 运行配置
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 文档批量处理");
    info!("⏱️ 轮询间隔: {} ms", config.poll_interval_ms);
    info!("📁 配置文件: {}", config.config_file_path().display());
    info!("{}", "=".repeat(60));
}

/// 打印会话最终统计
///
/// # 参数
/// - `session`: 结束时的会话快照
pub fn log_session_summary(session: &Session) {
    info!("\n{}", "=".repeat(60));
    info!("📊 处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("会话: {}", session.id);
    info!("状态: {}", session.status);
    info!("✅ 已处理: {}/{}", session.processed_count, session.total_count);
    info!("❌ 错误: {}", session.errors.len());
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
