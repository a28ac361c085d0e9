//! 可观测性：tracing 日志初始化
//!
//! 日志级别由 RUST_LOG 控制，未设置时为 info；工具调用的审计行见 ToolExecutor（`audit` 字段为 JSON）。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// 安装全局 subscriber；重复调用时静默忽略
pub fn init() {
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(true))
        .try_init();
}
