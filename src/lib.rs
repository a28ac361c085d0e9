//! Bee Chat - 带工具调用的对话助手服务
//!
//! 模块划分：
//! - **agent**: 助手运行时（Assistant trait + 基于 LLM 与工具箱的默认实现）
//! - **api**: HTTP 接口（Twirp JSON 兼容路由，需 `web` feature）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类、会话协调（标题/回复并发）、任务并发、优雅关闭
//! - **llm**: 模型能力抽象与实现（OpenAI 兼容 / Mock）
//! - **memory**: 会话数据模型与持久化（内存 / SQLite）
//! - **observability**: 日志初始化
//! - **react**: 回复主循环（工具调用）与标题生成
//! - **tools**: 工具箱（日期、节假日、天气）、注册表、执行器、重试退避

pub mod agent;
#[cfg(feature = "web")]
pub mod api;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;

pub use agent::{Agent, Assistant};
pub use core::{ChatError, ConversationCoordinator};
