//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 LlmClient：接收轮次序列与可选工具目录，返回候选列表。

use async_trait::async_trait;
use thiserror::Error;

use crate::llm::{Completion, ToolDefinition, Turn};

/// 模型调用错误（传输 / 配额 / 鉴权 / 超时），编排层不做重试
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式补全；tools 为 None 时不向模型公布任何工具
    async fn complete(
        &self,
        turns: &[Turn],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<Completion, LlmError>;

    /// 模型标识（用于日志）
    fn model_id(&self) -> &str;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
