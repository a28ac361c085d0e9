//! 服务错误分类
//!
//! 回复路径上除工具级错误（由 ToolExecutor 转为文本结果）外，其余错误对本次调用均为致命；
//! 标题生成失败由 ConversationCoordinator 记录日志后吞掉。

use thiserror::Error;

use crate::llm::LlmError;
use crate::memory::StoreError;

/// 会话编排过程中可能出现的错误
#[derive(Error, Debug)]
pub enum ChatError {
    /// 请求参数非法（如消息全为空白），在调用模型之前拒绝
    #[error("{field} is required")]
    Validation { field: &'static str },

    #[error("conversation not found: {0}")]
    NotFound(String),

    #[error("model call failed: {0}")]
    ModelCallFailed(#[from] LlmError),

    #[error("no choices returned by the model")]
    EmptyModelResponse,

    #[error("empty response from the model for title generation")]
    EmptyTitle,

    #[error("conversation has no messages")]
    EmptyConversation,

    /// 达到最大迭代次数仍未得到最终回复
    #[error("too many tool calls, unable to generate reply after {0} iterations")]
    LoopExhausted(usize),

    #[error("operation cancelled")]
    Cancelled,

    #[error("storage error: {0}")]
    Storage(StoreError),

    /// 并发任务 panic 或被中止
    #[error("task failed: {0}")]
    TaskFailed(String),
}

impl ChatError {
    pub fn required(field: &'static str) -> Self {
        Self::Validation { field }
    }
}

impl From<StoreError> for ChatError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::Storage(other),
        }
    }
}
