//! 工具级错误
//!
//! 除 Cancelled 外，这些错误只作用于单次工具调用：回复循环会把它们转为工具结果文本交给模型。

use thiserror::Error;

use crate::tools::retry::FetchError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    NotFound(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{0}")]
    ExecutionFailed(String),

    #[error("tool timed out: {0}")]
    Timeout(String),

    /// 缺少必需的凭据（如 API Key），不重试
    #[error("{0}")]
    Unconfigured(String),

    /// 外部数据源重试耗尽：fallback 为可直接展示的降级文本，cause 为最后一次失败原因
    #[error("{cause}")]
    ExternalFetchFailed { fallback: String, cause: String },

    #[error("tool execution cancelled")]
    Cancelled,
}

impl ToolError {
    /// 可展示给终端用户的文本（外部数据失败时为降级文本）
    pub fn user_facing_text(&self) -> String {
        match self {
            ToolError::ExternalFetchFailed { fallback, .. } => fallback.clone(),
            other => other.to_string(),
        }
    }
}

impl<E: std::fmt::Display> From<FetchError<E>> for ToolError {
    fn from(err: FetchError<E>) -> Self {
        match err {
            FetchError::Cancelled => ToolError::Cancelled,
            FetchError::Exhausted {
                fallback, source, ..
            } => ToolError::ExternalFetchFailed {
                fallback,
                cause: source.to_string(),
            },
        }
    }
}
