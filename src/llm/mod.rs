//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock）

pub mod mock;
pub mod openai;
pub mod traits;
pub mod types;

use std::sync::Arc;

pub use mock::{MockLlmClient, RecordedRequest};
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{LlmClient, LlmError};
pub use types::{Choice, Completion, ToolCall, ToolDefinition, Turn};

use crate::config::LlmSection;

/// 按 [llm] 配置创建客户端：provider = mock 时返回 Mock，否则为 OpenAI 兼容客户端
pub fn create_llm_client(section: &LlmSection, model: &str) -> Arc<dyn LlmClient> {
    match section.provider.as_str() {
        "mock" => Arc::new(MockLlmClient::new()),
        _ => Arc::new(OpenAiClient::new(
            section.base_url.as_deref(),
            model,
            section.api_key.as_deref(),
            section.timeouts.request,
        )),
    }
}
