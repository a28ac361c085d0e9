//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）。
//! 请求体先按 Chat Completions 线格式组装为 JSON 再反序列化为 async_openai 的请求类型，
//! 响应中的工具调用同样按线格式读取，避免依赖具体枚举变体名。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::CreateChatCompletionRequest;
use async_openai::Client;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::llm::{Choice, Completion, LlmClient, LlmError, ToolCall, ToolDefinition, Turn};

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// OpenAI 兼容客户端：持有 Client、model 名与请求超时
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    request_timeout: Duration,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(
        base_url: Option<&str>,
        model: &str,
        api_key: Option<&str>,
        request_timeout_secs: u64,
    ) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new()
                .with_api_base(url)
                .with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            request_timeout: Duration::from_secs(request_timeout_secs),
            usage: TokenUsage::new(),
        }
    }

    fn build_request(
        &self,
        turns: &[Turn],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<CreateChatCompletionRequest, LlmError> {
        let mut body = json!({
            "model": self.model,
            "messages": turns.iter().map(turn_to_wire).collect::<Vec<_>>(),
        });
        if let Some(tools) = tools.filter(|t| !t.is_empty()) {
            body["tools"] = Value::Array(tools.iter().map(tool_to_wire).collect());
        }
        serde_json::from_value(body).map_err(|e| LlmError::InvalidRequest(e.to_string()))
    }
}

/// 将内部轮次转为 Chat Completions 线格式消息
pub(crate) fn turn_to_wire(turn: &Turn) -> Value {
    match turn {
        Turn::System { content } => json!({ "role": "system", "content": content }),
        Turn::User { content } => json!({ "role": "user", "content": content }),
        Turn::Assistant {
            content,
            tool_calls,
        } => {
            let mut msg = json!({ "role": "assistant" });
            if !content.is_empty() || tool_calls.is_empty() {
                msg["content"] = json!(content);
            }
            if !tool_calls.is_empty() {
                msg["tool_calls"] = tool_calls
                    .iter()
                    .map(|c| {
                        json!({
                            "id": c.id,
                            "type": "function",
                            "function": { "name": c.name, "arguments": c.arguments },
                        })
                    })
                    .collect();
            }
            msg
        }
        Turn::Tool { call_id, content } => {
            json!({ "role": "tool", "content": content, "tool_call_id": call_id })
        }
    }
}

pub(crate) fn tool_to_wire(def: &ToolDefinition) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": def.name,
            "description": def.description,
            "parameters": def.parameters,
        },
    })
}

/// 从线格式助手消息中读取文本与函数类工具调用（非 function 类型的调用忽略）
pub(crate) fn choice_from_wire(message: &Value) -> Choice {
    let text = message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let tool_calls = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| {
            calls
                .iter()
                .filter_map(|c| {
                    let function = c.get("function")?;
                    Some(ToolCall::new(
                        c.get("id").and_then(Value::as_str).unwrap_or_default(),
                        function.get("name").and_then(Value::as_str)?,
                        function
                            .get("arguments")
                            .and_then(Value::as_str)
                            .unwrap_or_default(),
                    ))
                })
                .collect()
        })
        .unwrap_or_default();
    Choice { text, tool_calls }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(
        &self,
        turns: &[Turn],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<Completion, LlmError> {
        let request = self.build_request(turns, tools)?;

        let response = tokio::time::timeout(self.request_timeout, self.client.chat().create(request))
            .await
            .map_err(|_| LlmError::Timeout(self.request_timeout.as_secs()))?
            .map_err(|e| LlmError::Api(e.to_string()))?;

        // 提取 token 使用统计
        if let Some(usage) = &response.usage {
            self.usage.add(
                usage.prompt_tokens as u64,
                usage.completion_tokens as u64,
            );
        }

        let choices = response
            .choices
            .iter()
            .map(|c| {
                serde_json::to_value(&c.message)
                    .map(|m| choice_from_wire(&m))
                    .map_err(|e| LlmError::Api(format!("decode response message: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Completion { choices })
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }
}
