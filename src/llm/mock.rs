//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按脚本依次返回预置结果；脚本耗尽后回显最后一条 User 消息。
//! 记录每次调用收到的轮次与公布的工具数，便于断言循环行为。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{Choice, Completion, LlmClient, LlmError, ToolDefinition, Turn};

/// 单次调用的记录
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub turns: Vec<Turn>,
    /// None 表示未公布工具目录
    pub tool_names: Option<Vec<String>>,
}

/// Mock 客户端：脚本化响应 + 调用记录
#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<Completion, LlmError>>>,
    /// 设置后脚本耗尽时总是返回该结果
    repeat: Option<Result<Completion, LlmError>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按顺序返回给定结果
    pub fn scripted(script: impl IntoIterator<Item = Result<Completion, LlmError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Self::default()
        }
    }

    /// 每次调用都返回同一结果
    pub fn always(result: Result<Completion, LlmError>) -> Self {
        Self {
            repeat: Some(result),
            ..Self::default()
        }
    }

    /// 便捷构造：依次返回若干纯文本回复
    pub fn with_texts(texts: &[&str]) -> Self {
        Self::scripted(
            texts
                .iter()
                .map(|t| Ok(Completion::single(Choice::text(*t))))
                .collect::<Vec<_>>(),
        )
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn echo(turns: &[Turn]) -> Completion {
        let last_user = turns
            .iter()
            .rev()
            .find_map(|t| match t {
                Turn::User { content } => Some(content.as_str()),
                _ => None,
            })
            .unwrap_or("(no input)");
        Completion::single(Choice::text(format!("Echo from Mock: {last_user}")))
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(
        &self,
        turns: &[Turn],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<Completion, LlmError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(RecordedRequest {
                turns: turns.to_vec(),
                tool_names: tools.map(|t| t.iter().map(|d| d.name.clone()).collect()),
            });
        }

        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match next {
            Some(result) => result,
            None => match &self.repeat {
                Some(result) => result.clone(),
                None => Ok(Self::echo(turns)),
            },
        }
    }

    fn model_id(&self) -> &str {
        "mock"
    }
}
