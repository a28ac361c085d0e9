//! 回复主循环（有界工具调用）
//!
//! Thinking -> (ToolDispatch -> Thinking)* -> Done | Exhausted。
//! 每轮把完整轮次序列与工具目录交给模型：无工具调用即为最终回复；
//! 有工具调用则先保留模型轮次，再按调用顺序逐个执行并追加工具结果轮次。
//! 工具级失败转为文本结果交给模型，不中止循环；模型调用失败、空输出、取消对本次回复致命。

use tokio_util::sync::CancellationToken;

use crate::core::ChatError;
use crate::llm::{LlmClient, Turn};
use crate::memory::Conversation;
use crate::tools::{ToolContext, ToolError, ToolExecutor};

/// 默认最大模型调用次数，防止工具调用失控
pub const DEFAULT_MAX_ITERATIONS: usize = 15;

/// 循环所处阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    /// 等待模型输出
    Thinking,
    /// 执行最近一次模型输出中的工具调用
    ToolDispatch,
    /// 模型给出自由文本
    Done,
    /// 达到迭代上限
    Exhausted,
}

/// 回复结果：最终文本、完整轮次序列与模型调用次数
#[derive(Debug)]
pub struct ReactResult {
    pub response: String,
    pub turns: Vec<Turn>,
    pub iterations: usize,
}

/// 单次回复的会话配置
pub struct ReactSession<'a> {
    pub llm: &'a dyn LlmClient,
    pub executor: &'a ToolExecutor,
    pub system_prompt: &'a str,
    pub max_iterations: usize,
    pub cancel: CancellationToken,
}

impl<'a> ReactSession<'a> {
    pub fn new(llm: &'a dyn LlmClient, executor: &'a ToolExecutor, system_prompt: &'a str) -> Self {
        Self {
            llm,
            executor,
            system_prompt,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// 初始轮次：系统提示 + 已持久化消息
pub fn seed_turns(system_prompt: &str, conversation: &Conversation) -> Vec<Turn> {
    let mut turns = Vec::with_capacity(conversation.messages.len() + 1);
    turns.push(Turn::system(system_prompt));
    turns.extend(conversation.messages.iter().map(|m| m.to_turn()));
    turns
}

/// 执行回复循环；不修改会话本身
pub async fn react_loop(
    session: &ReactSession<'_>,
    conversation: &Conversation,
) -> Result<ReactResult, ChatError> {
    if conversation.messages.is_empty() {
        return Err(ChatError::EmptyConversation);
    }

    let tools = session.executor.definitions();
    let ctx = ToolContext::new(session.cancel.clone());
    let mut turns = seed_turns(session.system_prompt, conversation);
    let mut phase = LoopPhase::Thinking;
    let mut iterations = 0;

    while iterations < session.max_iterations {
        iterations += 1;
        tracing::trace!(?phase, step = iterations, "calling model");

        let completion = tokio::select! {
            biased;
            _ = session.cancel.cancelled() => return Err(ChatError::Cancelled),
            r = session.llm.complete(&turns, Some(tools.as_slice())) => r?,
        };
        let choice = completion
            .first()
            .ok_or(ChatError::EmptyModelResponse)?
            .clone();

        if choice.tool_calls.is_empty() {
            phase = LoopPhase::Done;
            tracing::debug!(iterations, ?phase, "reply finished");
            turns.push(Turn::assistant(choice.text.clone()));
            return Ok(ReactResult {
                response: choice.text,
                turns,
                iterations,
            });
        }

        phase = LoopPhase::ToolDispatch;
        tracing::debug!(?phase, calls = choice.tool_calls.len(), "dispatching tool calls");
        turns.push(choice.to_turn());
        for call in &choice.tool_calls {
            let result = match session.executor.execute(&ctx, call).await {
                Ok(output) => output,
                Err(ToolError::Cancelled) => return Err(ChatError::Cancelled),
                Err(err) => {
                    tracing::error!(tool = %call.name, call_id = %call.id, error = %err, "tool execution failed");
                    format!("Tool execution failed: {err}")
                }
            };
            turns.push(Turn::tool(call.id.clone(), result));
        }
        phase = LoopPhase::Thinking;
    }

    phase = LoopPhase::Exhausted;
    tracing::warn!(iterations, ?phase, "reply loop hit iteration bound");
    Err(ChatError::LoopExhausted(session.max_iterations))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Choice, Completion, LlmError, MockLlmClient, ToolCall};
    use crate::tools::{Tool, ToolRegistry};
    use async_trait::async_trait;

    struct Lookup;

    #[async_trait]
    impl Tool for Lookup {
        fn name(&self) -> &str {
            "lookup"
        }

        fn description(&self) -> &str {
            "Looks things up"
        }

        async fn execute(&self, _ctx: &ToolContext, arguments: &str) -> Result<String, ToolError> {
            if arguments.contains("fail") {
                return Err(ToolError::ExecutionFailed("backend down".to_string()));
            }
            Ok(format!("found {arguments}"))
        }
    }

    fn executor() -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(Lookup);
        ToolExecutor::new(registry, 5)
    }

    fn conversation() -> Conversation {
        Conversation::start("t", "What's up?")
    }

    fn tool_round(calls: &[(&str, &str, &str)]) -> Result<Completion, LlmError> {
        Ok(Completion::single(Choice::tool_calls(
            calls
                .iter()
                .map(|(id, name, args)| ToolCall::new(*id, *name, *args))
                .collect(),
        )))
    }

    #[tokio::test]
    async fn test_tool_free_reply_is_single_call() {
        let llm = MockLlmClient::with_texts(&["All good."]);
        let exec = executor();
        let session = ReactSession::new(&llm, &exec, "sys");

        let result = react_loop(&session, &conversation()).await.unwrap();
        assert_eq!(result.response, "All good.");
        assert_eq!(result.iterations, 1);
        assert_eq!(llm.call_count(), 1);
        assert_eq!(result.turns.first(), Some(&Turn::system("sys")));
        assert_eq!(result.turns.last(), Some(&Turn::assistant("All good.")));
    }

    #[tokio::test]
    async fn test_tool_results_follow_call_order_and_failures_are_visible() {
        let llm = MockLlmClient::scripted(vec![
            tool_round(&[("a", "lookup", "x"), ("b", "missing", "{}"), ("c", "lookup", "fail")]),
            Ok(Completion::single(Choice::text("done"))),
        ]);
        let exec = executor();
        let session = ReactSession::new(&llm, &exec, "sys");

        let result = react_loop(&session, &conversation()).await.unwrap();
        assert_eq!(result.response, "done");

        let second = &llm.requests()[1].turns;
        let tool_turns: Vec<_> = second
            .iter()
            .filter_map(|t| match t {
                Turn::Tool { call_id, content } => Some((call_id.as_str(), content.as_str())),
                _ => None,
            })
            .collect();
        assert_eq!(tool_turns.len(), 3);
        assert_eq!(tool_turns[0], ("a", "found x"));
        assert_eq!(tool_turns[1].0, "b");
        assert_eq!(tool_turns[1].1, "Tool execution failed: unknown tool: missing");
        assert_eq!(tool_turns[2], ("c", "Tool execution failed: backend down"));
        assert!(matches!(
            &second[second.len() - 4],
            Turn::Assistant { tool_calls, .. } if tool_calls.len() == 3
        ));
    }

    #[tokio::test]
    async fn test_always_tool_calls_exhausts_after_bound() {
        let llm = MockLlmClient::always(tool_round(&[("1", "lookup", "again")]));
        let exec = executor();
        let session = ReactSession::new(&llm, &exec, "sys");

        let err = react_loop(&session, &conversation()).await.unwrap_err();
        assert!(matches!(err, ChatError::LoopExhausted(15)));
        assert_eq!(llm.call_count(), 15);
    }

    #[tokio::test]
    async fn test_empty_conversation_and_empty_choices() {
        let llm = MockLlmClient::always(Ok(Completion::empty()));
        let exec = executor();
        let session = ReactSession::new(&llm, &exec, "sys");

        let mut empty = conversation();
        empty.messages.clear();
        assert!(matches!(
            react_loop(&session, &empty).await,
            Err(ChatError::EmptyConversation)
        ));
        assert_eq!(llm.call_count(), 0);

        assert!(matches!(
            react_loop(&session, &conversation()).await,
            Err(ChatError::EmptyModelResponse)
        ));
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_model_failure_and_cancel() {
        let llm = MockLlmClient::always(Err(LlmError::Api("quota".to_string())));
        let exec = executor();
        let session = ReactSession::new(&llm, &exec, "sys");
        assert!(matches!(
            react_loop(&session, &conversation()).await,
            Err(ChatError::ModelCallFailed(LlmError::Api(_)))
        ));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let llm = MockLlmClient::with_texts(&["never"]);
        let session = ReactSession::new(&llm, &exec, "sys").with_cancel(cancel);
        assert!(matches!(
            react_loop(&session, &conversation()).await,
            Err(ChatError::Cancelled)
        ));
    }
}
