//! 助手运行时
//!
//! Assistant trait 暴露 title / reply 两个能力，供 ConversationCoordinator 调用；
//! Agent 是默认实现：回复模型 + 标题模型 + 工具执行器，create_agent 按配置组装。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::{AppConfig, AssistantSection};
use crate::core::ChatError;
use crate::llm::{create_llm_client, LlmClient};
use crate::memory::Conversation;
use crate::react::{generate_title, react_loop, ReactSession};
use crate::tools::{
    DateTool, HolidaysTool, HttpCalendarSource, RetryPolicy, ToolExecutor, ToolRegistry,
    WeatherClient, WeatherTool,
};

/// 会话助手：标题与回复
#[async_trait]
pub trait Assistant: Send + Sync {
    /// 为会话生成简短标题
    async fn title(&self, conversation: &Conversation, cancel: &CancellationToken)
        -> Result<String, ChatError>;

    /// 基于会话已有消息生成下一条助手回复（不修改会话）
    async fn reply(&self, conversation: &Conversation, cancel: &CancellationToken)
        -> Result<String, ChatError>;
}

/// 默认助手实现
pub struct Agent {
    reply_llm: Arc<dyn LlmClient>,
    title_llm: Arc<dyn LlmClient>,
    executor: ToolExecutor,
    settings: AssistantSection,
}

impl Agent {
    pub fn new(
        reply_llm: Arc<dyn LlmClient>,
        title_llm: Arc<dyn LlmClient>,
        executor: ToolExecutor,
        settings: AssistantSection,
    ) -> Self {
        Self {
            reply_llm,
            title_llm,
            executor,
            settings,
        }
    }

    fn session<'a>(&'a self, cancel: &CancellationToken) -> ReactSession<'a> {
        ReactSession::new(self.reply_llm.as_ref(), &self.executor, &self.settings.system_prompt)
            .with_max_iterations(self.settings.max_tool_iterations)
            .with_cancel(cancel.clone())
    }
}

#[async_trait]
impl Assistant for Agent {
    async fn title(
        &self,
        conversation: &Conversation,
        cancel: &CancellationToken,
    ) -> Result<String, ChatError> {
        generate_title(self.title_llm.as_ref(), conversation, &self.settings, cancel).await
    }

    async fn reply(
        &self,
        conversation: &Conversation,
        cancel: &CancellationToken,
    ) -> Result<String, ChatError> {
        let session = self.session(cancel);
        let result = react_loop(&session, conversation).await?;
        tracing::info!(
            conversation_id = %conversation.id,
            iterations = result.iterations,
            model = self.reply_llm.model_id(),
            "reply generated"
        );
        Ok(result.response)
    }
}

/// 注册内置工具：get_today_date / get_holidays / get_weather
pub fn build_tool_registry(cfg: &AppConfig) -> ToolRegistry {
    let policy = RetryPolicy::from(&cfg.tools.retry);
    let mut tools = ToolRegistry::new();
    tools.register(DateTool);
    tools.register(HolidaysTool::new(Arc::new(HttpCalendarSource::from_config(
        &cfg.tools.holidays,
        policy,
    ))));
    tools.register(WeatherTool::new(Arc::new(WeatherClient::from_config(
        &cfg.tools.weather,
        policy,
    ))));
    tools
}

/// 工具调用超时（秒）：不短于外部数据源耗尽全部重试所需的时间，保证超时前能拿到降级文本
pub fn tool_timeout_secs(cfg: &AppConfig) -> u64 {
    let policy = RetryPolicy::from(&cfg.tools.retry);
    let slowest_source = cfg.tools.weather.timeout_secs.max(cfg.tools.holidays.timeout_secs);
    let retry_budget = policy.worst_case(Duration::from_secs(slowest_source));
    let required = retry_budget.as_secs() + 1;
    if cfg.tools.tool_timeout_secs < required {
        tracing::warn!(
            configured = cfg.tools.tool_timeout_secs,
            required,
            "tool_timeout_secs shorter than the retry budget, raising it"
        );
        return required;
    }
    cfg.tools.tool_timeout_secs
}

/// 按配置组装默认助手
pub fn create_agent(cfg: &AppConfig) -> Agent {
    let reply_llm = create_llm_client(&cfg.llm, &cfg.llm.model);
    let title_llm = create_llm_client(&cfg.llm, &cfg.llm.title_model);
    let executor = ToolExecutor::new(build_tool_registry(cfg), tool_timeout_secs(cfg));
    tracing::info!(
        reply_model = reply_llm.model_id(),
        title_model = title_llm.model_id(),
        tools = ?executor.tool_names(),
        "assistant ready"
    );
    Agent::new(reply_llm, title_llm, executor, cfg.assistant.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    #[test]
    fn test_builtin_tools_registered() {
        let registry = build_tool_registry(&AppConfig::default());
        assert_eq!(
            registry.tool_names(),
            vec!["get_today_date", "get_holidays", "get_weather"]
        );
    }

    #[test]
    fn test_tool_timeout_covers_retry_budget() {
        let mut cfg = AppConfig::default();
        assert_eq!(tool_timeout_secs(&cfg), cfg.tools.tool_timeout_secs);

        // 3 × 10s + 200ms + 400ms
        cfg.tools.tool_timeout_secs = 30;
        cfg.tools.holidays.timeout_secs = 10;
        assert_eq!(tool_timeout_secs(&cfg), 31);
    }

    #[tokio::test]
    async fn test_reply_uses_system_prompt_and_advertises_tools() {
        let cfg = AppConfig::default();
        let reply_llm = Arc::new(MockLlmClient::with_texts(&["Hello!"]));
        let title_llm = Arc::new(MockLlmClient::new());
        let agent = Agent::new(
            reply_llm.clone(),
            title_llm,
            ToolExecutor::new(build_tool_registry(&cfg), 5),
            cfg.assistant.clone(),
        );

        let conv = Conversation::start("t", "Hi");
        let reply = agent.reply(&conv, &CancellationToken::new()).await.unwrap();
        assert_eq!(reply, "Hello!");

        let req = &reply_llm.requests()[0];
        assert_eq!(req.turns[0].content(), cfg.assistant.system_prompt);
        assert_eq!(req.tool_names.as_ref().map(|t| t.len()), Some(3));
    }
}
