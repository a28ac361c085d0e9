//! 会话标题生成（单次模型调用，不公布工具）

use tokio_util::sync::CancellationToken;

use crate::config::AssistantSection;
use crate::core::ChatError;
use crate::llm::{LlmClient, Turn};
use crate::memory::{Conversation, Role};

/// 标题两端需要去掉的字符
const TITLE_TRIM_CHARS: &[char] = &[' ', '\t', '\r', '\n', '-', '"', '\''];

/// 标题请求的轮次：指令 + 每条用户消息
pub fn title_turns(instruction: &str, conversation: &Conversation) -> Vec<Turn> {
    let mut turns = vec![Turn::system(instruction)];
    turns.extend(
        conversation
            .messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| Turn::user(m.content.clone())),
    );
    turns
}

/// 清洗模型输出：换行折叠为空格，去掉两端标点空白，按字符截断
///
/// 只有原始输出去掉空白后为空才算失败；仅由标点组成的输出清洗后得到空标题
pub fn sanitize_title(raw: &str, max_chars: usize) -> Result<String, ChatError> {
    if raw.trim().is_empty() {
        return Err(ChatError::EmptyTitle);
    }

    let collapsed = raw.replace('\n', " ");
    let trimmed = collapsed.trim_matches(TITLE_TRIM_CHARS);
    Ok(trimmed.chars().take(max_chars).collect())
}

/// 为会话生成标题；无消息时直接返回 empty_title
pub async fn generate_title(
    llm: &dyn LlmClient,
    conversation: &Conversation,
    settings: &AssistantSection,
    cancel: &CancellationToken,
) -> Result<String, ChatError> {
    if conversation.messages.is_empty() {
        return Ok(settings.empty_title.clone());
    }

    let turns = title_turns(&settings.title_instruction, conversation);
    let completion = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(ChatError::Cancelled),
        r = llm.complete(&turns, None) => r?,
    };

    let raw = completion
        .first()
        .map(|c| c.text.as_str())
        .ok_or(ChatError::EmptyTitle)?;
    let title = sanitize_title(raw, settings.max_title_chars)?;
    tracing::debug!(conversation_id = %conversation.id, title = %title, model = llm.model_id(), "title generated");
    Ok(title)
}
