//! 会话协调器：新会话的标题与首条回复并发生成，续聊、列表与详情
//!
//! 并发阶段两个任务共享同一份只读会话快照；追加助手消息、设置标题只在汇合之后由协调器完成。
//! 失败策略不对称：标题失败只记日志并保留占位标题；回复失败则整体失败且不持久化任何内容。
//! start_conversation 的 future 被丢弃时取消派生 token，并发任务不会在调用方离开后继续运行。

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::agent::Assistant;
use crate::core::task_scheduler::join_settled;
use crate::core::ChatError;
use crate::memory::{Conversation, ConversationStore, Message};

/// StartConversation 的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartedConversation {
    pub conversation_id: String,
    pub title: String,
    pub reply: String,
}

fn require_text(value: &str, field: &'static str) -> Result<(), ChatError> {
    if value.trim().is_empty() {
        return Err(ChatError::required(field));
    }
    Ok(())
}

pub struct ConversationCoordinator {
    assistant: Arc<dyn Assistant>,
    store: Arc<dyn ConversationStore>,
    default_title: String,
}

impl ConversationCoordinator {
    pub fn new(
        assistant: Arc<dyn Assistant>,
        store: Arc<dyn ConversationStore>,
        default_title: impl Into<String>,
    ) -> Self {
        Self {
            assistant,
            store,
            default_title: default_title.into(),
        }
    }

    /// 新建会话：校验消息 -> 并发生成标题与回复 -> 汇合后应用失败策略 -> 持久化
    pub async fn start_conversation(
        &self,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<StartedConversation, ChatError> {
        require_text(message, "message")?;

        // 调用方放弃等待（如客户端断开）时，两个已 spawn 的任务随之收到取消
        let cancel = cancel.child_token();
        let _cancel_on_drop = cancel.clone().drop_guard();

        let snapshot = Arc::new(Conversation::start(self.default_title.clone(), message));
        let title_task = {
            let assistant = Arc::clone(&self.assistant);
            let conversation = Arc::clone(&snapshot);
            let cancel = cancel.clone();
            async move { assistant.title(&conversation, &cancel).await }
        };
        let reply_task = {
            let assistant = Arc::clone(&self.assistant);
            let conversation = Arc::clone(&snapshot);
            let cancel = cancel.clone();
            async move { assistant.reply(&conversation, &cancel).await }
        };

        let (title, reply) = join_settled(("title", title_task), ("reply", reply_task)).await;

        let reply = match reply {
            Ok(reply) => reply,
            Err(err) => {
                tracing::error!(conversation_id = %snapshot.id, error = %err, "failed to generate reply");
                return Err(err);
            }
        };

        let mut conversation = Arc::try_unwrap(snapshot).unwrap_or_else(|shared| (*shared).clone());
        match title {
            Ok(title) => conversation.title = title,
            Err(err) => {
                tracing::error!(conversation_id = %conversation.id, error = %err, "failed to generate conversation title");
            }
        }
        conversation.push(Message::assistant(reply.clone()));

        self.store.create(&conversation).await?;
        tracing::info!(conversation_id = %conversation.id, title = %conversation.title, "conversation started");

        Ok(StartedConversation {
            conversation_id: conversation.id,
            title: conversation.title,
            reply,
        })
    }

    /// 续聊：追加用户消息 -> 生成回复 -> 追加助手消息 -> 更新存储
    pub async fn continue_conversation(
        &self,
        conversation_id: &str,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ChatError> {
        require_text(conversation_id, "conversation_id")?;
        require_text(message, "message")?;

        let mut conversation = self.store.describe(conversation_id).await?;
        conversation.push(Message::user(message));

        let reply = self.assistant.reply(&conversation, cancel).await?;
        conversation.push(Message::assistant(reply.clone()));

        self.store.update(&conversation).await?;
        tracing::info!(conversation_id, "conversation continued");
        Ok(reply)
    }

    /// 列出会话（不含消息体），最近更新在前
    pub async fn list_conversations(&self) -> Result<Vec<Conversation>, ChatError> {
        let conversations = self.store.list().await?;
        Ok(conversations
            .into_iter()
            .map(Conversation::without_messages)
            .collect())
    }

    pub async fn describe_conversation(&self, conversation_id: &str) -> Result<Conversation, ChatError> {
        require_text(conversation_id, "conversation_id")?;
        Ok(self.store.describe(conversation_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryConversationStore, Role};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        title: Result<String, ()>,
        reply: Result<String, ()>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(title: Result<&str, ()>, reply: Result<&str, ()>) -> Self {
            Self {
                title: title.map(str::to_string),
                reply: reply.map(str::to_string),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Assistant for Scripted {
        async fn title(&self, _c: &Conversation, _cancel: &CancellationToken) -> Result<String, ChatError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.title.clone().map_err(|_| ChatError::EmptyTitle)
        }

        async fn reply(&self, c: &Conversation, _cancel: &CancellationToken) -> Result<String, ChatError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(c.messages.last().map(|m| m.role), Some(Role::User));
            self.reply.clone().map_err(|_| ChatError::EmptyModelResponse)
        }
    }

    fn coordinator(assistant: Arc<Scripted>) -> (ConversationCoordinator, Arc<InMemoryConversationStore>) {
        let store = Arc::new(InMemoryConversationStore::new());
        let coordinator = ConversationCoordinator::new(assistant, store.clone(), "Untitled conversation");
        (coordinator, store)
    }

    #[tokio::test]
    async fn test_start_persists_title_and_reply() {
        let (coord, store) = coordinator(Arc::new(Scripted::new(Ok("Weather"), Ok("Sunny"))));
        let started = coord.start_conversation("How is the weather?", &CancellationToken::new()).await.unwrap();
        assert_eq!(started.title, "Weather");
        assert_eq!(started.reply, "Sunny");

        let saved = store.describe(&started.conversation_id).await.unwrap();
        assert_eq!(saved.title, "Weather");
        assert_eq!(saved.messages.len(), 2);
        assert_eq!(saved.messages[1].content, "Sunny");
    }

    #[tokio::test]
    async fn test_title_failure_keeps_default_title() {
        let (coord, store) = coordinator(Arc::new(Scripted::new(Err(()), Ok("Sunny"))));
        let started = coord.start_conversation("hi", &CancellationToken::new()).await.unwrap();
        assert_eq!(started.title, "Untitled conversation");
        let saved = store.describe(&started.conversation_id).await.unwrap();
        assert_eq!(saved.title, "Untitled conversation");
        assert_eq!(saved.messages[1].content, "Sunny");
    }

    #[tokio::test]
    async fn test_reply_failure_persists_nothing() {
        let (coord, store) = coordinator(Arc::new(Scripted::new(Ok("Weather"), Err(()))));
        let err = coord.start_conversation("hi", &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ChatError::EmptyModelResponse));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_blank_message_rejected_before_model() {
        let assistant = Arc::new(Scripted::new(Ok("t"), Ok("r")));
        let (coord, _) = coordinator(assistant.clone());
        let err = coord.start_conversation("   ", &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ChatError::Validation { field: "message" }));
        assert_eq!(assistant.calls.load(Ordering::SeqCst), 0);
    }

    /// 除非被取消，否则每个调用都要等待 300ms
    #[derive(Default)]
    struct Slow {
        finished: AtomicUsize,
        cancelled: AtomicUsize,
    }

    impl Slow {
        async fn wait(&self, cancel: &CancellationToken) -> Result<String, ChatError> {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.cancelled.fetch_add(1, Ordering::SeqCst);
                    Err(ChatError::Cancelled)
                }
                _ = tokio::time::sleep(std::time::Duration::from_millis(300)) => {
                    self.finished.fetch_add(1, Ordering::SeqCst);
                    Ok("late".to_string())
                }
            }
        }
    }

    #[async_trait]
    impl Assistant for Slow {
        async fn title(&self, _c: &Conversation, cancel: &CancellationToken) -> Result<String, ChatError> {
            self.wait(cancel).await
        }

        async fn reply(&self, _c: &Conversation, cancel: &CancellationToken) -> Result<String, ChatError> {
            self.wait(cancel).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_start_cancels_both_tasks() {
        let assistant = Arc::new(Slow::default());
        let store = Arc::new(InMemoryConversationStore::new());
        let coord = ConversationCoordinator::new(assistant.clone(), store.clone(), "Untitled conversation");
        let root = CancellationToken::new();

        let outcome = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            coord.start_conversation("hi", &root),
        )
        .await;
        assert!(outcome.is_err());

        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        assert_eq!(assistant.cancelled.load(Ordering::SeqCst), 2);
        assert_eq!(assistant.finished.load(Ordering::SeqCst), 0);
        assert!(store.is_empty().await);
        assert!(!root.is_cancelled());
    }

    #[tokio::test]
    async fn test_continue_list_and_describe() {
        let (coord, _) = coordinator(Arc::new(Scripted::new(Ok("Chat"), Ok("answer"))));
        let cancel = CancellationToken::new();
        let started = coord.start_conversation("first", &cancel).await.unwrap();

        let reply = coord
            .continue_conversation(&started.conversation_id, "second", &cancel)
            .await
            .unwrap();
        assert_eq!(reply, "answer");

        let conv = coord.describe_conversation(&started.conversation_id).await.unwrap();
        let roles: Vec<_> = conv.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User, Role::Assistant]);

        let listed = coord.list_conversations().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].messages.is_empty());

        assert!(matches!(
            coord.continue_conversation("missing", "hi", &cancel).await,
            Err(ChatError::NotFound(_))
        ));
        assert!(matches!(
            coord.continue_conversation(" ", "hi", &cancel).await,
            Err(ChatError::Validation { field: "conversation_id" })
        ));
    }
}
