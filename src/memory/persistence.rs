//! 会话持久化接口与内存实现
//!
//! 编排层只通过 ConversationStore 读写；内存实现为默认后端，SQLite 实现见 async_persistence。

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::memory::Conversation;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("conversation not found: {0}")]
    NotFound(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// 会话存储
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create(&self, conversation: &Conversation) -> Result<(), StoreError>;

    /// 覆盖已有会话；不存在时返回 NotFound
    async fn update(&self, conversation: &Conversation) -> Result<(), StoreError>;

    async fn describe(&self, id: &str) -> Result<Conversation, StoreError>;

    /// 按 updated_at 倒序
    async fn list(&self) -> Result<Vec<Conversation>, StoreError>;
}

/// 内存存储：HashMap + RwLock，进程退出即丢失
#[derive(Debug, Default)]
pub struct InMemoryConversationStore {
    conversations: RwLock<HashMap<String, Conversation>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.conversations.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.conversations.read().await.is_empty()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn create(&self, conversation: &Conversation) -> Result<(), StoreError> {
        let mut map = self.conversations.write().await;
        if map.contains_key(&conversation.id) {
            return Err(StoreError::Backend(format!(
                "conversation already exists: {}",
                conversation.id
            )));
        }
        map.insert(conversation.id.clone(), conversation.clone());
        Ok(())
    }

    async fn update(&self, conversation: &Conversation) -> Result<(), StoreError> {
        let mut map = self.conversations.write().await;
        match map.get_mut(&conversation.id) {
            Some(existing) => {
                *existing = conversation.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(conversation.id.clone())),
        }
    }

    async fn describe(&self, id: &str) -> Result<Conversation, StoreError> {
        self.conversations
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn list(&self) -> Result<Vec<Conversation>, StoreError> {
        let mut all: Vec<Conversation> = self.conversations.read().await.values().cloned().collect();
        all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(all)
    }
}
