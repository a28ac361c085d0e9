//! 会话数据模型
//!
//! Conversation 由持久化层拥有；编排层拿到已加载的实例，只在内存中追加消息并交回存储。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::llm::Turn;

/// 消息角色：仅 User / Assistant 两种会被持久化（工具结果只存在于回复循环内部）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            role,
            content: content.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// 映射为模型轮次
    pub fn to_turn(&self) -> Turn {
        match self.role {
            Role::User => Turn::user(self.content.clone()),
            Role::Assistant => Turn::assistant(self.content.clone()),
        }
    }
}

/// 会话：标题可变，消息只追加
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// 新会话：首条消息总是 User
    pub fn start(title: impl Into<String>, first_message: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            title: title.into(),
            messages: vec![Message::user(first_message)],
            created_at: now,
            updated_at: now,
        }
    }

    pub fn push(&mut self, message: Message) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    /// 列表展示用：去掉消息体
    pub fn without_messages(mut self) -> Self {
        self.messages.clear();
        self
    }
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_conversation_first_message_is_user() {
        let conv = Conversation::start("Untitled conversation", "hi");
        assert_eq!(conv.messages.len(), 1);
        assert_eq!(conv.messages[0].role, Role::User);
        assert_eq!(conv.title, "Untitled conversation");
        assert!(!conv.id.is_empty());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
        let role: Role = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(role, Role::User);
        assert!(serde_json::from_str::<Role>("\"tool\"").is_err());
    }

    #[test]
    fn test_message_to_turn() {
        assert_eq!(Message::user("a").to_turn(), Turn::user("a"));
        assert_eq!(Message::assistant("b").to_turn(), Turn::assistant("b"));
    }
}
