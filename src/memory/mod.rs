//! 记忆层：会话数据模型与持久化

pub mod async_persistence;
pub mod conversation;
pub mod persistence;

#[cfg(feature = "async-sqlite")]
pub use async_persistence::SqliteConversationStore;
pub use conversation::{Conversation, Message, Role};
pub use persistence::{ConversationStore, InMemoryConversationStore, StoreError};
