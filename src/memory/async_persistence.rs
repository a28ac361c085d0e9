//! 异步 SQLite 会话存储（sqlx）
//!
//! 一张 conversations 表，消息序列以 JSON 存于 messages 列。
//! 需要启用 `async-sqlite` feature。

#[cfg(feature = "async-sqlite")]
mod sqlx_impl {
    use std::path::Path;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
    use sqlx::Row;

    use crate::core::ShutdownCleanup;
    use crate::memory::{Conversation, ConversationStore, Message, StoreError};

    fn backend(err: impl std::fmt::Display) -> StoreError {
        StoreError::Backend(err.to_string())
    }

    /// 异步 SQLite 会话存储
    pub struct SqliteConversationStore {
        pool: SqlitePool,
    }

    impl SqliteConversationStore {
        /// 打开（必要时创建）数据库文件并建表
        pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, sqlx::Error> {
            if let Some(parent) = db_path.as_ref().parent() {
                std::fs::create_dir_all(parent).ok();
            }
            let db_url = format!("sqlite:{}?mode=rwc", db_path.as_ref().display());

            let pool = SqlitePoolOptions::new()
                .max_connections(5)
                .connect(&db_url)
                .await?;

            let store = Self { pool };
            store.init_tables().await?;

            Ok(store)
        }

        /// 从连接池创建（调用方负责建表，或随后调用 init_tables）
        pub fn from_pool(pool: SqlitePool) -> Self {
            Self { pool }
        }

        pub async fn init_tables(&self) -> Result<(), sqlx::Error> {
            sqlx::query(
                "CREATE TABLE IF NOT EXISTS conversations (
                    id TEXT PRIMARY KEY,
                    title TEXT NOT NULL,
                    messages TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                )",
            )
            .execute(&self.pool)
            .await?;

            sqlx::query(
                "CREATE INDEX IF NOT EXISTS idx_conversations_updated ON conversations(updated_at)",
            )
            .execute(&self.pool)
            .await?;

            Ok(())
        }

        /// 关闭连接池，等待在途查询结束
        pub async fn close(&self) {
            self.pool.close().await;
        }

        fn row_to_conversation(row: &sqlx::sqlite::SqliteRow) -> Result<Conversation, StoreError> {
            let messages: String = row.get("messages");
            let created_at: String = row.get("created_at");
            let updated_at: String = row.get("updated_at");
            let messages: Vec<Message> = serde_json::from_str(&messages).map_err(backend)?;
            Ok(Conversation {
                id: row.get("id"),
                title: row.get("title"),
                messages,
                created_at: parse_ts(&created_at)?,
                updated_at: parse_ts(&updated_at)?,
            })
        }
    }

    fn parse_ts(s: &str) -> Result<DateTime<Utc>, StoreError> {
        DateTime::parse_from_rfc3339(s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(backend)
    }

    #[async_trait]
    impl ConversationStore for SqliteConversationStore {
        async fn create(&self, conversation: &Conversation) -> Result<(), StoreError> {
            let messages = serde_json::to_string(&conversation.messages).map_err(backend)?;
            sqlx::query(
                "INSERT INTO conversations (id, title, messages, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&conversation.id)
            .bind(&conversation.title)
            .bind(&messages)
            .bind(conversation.created_at.to_rfc3339())
            .bind(conversation.updated_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
            Ok(())
        }

        async fn update(&self, conversation: &Conversation) -> Result<(), StoreError> {
            let messages = serde_json::to_string(&conversation.messages).map_err(backend)?;
            let result = sqlx::query(
                "UPDATE conversations SET title = ?, messages = ?, updated_at = ? WHERE id = ?",
            )
            .bind(&conversation.title)
            .bind(&messages)
            .bind(conversation.updated_at.to_rfc3339())
            .bind(&conversation.id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;

            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound(conversation.id.clone()));
            }
            Ok(())
        }

        async fn describe(&self, id: &str) -> Result<Conversation, StoreError> {
            let row = sqlx::query(
                "SELECT id, title, messages, created_at, updated_at FROM conversations WHERE id = ?",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

            Self::row_to_conversation(&row)
        }

        async fn list(&self) -> Result<Vec<Conversation>, StoreError> {
            let rows = sqlx::query(
                "SELECT id, title, messages, created_at, updated_at FROM conversations ORDER BY updated_at DESC",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

            rows.iter().map(Self::row_to_conversation).collect()
        }
    }

    #[async_trait]
    impl ShutdownCleanup for SqliteConversationStore {
        async fn cleanup(&self) -> anyhow::Result<()> {
            self.close().await;
            Ok(())
        }

        fn name(&self) -> &'static str {
            "SQLite"
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_sqlite_store_roundtrip() {
            let dir = tempfile::tempdir().unwrap();
            let store = SqliteConversationStore::new(dir.path().join("conv.db"))
                .await
                .unwrap();

            let mut conv = Conversation::start("Untitled conversation", "hello");
            store.create(&conv).await.unwrap();
            conv.title = "Greetings".to_string();
            conv.push(Message::assistant("hi"));
            store.update(&conv).await.unwrap();

            let loaded = store.describe(&conv.id).await.unwrap();
            assert_eq!(loaded.title, "Greetings");
            assert_eq!(loaded.messages, conv.messages);
            assert_eq!(store.list().await.unwrap().len(), 1);
            assert!(matches!(
                store.describe("missing").await,
                Err(StoreError::NotFound(_))
            ));
        }
    }
}

#[cfg(feature = "async-sqlite")]
pub use sqlx_impl::SqliteConversationStore;
