//! Conversation and message models (the message ledger).

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Sqlite};

use crate::db::DbPool;

/// Current time as a fixed-width UTC RFC 3339 string, so that text order
/// matches time order.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Timestamp for the next message of a conversation. The wall clock can step
/// backwards, so never go below the newest timestamp already stored.
fn next_timestamp(latest: Option<String>) -> String {
    let now = now_timestamp();
    match latest {
        Some(latest) if latest > now => latest,
        _ => now,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Conversation {
    pub id: i64,
}

impl Conversation {
    /// Create the conversation if it does not exist yet. Returns true when a
    /// row was inserted; an existing row is never touched.
    pub async fn ensure_exists<'e, E>(executor: E, id: i64) -> sqlx::Result<bool>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("INSERT OR IGNORE INTO conversations (id) VALUES (?)")
            .bind(id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Message {
    pub id: i64,
    pub conversation_id: i64,
    pub role: String,
    pub content: String,
    pub created_at: String,
}

impl Message {
    /// All messages of a conversation, oldest first. Unknown conversations
    /// simply have no messages.
    pub async fn list_for_conversation(
        pool: &DbPool,
        conversation_id: i64,
    ) -> sqlx::Result<Vec<Message>> {
        sqlx::query_as(
            "SELECT id, conversation_id, role, content, created_at FROM messages \
             WHERE conversation_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(conversation_id)
        .fetch_all(pool)
        .await
    }

    /// Append a message, creating the conversation on first use.
    pub async fn append(
        pool: &DbPool,
        conversation_id: i64,
        role: &str,
        content: &str,
    ) -> sqlx::Result<Message> {
        let mut tx = pool.begin().await?;

        if Conversation::ensure_exists(&mut *tx, conversation_id).await? {
            tracing::debug!(conversation_id, "Created conversation");
        }

        let latest: Option<String> =
            sqlx::query_scalar("SELECT MAX(created_at) FROM messages WHERE conversation_id = ?")
                .bind(conversation_id)
                .fetch_one(&mut *tx)
                .await?;

        let message: Message = sqlx::query_as(
            "INSERT INTO messages (conversation_id, role, content, created_at) \
             VALUES (?, ?, ?, ?) \
             RETURNING id, conversation_id, role, content, created_at",
        )
        .bind(conversation_id)
        .bind(role)
        .bind(content)
        .bind(next_timestamp(latest))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(message)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateMessageRequest {
    pub role: String,
    pub content: String,
}

/// Message as listed within its conversation
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub id: i64,
    pub role: String,
    pub content: String,
    pub created_at: String,
}

impl From<Message> for MessageResponse {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            role: message.role,
            content: message.content,
            created_at: message.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::db::test_pool;

    async fn find_conversation(pool: &DbPool, id: i64) -> Option<Conversation> {
        sqlx::query_as("SELECT id FROM conversations WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
            .unwrap()
    }

    async fn conversation_count(pool: &DbPool, id: i64) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM conversations WHERE id = ?")
            .bind(id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_append_then_list() {
        let pool = test_pool().await;

        let msg = Message::append(&pool, 42, "user", "hi").await.unwrap();
        assert!(msg.id > 0);
        assert_eq!(msg.conversation_id, 42);
        assert!(!msg.created_at.is_empty());

        let listed = Message::list_for_conversation(&pool, 42).await.unwrap();
        assert_eq!(listed, vec![msg]);
    }

    #[tokio::test]
    async fn test_unknown_conversation_is_empty() {
        let pool = test_pool().await;
        let listed = Message::list_for_conversation(&pool, 7).await.unwrap();
        assert!(listed.is_empty());
        assert!(find_conversation(&pool, 7).await.is_none());
    }

    #[tokio::test]
    async fn test_order_is_insertion_order() {
        let pool = test_pool().await;
        for i in 0..5 {
            Message::append(&pool, 1, "user", &format!("m{i}")).await.unwrap();
        }
        Message::append(&pool, 2, "user", "elsewhere").await.unwrap();

        let contents: Vec<String> = Message::list_for_conversation(&pool, 1)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["m0", "m1", "m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn test_two_appends_create_one_conversation() {
        let pool = test_pool().await;
        Message::append(&pool, 9, "user", "a").await.unwrap();
        Message::append(&pool, 9, "assistant", "b").await.unwrap();

        assert_eq!(conversation_count(&pool, 9).await, 1);
        assert_eq!(Message::list_for_conversation(&pool, 9).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_ensure_exists_reports_creation() {
        let pool = test_pool().await;
        assert!(Conversation::ensure_exists(&pool, 5).await.unwrap());
        assert!(!Conversation::ensure_exists(&pool, 5).await.unwrap());
        assert_eq!(find_conversation(&pool, 5).await, Some(Conversation { id: 5 }));
    }

    #[tokio::test]
    async fn test_concurrent_appends_to_new_conversation() {
        let dir = tempfile::tempdir().unwrap();
        let pool = crate::db::init(&DatabaseConfig::in_data_dir(dir.path()))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..10 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                Message::append(&pool, 77, "user", &format!("m{i}")).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(conversation_count(&pool, 77).await, 1);
        assert_eq!(Message::list_for_conversation(&pool, 77).await.unwrap().len(), 10);
    }

    #[test]
    fn test_next_timestamp_never_goes_backwards() {
        let future = "2999-01-01T00:00:00.000000Z".to_string();
        assert_eq!(next_timestamp(Some(future.clone())), future);

        let past = "2000-01-01T00:00:00.000000Z".to_string();
        assert!(next_timestamp(Some(past.clone())) > past);
        assert!(!next_timestamp(None).is_empty());
    }

    #[tokio::test]
    async fn test_append_after_clock_step_back_keeps_order() {
        let pool = test_pool().await;
        Conversation::ensure_exists(&pool, 3).await.unwrap();

        // A row stamped later than the current clock, as after the clock stepped back
        let future = "2999-01-01T00:00:00.000000Z";
        sqlx::query(
            "INSERT INTO messages (conversation_id, role, content, created_at) \
             VALUES (3, 'user', 'earlier', ?)",
        )
        .bind(future)
        .execute(&pool)
        .await
        .unwrap();

        let appended = Message::append(&pool, 3, "user", "later").await.unwrap();
        assert!(appended.created_at.as_str() >= future);

        let contents: Vec<String> = Message::list_for_conversation(&pool, 3)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["earlier", "later"]);
    }

    #[test]
    fn test_timestamps_are_fixed_width() {
        let ts = now_timestamp();
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), "2024-01-01T00:00:00.000000Z".len());
    }
}
