use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::ai::client::{ChatMessage, ToolCall};
use crate::error::Result;
use crate::models::Conversation;

#[derive(Clone)]
pub struct ConversationStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct ConversationRow {
    conversation_id: String,
    session_id: String,
    repo_id: String,
    title: String,
    system_prompt: String,
    message_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ConversationRow {
    fn into_model(self) -> Conversation {
        Conversation {
            conversation_id: self.conversation_id,
            session_id: self.session_id,
            repo_id: self.repo_id,
            title: self.title,
            system_prompt: self.system_prompt,
            message_count: self.message_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl ConversationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// One conversation per `(session_id, repo_id)` pair; created on first
    /// query with a title cut from that query.
    pub async fn find_or_create(
        &self,
        session_id: &str,
        repo_id: &str,
        system_prompt: &str,
        title: &str,
    ) -> Result<Conversation> {
        if let Some(row) = sqlx::query_as::<_, ConversationRow>(
            "SELECT * FROM conversations WHERE session_id = $1 AND repo_id = $2",
        )
        .bind(session_id)
        .bind(repo_id)
        .fetch_optional(&self.pool)
        .await?
        {
            return Ok(row.into_model());
        }

        let conversation_id = format!("conv-{}", Uuid::new_v4());
        let row = sqlx::query_as::<_, ConversationRow>(
            r#"
            INSERT INTO conversations (conversation_id, session_id, repo_id, title, system_prompt)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (session_id, repo_id) DO UPDATE SET updated_at = now()
            RETURNING *
            "#,
        )
        .bind(&conversation_id)
        .bind(session_id)
        .bind(repo_id)
        .bind(title)
        .bind(system_prompt)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into_model())
    }

    pub async fn increment_message_count(
        &self,
        conversation_id: &str,
        increment: i64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE conversations SET message_count = message_count + $2, updated_at = now() \
             WHERE conversation_id = $1",
        )
        .bind(conversation_id)
        .bind(increment)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct MessageStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    role: String,
    content: String,
    tool_calls: Option<Json<Vec<ToolCall>>>,
    tool_call_id: Option<String>,
}

impl MessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Next sequence number for the conversation. Callers serialize turn
    /// writes, so a read-increment is enough here.
    pub async fn next_sequence_number(&self, conversation_id: &str) -> Result<i64> {
        let (max,): (Option<i64>,) = sqlx::query_as(
            "SELECT MAX(sequence_number) FROM messages WHERE conversation_id = $1",
        )
        .bind(conversation_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(max.unwrap_or(0) + 1)
    }

    pub async fn create(
        &self,
        conversation_id: &str,
        role: &str,
        content: &str,
        tool_calls: Option<&[ToolCall]>,
        tool_call_id: Option<&str>,
        sequence_number: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO messages
                (message_id, conversation_id, role, content, tool_calls, tool_call_id,
                 sequence_number)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(format!("msg-{}", Uuid::new_v4()))
        .bind(conversation_id)
        .bind(role)
        .bind(content)
        .bind(tool_calls.map(Json))
        .bind(tool_call_id)
        .bind(sequence_number)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Last `limit` messages in chronological order, shaped for the LLM
    /// request.
    pub async fn recent_chat_messages(
        &self,
        conversation_id: &str,
        limit: i64,
    ) -> Result<Vec<ChatMessage>> {
        let mut rows = sqlx::query_as::<_, MessageRow>(
            "SELECT role, content, tool_calls, tool_call_id FROM messages \
             WHERE conversation_id = $1 ORDER BY sequence_number DESC LIMIT $2",
        )
        .bind(conversation_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.reverse();

        Ok(rows
            .into_iter()
            .map(|row| ChatMessage {
                role: row.role,
                content: if row.content.is_empty() {
                    None
                } else {
                    Some(row.content)
                },
                tool_calls: row.tool_calls.map(|t| t.0),
                tool_call_id: row.tool_call_id,
            })
            .collect())
    }
}
