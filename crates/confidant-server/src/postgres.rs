//! Postgres-backed persona and message records

use chrono::{DateTime, Utc};
use confidant_memory::{
    ChatError, ChatResult, ConversationMessage, ConversationRecords, NewMessage, Persona,
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use tracing::info;
use uuid::Uuid;

const SCHEMA: [&str; 4] = [
    r#"CREATE TABLE IF NOT EXISTS personas (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        instructions TEXT NOT NULL,
        seed TEXT NOT NULL,
        owner_id TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"ALTER TABLE personas ADD COLUMN IF NOT EXISTS owner_id TEXT"#,
    r#"CREATE TABLE IF NOT EXISTS messages (
        id UUID PRIMARY KEY,
        persona_id TEXT NOT NULL REFERENCES personas(id) ON DELETE CASCADE,
        role TEXT NOT NULL,
        content TEXT NOT NULL,
        user_id TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )"#,
    r#"CREATE INDEX IF NOT EXISTS messages_conversation_idx
        ON messages (persona_id, user_id, created_at)"#,
];

#[derive(Debug, FromRow)]
struct PersonaRow {
    id: String,
    name: String,
    instructions: String,
    seed: String,
}

#[derive(Debug, FromRow)]
struct MessageRow {
    id: Uuid,
    persona_id: String,
    role: String,
    content: String,
    user_id: String,
    created_at: DateTime<Utc>,
}

impl MessageRow {
    fn into_message(self) -> ChatResult<ConversationMessage> {
        Ok(ConversationMessage {
            id: self.id,
            persona_id: self.persona_id,
            role: self.role.parse()?,
            content: self.content,
            user_id: self.user_id,
            created_at: self.created_at,
        })
    }
}

/// Records stored in the `personas` and `messages` tables
#[derive(Clone)]
pub struct PgConversationRecords {
    pool: PgPool,
}

impl PgConversationRecords {
    /// Wrap an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and make sure the tables exist
    pub async fn connect(url: &str) -> ChatResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .map_err(|e| ChatError::store("connect", e))?;

        let records = Self::new(pool);
        records.ensure_schema().await?;
        Ok(records)
    }

    /// Create the tables when missing
    pub async fn ensure_schema(&self) -> ChatResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| ChatError::store("ensure_schema", e))?;
        }
        info!("Conversation record schema ready");
        Ok(())
    }
}

#[async_trait::async_trait]
impl ConversationRecords for PgConversationRecords {
    async fn persona(&self, persona_id: &str) -> ChatResult<Option<Persona>> {
        let row: Option<PersonaRow> = sqlx::query_as(
            "SELECT id, name, instructions, seed FROM personas WHERE id = $1",
        )
        .bind(persona_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ChatError::store("select_persona", e))?;

        Ok(row.map(|r| Persona::new(r.id, r.name, r.instructions, r.seed)))
    }

    async fn append_message(&self, message: NewMessage) -> ChatResult<ConversationMessage> {
        let record = ConversationMessage::from_new(message);

        sqlx::query(
            "INSERT INTO messages (id, persona_id, role, content, user_id, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(record.id)
        .bind(&record.persona_id)
        .bind(record.role.as_str())
        .bind(&record.content)
        .bind(&record.user_id)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| ChatError::store("insert_message", e))?;

        Ok(record)
    }

    async fn messages(
        &self,
        persona_id: &str,
        user_id: &str,
    ) -> ChatResult<Vec<ConversationMessage>> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT id, persona_id, role, content, user_id, created_at FROM messages \
             WHERE persona_id = $1 AND user_id = $2 ORDER BY created_at ASC",
        )
        .bind(persona_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ChatError::store("select_messages", e))?;

        rows.into_iter().map(MessageRow::into_message).collect()
    }

    async fn save_persona(&self, persona: Persona, owner_id: &str) -> ChatResult<Persona> {
        let result = sqlx::query(
            "INSERT INTO personas (id, name, instructions, seed, owner_id) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (id) DO UPDATE SET \
                name = EXCLUDED.name, instructions = EXCLUDED.instructions, seed = EXCLUDED.seed \
             WHERE personas.owner_id = EXCLUDED.owner_id",
        )
        .bind(&persona.id)
        .bind(&persona.name)
        .bind(&persona.instructions)
        .bind(&persona.seed)
        .bind(owner_id)
        .execute(&self.pool)
        .await
        .map_err(|e| ChatError::store("upsert_persona", e))?;

        if result.rows_affected() == 0 {
            return Err(ChatError::NotFound {
                persona_id: persona.id,
            });
        }
        Ok(persona)
    }

    async fn delete_persona(&self, persona_id: &str, owner_id: &str) -> ChatResult<()> {
        let result = sqlx::query("DELETE FROM personas WHERE id = $1 AND owner_id = $2")
            .bind(persona_id)
            .bind(owner_id)
            .execute(&self.pool)
            .await
            .map_err(|e| ChatError::store("delete_persona", e))?;

        if result.rows_affected() == 0 {
            return Err(ChatError::NotFound {
                persona_id: persona_id.to_string(),
            });
        }
        Ok(())
    }
}
