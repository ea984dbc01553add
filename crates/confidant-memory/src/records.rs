//! Durable persona and message records
//!
//! The relational store keeps the full transcript of every conversation
//! alongside the persona definitions. History in the scored-set store is the
//! model's working context; these records are what the user sees.

use crate::error::{ChatError, ChatResult};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// A persona the user can chat with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    /// Unique identifier
    pub id: String,

    /// Display name, also used as the speaker label in prompts
    pub name: String,

    /// Behavioural instructions placed at the top of every prompt
    pub instructions: String,

    /// Canned example dialogue used to seed a fresh conversation
    pub seed: String,
}

impl Persona {
    /// Create a new persona
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        instructions: impl Into<String>,
        seed: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            instructions: instructions.into(),
            seed: seed.into(),
        }
    }

    /// Name of the backstory document indexed for this persona
    pub fn source_document(&self) -> String {
        format!("{}.txt", self.id)
    }
}

/// User-supplied persona fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PersonaDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub seed: String,
}

impl PersonaDraft {
    /// Turn the draft into persona `id`, rejecting blank fields
    pub fn into_persona(self, id: impl Into<String>) -> ChatResult<Persona> {
        let complete = [&self.name, &self.instructions, &self.seed]
            .iter()
            .all(|field| !field.trim().is_empty());
        if !complete {
            return Err(ChatError::invalid("Missing required fields"));
        }

        Ok(Persona::new(id, self.name.trim(), self.instructions, self.seed))
    }
}

/// Author of a durable message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Sent by the user
    User,
    /// Generated for the persona
    System,
}

impl MessageRole {
    /// Stored representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::System => "system",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MessageRole {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "system" => Ok(Self::System),
            other => Err(ChatError::internal(format!("unknown message role: {}", other))),
        }
    }
}

/// A message about to be recorded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub persona_id: String,
    pub role: MessageRole,
    pub content: String,
    pub user_id: String,
}

impl NewMessage {
    /// Message typed by the user
    pub fn user(
        persona_id: impl Into<String>,
        user_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            persona_id: persona_id.into(),
            role: MessageRole::User,
            content: content.into(),
            user_id: user_id.into(),
        }
    }

    /// Completion generated for the persona
    pub fn system(
        persona_id: impl Into<String>,
        user_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: MessageRole::System,
            ..Self::user(persona_id, user_id, content)
        }
    }
}

/// A recorded message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: Uuid,
    pub persona_id: String,
    pub role: MessageRole,
    pub content: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

impl ConversationMessage {
    /// Stamp a new message with an id and creation time
    pub fn from_new(message: NewMessage) -> Self {
        Self {
            id: Uuid::new_v4(),
            persona_id: message.persona_id,
            role: message.role,
            content: message.content,
            user_id: message.user_id,
            created_at: Utc::now(),
        }
    }
}

/// Durable store of personas and their transcripts
#[async_trait::async_trait]
pub trait ConversationRecords: Send + Sync {
    /// Look up a persona, `None` when it does not exist
    async fn persona(&self, persona_id: &str) -> ChatResult<Option<Persona>>;

    /// Record one message
    async fn append_message(&self, message: NewMessage) -> ChatResult<ConversationMessage>;

    /// Transcript of one user with one persona, oldest first
    async fn messages(&self, persona_id: &str, user_id: &str)
        -> ChatResult<Vec<ConversationMessage>>;

    /// Create `persona` for `owner_id`, or replace it when `owner_id` already
    /// owns it. A persona owned by anyone else is `NotFound`.
    async fn save_persona(&self, persona: Persona, owner_id: &str) -> ChatResult<Persona>;

    /// Remove a persona owned by `owner_id` together with its messages
    async fn delete_persona(&self, persona_id: &str, owner_id: &str) -> ChatResult<()>;
}

#[derive(Debug, Clone)]
struct StoredPersona {
    persona: Persona,
    owner_id: Option<String>,
}

/// Process-local records, for development and tests
#[derive(Debug, Default)]
pub struct InMemoryConversationRecords {
    personas: RwLock<HashMap<String, StoredPersona>>,
    messages: RwLock<Vec<ConversationMessage>>,
}

impl InMemoryConversationRecords {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a persona that no user owns
    pub fn insert_persona(&self, persona: Persona) {
        self.personas.write().insert(
            persona.id.clone(),
            StoredPersona {
                persona,
                owner_id: None,
            },
        );
    }

    /// Number of recorded messages across all conversations
    pub fn message_count(&self) -> usize {
        self.messages.read().len()
    }
}

#[async_trait::async_trait]
impl ConversationRecords for InMemoryConversationRecords {
    async fn persona(&self, persona_id: &str) -> ChatResult<Option<Persona>> {
        Ok(self
            .personas
            .read()
            .get(persona_id)
            .map(|stored| stored.persona.clone()))
    }

    async fn append_message(&self, message: NewMessage) -> ChatResult<ConversationMessage> {
        if !self.personas.read().contains_key(&message.persona_id) {
            return Err(ChatError::NotFound {
                persona_id: message.persona_id,
            });
        }

        let record = ConversationMessage::from_new(message);
        self.messages.write().push(record.clone());
        Ok(record)
    }

    async fn messages(
        &self,
        persona_id: &str,
        user_id: &str,
    ) -> ChatResult<Vec<ConversationMessage>> {
        Ok(self
            .messages
            .read()
            .iter()
            .filter(|m| m.persona_id == persona_id && m.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn save_persona(&self, persona: Persona, owner_id: &str) -> ChatResult<Persona> {
        let mut personas = self.personas.write();

        if let Some(existing) = personas.get(&persona.id) {
            if existing.owner_id.as_deref() != Some(owner_id) {
                return Err(ChatError::NotFound {
                    persona_id: persona.id,
                });
            }
        }

        personas.insert(
            persona.id.clone(),
            StoredPersona {
                persona: persona.clone(),
                owner_id: Some(owner_id.to_string()),
            },
        );
        Ok(persona)
    }

    async fn delete_persona(&self, persona_id: &str, owner_id: &str) -> ChatResult<()> {
        let mut personas = self.personas.write();

        match personas.get(persona_id) {
            Some(stored) if stored.owner_id.as_deref() == Some(owner_id) => {
                personas.remove(persona_id);
            }
            _ => {
                return Err(ChatError::NotFound {
                    persona_id: persona_id.to_string(),
                })
            }
        }
        drop(personas);

        self.messages.write().retain(|m| m.persona_id != persona_id);
        Ok(())
    }
}
