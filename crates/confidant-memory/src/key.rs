//! Conversation addressing and caller identity

use crate::error::{ChatError, ChatResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity tuple addressing one persona + user + model conversation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey {
    persona_id: String,
    user_id: String,
    model_id: String,
}

impl ConversationKey {
    /// Create a key, rejecting empty persona or user identifiers
    pub fn new(
        persona_id: impl Into<String>,
        user_id: impl Into<String>,
        model_id: impl Into<String>,
    ) -> ChatResult<Self> {
        let persona_id = persona_id.into();
        let user_id = user_id.into();

        if user_id.trim().is_empty() {
            return Err(ChatError::Unauthenticated);
        }
        if persona_id.trim().is_empty() {
            return Err(ChatError::NotFound { persona_id });
        }

        Ok(Self {
            persona_id,
            user_id,
            model_id: model_id.into(),
        })
    }

    /// Persona identifier
    pub fn persona_id(&self) -> &str {
        &self.persona_id
    }

    /// User identifier
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Model identifier
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Storage address used by the history store
    pub fn storage_key(&self) -> String {
        format!("{}-{}-{}", self.persona_id, self.model_id, self.user_id)
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_key())
    }
}

/// The authenticated caller, as supplied by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable user identifier
    pub user_id: String,

    /// Human-readable name
    pub display_name: String,
}

impl Identity {
    /// Create a new identity
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
        }
    }

    /// Both fields must be present for the caller to count as authenticated
    pub fn is_complete(&self) -> bool {
        !self.user_id.trim().is_empty() && !self.display_name.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_key_layout() {
        let key = ConversationKey::new("companion-1", "user-42", "llama2-13b").unwrap();
        assert_eq!(key.storage_key(), "companion-1-llama2-13b-user-42");
        assert_eq!(key.to_string(), key.storage_key());
    }

    #[test]
    fn test_equal_fields_are_interchangeable() {
        let a = ConversationKey::new("p", "u", "m").unwrap();
        let b = ConversationKey::new("p", "u", "m").unwrap();
        assert_eq!(a, b);

        let mut set = std::collections::HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_empty_identifiers_rejected() {
        assert!(matches!(
            ConversationKey::new("p", " ", "m"),
            Err(ChatError::Unauthenticated)
        ));
        assert!(matches!(
            ConversationKey::new("", "u", "m"),
            Err(ChatError::NotFound { .. })
        ));
    }

    #[test]
    fn test_identity_completeness() {
        assert!(Identity::new("user-1", "Ada").is_complete());
        assert!(!Identity::new("user-1", "").is_complete());
        assert!(!Identity::new("", "Ada").is_complete());
    }
}
