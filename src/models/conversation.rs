use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::message::Message;

/// Identity of a conversation. Durable ids come from the store; local ids
/// are synthesized in-process when persistence is unavailable. The two id
/// spaces never collide: local ids carry a `local-` prefix on top of the
/// tagged variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConversationKey {
    Durable(String),
    Local(String),
}

impl ConversationKey {
    pub fn new_local() -> Self {
        ConversationKey::Local(format!("local-{}", Uuid::new_v4()))
    }

    pub fn id(&self) -> &str {
        match self {
            ConversationKey::Durable(id) | ConversationKey::Local(id) => id,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, ConversationKey::Local(_))
    }
}

/// A conversation held in memory: the local-fallback object, and the shape
/// the presentation layer sees for the open conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new_local(key: &ConversationKey, title: impl Into<String>) -> Self {
        Self {
            id: key.id().to_string(),
            title: title.into(),
            messages: Vec::new(),
        }
    }
}

/// Listing row for the conversation sidebar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
}
