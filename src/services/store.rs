use async_trait::async_trait;
use thiserror::Error;

use crate::models::{ConversationSummary, Message};

#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing persistence cannot be reached. The turn controller
    /// degrades to a local ephemeral conversation on this variant.
    #[error("persistence unavailable: {0}")]
    Unavailable(String),

    /// Any other store failure. Escalated as a request-level error.
    #[error("store error: {0}")]
    Internal(String),
}

/// Durable conversation persistence. Appends for a single conversation are
/// issued sequentially by the turn controller; the store only has to keep
/// them in arrival order.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create_conversation(&self, title: &str) -> Result<String, StoreError>;

    async fn add_message(&self, conversation_id: &str, message: &Message)
        -> Result<(), StoreError>;

    async fn update_title(&self, conversation_id: &str, title: &str) -> Result<(), StoreError>;

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), StoreError>;

    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, StoreError>;

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>, StoreError>;
}
