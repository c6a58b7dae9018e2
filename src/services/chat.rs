use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use super::assembler::{assemble, AssemblerEvent};
use super::settings::PromptSource;
use super::store::{ConversationStore, StoreError};
use crate::models::{Conversation, ConversationKey, ConversationSummary, Message};
use crate::providers::traits::Generator;
use crate::providers::types::GenerationRequest;

/// Persisted in place of the reply when generation or streaming fails.
pub const GENERATION_ERROR_MESSAGE: &str =
    "Sorry, I encountered an error generating a response. Please set the required API keys.";

/// Persisted when the turn fails before generation but a conversation exists.
pub const REQUEST_ERROR_MESSAGE: &str = "Sorry, I encountered an error processing your request.";

/// State pushed to the presentation layer. Rendering is entirely outside the
/// core; this channel is its only view into a turn.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    MessagesChanged(Vec<Message>),
    PendingChanged(Option<Message>),
    LoadingChanged(bool),
    ErrorChanged(Option<String>),
    ConversationsChanged(Vec<ConversationSummary>),
    ScrollToBottom,
}

/// Derive a conversation title from the first submission: the first three
/// whitespace-separated words, with an ellipsis when the input has more.
pub fn title_from_input(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut title = words.iter().take(3).copied().collect::<Vec<_>>().join(" ");
    if words.len() > 3 {
        title.push_str("...");
    }
    title
}

/// Drives one user submission end to end: title derivation, conversation
/// creation or reuse, user-message persistence, the streaming generation
/// call, and settling the final assistant message. At most one turn is in
/// flight at a time; the loading flag doubles as the reentrancy guard.
pub struct ChatController {
    store: Arc<dyn ConversationStore>,
    generator: Arc<dyn Generator>,
    prompts: Arc<dyn PromptSource>,
    events: mpsc::UnboundedSender<UiEvent>,
    current: Option<ConversationKey>,
    messages: Vec<Message>,
    local: HashMap<String, Conversation>,
    pending: Option<Message>,
    loading: bool,
    error: Option<String>,
}

impl ChatController {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        generator: Arc<dyn Generator>,
        prompts: Arc<dyn PromptSource>,
    ) -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let controller = Self {
            store,
            generator,
            prompts,
            events,
            current: None,
            messages: Vec::new(),
            local: HashMap::new(),
            pending: None,
            loading: false,
            error: None,
        };
        (controller, rx)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn pending(&self) -> Option<&Message> {
        self.pending.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn current_key(&self) -> Option<&ConversationKey> {
        self.current.as_ref()
    }

    /// Handle one user submission. Rejected without side effects while a
    /// turn is in flight or when the input is blank.
    pub async fn submit(&mut self, input: &str) {
        if self.loading {
            tracing::debug!("Submission rejected: a turn is already in flight");
            return;
        }
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return;
        }

        self.set_loading(true);
        self.set_error(None);

        let title = title_from_input(trimmed);
        let user_message = Message::user(trimmed);

        match self.resolve_conversation(&title, user_message).await {
            Ok(key) => {
                self.run_generation(&key).await;
            }
            Err(request_error) => {
                tracing::error!("Request failed: {}", request_error);
                match self.current.clone() {
                    Some(key) => {
                        let message =
                            Message::assistant(Uuid::new_v4().to_string(), REQUEST_ERROR_MESSAGE);
                        // shown in the conversation even if it cannot persist
                        if let Err(e) = self.append_message(&key, message).await {
                            tracing::error!("Failed to persist error notice: {}", e);
                        }
                    }
                    None => self.set_error(Some(request_error)),
                }
            }
        }

        self.set_loading(false);
    }

    /// Find or create the target conversation and persist the user message
    /// into it. A store that reports itself unavailable degrades to a local
    /// ephemeral conversation; any other creation failure, and any failure
    /// to persist the user message into an existing conversation, escalates
    /// as a request-level error.
    async fn resolve_conversation(
        &mut self,
        title: &str,
        user_message: Message,
    ) -> Result<ConversationKey, String> {
        if let Some(key) = self.current.clone() {
            self.append_message(&key, user_message)
                .await
                .map_err(|e| format!("Failed to persist message: {}", e))?;
            return Ok(key);
        }

        match self.store.create_conversation(title).await {
            Ok(id) => {
                let key = ConversationKey::Durable(id);
                self.current = Some(key.clone());
                self.messages.clear();
                self.append_message(&key, user_message)
                    .await
                    .map_err(|e| format!("Failed to persist message: {}", e))?;
                self.publish_conversations().await;
                Ok(key)
            }
            Err(StoreError::Unavailable(e)) => {
                tracing::warn!("Persistence unavailable, falling back to local: {}", e);
                let key = ConversationKey::new_local();
                self.local
                    .insert(key.id().to_string(), Conversation::new_local(&key, title));
                self.current = Some(key.clone());
                self.messages.clear();
                let _ = self.append_message(&key, user_message).await; // local, cannot fail
                self.publish_conversations().await;
                Ok(key)
            }
            Err(StoreError::Internal(e)) => Err(format!("Failed to create conversation: {}", e)),
        }
    }

    /// Invoke the generation call and drive the assembler, publishing each
    /// snapshot as the pending message. Settles by persisting the final
    /// content, or the fixed fallback message on any streaming failure.
    async fn run_generation(&mut self, key: &ConversationKey) {
        let request = GenerationRequest {
            messages: self.messages.clone(),
            system_prompt: self.prompts.active_prompt(),
        };

        let stream = match self.generator.generate(request).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!("Generation call failed: {}", e);
                self.persist_fallback(key).await;
                return;
            }
        };

        let message_id = Uuid::new_v4().to_string();
        let (tx, mut rx) = mpsc::channel::<AssemblerEvent>(64);
        let _assembler = tokio::spawn(assemble(stream, message_id, tx));

        loop {
            match rx.recv().await {
                Some(AssemblerEvent::Snapshot(snapshot)) => {
                    self.set_pending(Some(snapshot));
                }
                Some(AssemblerEvent::Done(message)) => {
                    self.set_pending(None);
                    if !message.content.trim().is_empty() {
                        if let Err(e) = self.append_message(key, message).await {
                            tracing::error!("Failed to persist message: {}", e);
                            self.set_error(Some(format!("Failed to persist message: {}", e)));
                        }
                    }
                    return;
                }
                Some(AssemblerEvent::Error(e)) => {
                    tracing::error!("Streaming failed: {}", e);
                    self.set_pending(None);
                    self.persist_fallback(key).await;
                    return;
                }
                None => {
                    tracing::error!("Stream closed without a terminal event");
                    self.set_pending(None);
                    self.persist_fallback(key).await;
                    return;
                }
            }
        }
    }

    async fn persist_fallback(&mut self, key: &ConversationKey) {
        let message = Message::assistant(Uuid::new_v4().to_string(), GENERATION_ERROR_MESSAGE);
        if let Err(e) = self.append_message(key, message).await {
            tracing::error!("Failed to persist error notice: {}", e);
        }
    }

    /// Append to the session view and to wherever the conversation lives.
    /// Append order is the arrival order; the controller is the only writer.
    /// The message always lands in the session view; a store failure is
    /// returned for the caller to decide how loudly to surface it.
    async fn append_message(
        &mut self,
        key: &ConversationKey,
        message: Message,
    ) -> Result<(), StoreError> {
        let result = match key {
            ConversationKey::Durable(id) => self.store.add_message(id, &message).await,
            ConversationKey::Local(id) => {
                if let Some(conversation) = self.local.get_mut(id) {
                    conversation.messages.push(message.clone());
                }
                Ok(())
            }
        };
        self.messages.push(message);
        self.publish_messages();
        result
    }

    // --- Conversation surface used by the presentation layer ---

    pub fn new_chat(&mut self) {
        self.current = None;
        self.messages.clear();
        self.publish_messages();
    }

    pub async fn open_conversation(&mut self, id: &str) {
        let key = self.key_for(id);
        match &key {
            ConversationKey::Local(local_id) => {
                self.messages = self
                    .local
                    .get(local_id)
                    .map(|c| c.messages.clone())
                    .unwrap_or_default();
            }
            ConversationKey::Durable(durable_id) => match self.store.list_messages(durable_id).await
            {
                Ok(messages) => self.messages = messages,
                Err(e) => {
                    self.set_error(Some(format!("Failed to load conversation: {}", e)));
                    return;
                }
            },
        }
        self.current = Some(key);
        self.publish_messages();
    }

    pub async fn rename_conversation(&mut self, id: &str, title: &str) {
        match self.key_for(id) {
            ConversationKey::Local(local_id) => {
                if let Some(conversation) = self.local.get_mut(&local_id) {
                    conversation.title = title.to_string();
                }
            }
            ConversationKey::Durable(durable_id) => {
                if let Err(e) = self.store.update_title(&durable_id, title).await {
                    self.set_error(Some(format!("Failed to rename conversation: {}", e)));
                    return;
                }
            }
        }
        self.publish_conversations().await;
    }

    pub async fn delete_conversation(&mut self, id: &str) {
        match self.key_for(id) {
            ConversationKey::Local(local_id) => {
                self.local.remove(&local_id);
            }
            ConversationKey::Durable(durable_id) => {
                if let Err(e) = self.store.delete_conversation(&durable_id).await {
                    self.set_error(Some(format!("Failed to delete conversation: {}", e)));
                    return;
                }
            }
        }
        if self.current.as_ref().is_some_and(|k| k.id() == id) {
            self.new_chat();
        }
        self.publish_conversations().await;
    }

    pub async fn list_conversations(&self) -> Vec<ConversationSummary> {
        let mut summaries = match self.store.list_conversations().await {
            Ok(summaries) => summaries,
            Err(e) => {
                tracing::warn!("Failed to list conversations: {}", e);
                Vec::new()
            }
        };
        for conversation in self.local.values() {
            summaries.push(ConversationSummary {
                id: conversation.id.clone(),
                title: conversation.title.clone(),
            });
        }
        summaries
    }

    fn key_for(&self, id: &str) -> ConversationKey {
        if self.local.contains_key(id) {
            ConversationKey::Local(id.to_string())
        } else {
            ConversationKey::Durable(id.to_string())
        }
    }

    // --- Presentation state ---

    fn publish(&self, event: UiEvent) {
        let _ = self.events.send(event);
    }

    fn publish_messages(&self) {
        self.publish(UiEvent::MessagesChanged(self.messages.clone()));
        self.publish(UiEvent::ScrollToBottom);
    }

    async fn publish_conversations(&self) {
        let summaries = self.list_conversations().await;
        self.publish(UiEvent::ConversationsChanged(summaries));
    }

    fn set_pending(&mut self, pending: Option<Message>) {
        self.pending = pending.clone();
        self.publish(UiEvent::PendingChanged(pending));
    }

    fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
        self.publish(UiEvent::LoadingChanged(loading));
        self.publish(UiEvent::ScrollToBottom);
    }

    fn set_error(&mut self, error: Option<String>) {
        self.error = error.clone();
        self.publish(UiEvent::ErrorChanged(error));
    }
}
