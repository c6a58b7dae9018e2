pub mod conversation;
pub mod message;

pub use conversation::{Conversation, ConversationKey, ConversationSummary};
pub use message::{Message, Role, SystemPrompt};
