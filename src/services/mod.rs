pub mod assembler;
pub mod chat;
pub mod database;
pub mod settings;
pub mod store;

pub use chat::{ChatController, UiEvent};
pub use database::Database;
pub use settings::{SettingsService, SharedSettings};
pub use store::ConversationStore;
