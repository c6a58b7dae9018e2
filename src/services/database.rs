use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tokio::task;
use uuid::Uuid;

use super::store::{ConversationStore, StoreError};
use crate::config;
use crate::models::{ConversationSummary, Message, Role};

#[derive(Debug, Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub async fn new() -> Result<Self> {
        let path = Self::db_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data directory: {}", parent.display()))?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Create an in-memory database (used for testing)
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn db_path() -> Result<PathBuf> {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|_| {
                std::env::var("HOME").map(|home| PathBuf::from(home).join(".local/share"))
            })
            .context("Neither XDG_DATA_HOME nor HOME is set")?;
        Ok(data_dir
            .join(config::APP_NAME)
            .join(format!("{}.db", config::APP_NAME)))
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER NOT NULL
            );",
        )?;

        let version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if version < 1 {
            conn.execute_batch(
                "CREATE TABLE conversations (
                    id TEXT PRIMARY KEY,
                    title TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE messages (
                    id TEXT PRIMARY KEY,
                    conversation_id TEXT NOT NULL,
                    role TEXT NOT NULL,
                    content TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
                );

                CREATE TABLE settings (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );

                CREATE INDEX idx_conversations_updated ON conversations(updated_at DESC);
                CREATE INDEX idx_messages_conversation ON messages(conversation_id);

                INSERT INTO schema_version (version) VALUES (1);",
            )?;
        }

        Ok(())
    }

    // --- Conversation CRUD ---

    pub async fn insert_conversation(&self, title: &str) -> Result<String> {
        let conn = self.conn.clone();
        let title = title.to_string();
        task::spawn_blocking(move || {
            let id = Uuid::new_v4().to_string();
            let now = Utc::now().to_rfc3339();
            let conn = conn.lock().unwrap();
            conn.execute(
                "INSERT INTO conversations (id, title, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, title, now, now],
            )?;
            Ok(id)
        })
        .await?
    }

    pub async fn conversation_summaries(&self) -> Result<Vec<ConversationSummary>> {
        let conn = self.conn.clone();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let mut stmt = conn.prepare(
                "SELECT id, title FROM conversations ORDER BY updated_at DESC",
            )?;
            let summaries = stmt
                .query_map([], |row| {
                    Ok(ConversationSummary {
                        id: row.get(0)?,
                        title: row.get(1)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(summaries)
        })
        .await?
    }

    pub async fn update_conversation_title(&self, id: &str, title: &str) -> Result<()> {
        let conn = self.conn.clone();
        let id = id.to_string();
        let title = title.to_string();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute(
                "UPDATE conversations SET title = ?1, updated_at = ?2 WHERE id = ?3",
                params![title, Utc::now().to_rfc3339(), id],
            )?;
            Ok(())
        })
        .await?
    }

    pub async fn remove_conversation(&self, id: &str) -> Result<()> {
        let conn = self.conn.clone();
        let id = id.to_string();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute("DELETE FROM conversations WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await?
    }

    // --- Message CRUD ---

    pub async fn insert_message(&self, conversation_id: &str, message: &Message) -> Result<()> {
        let conn = self.conn.clone();
        let conversation_id = conversation_id.to_string();
        let msg = message.clone();
        task::spawn_blocking(move || {
            let now = Utc::now().to_rfc3339();
            let conn = conn.lock().unwrap();
            conn.execute(
                "INSERT INTO messages (id, conversation_id, role, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![msg.id, conversation_id, msg.role.as_str(), msg.content, now],
            )?;
            conn.execute(
                "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
                params![now, conversation_id],
            )?;
            Ok(())
        })
        .await?
    }

    /// Messages in arrival order. Insertion order is the rowid order, which
    /// is stabler than the timestamp column for back-to-back appends.
    pub async fn messages_for(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let conn = self.conn.clone();
        let conversation_id = conversation_id.to_string();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let mut stmt = conn.prepare(
                "SELECT id, role, content FROM messages
                 WHERE conversation_id = ?1 ORDER BY rowid ASC",
            )?;
            let messages = stmt
                .query_map(params![conversation_id], |row| {
                    let role_str: String = row.get(1)?;
                    Ok((row.get::<_, String>(0)?, role_str, row.get::<_, String>(2)?))
                })?
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .map(|(id, role_str, content)| {
                    let role = Role::from_str(&role_str)
                        .ok_or_else(|| anyhow::anyhow!("Unknown role: {}", role_str))?;
                    Ok(Message { id, role, content })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(messages)
        })
        .await?
    }

    // --- Settings ---

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.clone();
        let key = key.to_string();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let result: Option<String> = conn
                .query_row(
                    "SELECT value FROM settings WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(result)
        })
        .await?
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.clone();
        let key = key.to_string();
        let value = value.to_string();
        task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            conn.execute(
                "INSERT INTO settings (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = ?2",
                params![key, value],
            )?;
            Ok(())
        })
        .await?
    }
}

/// Sort a low-level failure into the store's two error classes. Errors that
/// mean the database file cannot be reached or written right now are
/// `Unavailable` (the caller may degrade to a local conversation); constraint
/// violations, join failures, and other logic errors are `Internal` and
/// escalate to the user.
fn classify_error(e: anyhow::Error) -> StoreError {
    if let Some(rusqlite::Error::SqliteFailure(code, _)) = e.downcast_ref::<rusqlite::Error>() {
        return match code.code {
            ErrorCode::CannotOpen
            | ErrorCode::NotADatabase
            | ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::DatabaseCorrupt
            | ErrorCode::DiskFull
            | ErrorCode::ReadOnly
            | ErrorCode::PermissionDenied
            | ErrorCode::SystemIoFailure => StoreError::Unavailable(e.to_string()),
            _ => StoreError::Internal(e.to_string()),
        };
    }
    StoreError::Internal(e.to_string())
}

#[async_trait]
impl ConversationStore for Database {
    async fn create_conversation(&self, title: &str) -> Result<String, StoreError> {
        self.insert_conversation(title).await.map_err(classify_error)
    }

    async fn add_message(
        &self,
        conversation_id: &str,
        message: &Message,
    ) -> Result<(), StoreError> {
        self.insert_message(conversation_id, message)
            .await
            .map_err(classify_error)
    }

    async fn update_title(&self, conversation_id: &str, title: &str) -> Result<(), StoreError> {
        self.update_conversation_title(conversation_id, title)
            .await
            .map_err(classify_error)
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), StoreError> {
        self.remove_conversation(conversation_id)
            .await
            .map_err(classify_error)
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, StoreError> {
        self.conversation_summaries().await.map_err(classify_error)
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>, StoreError> {
        self.messages_for(conversation_id).await.map_err(classify_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schema_initialization() {
        let db = Database::new_in_memory().unwrap();
        let summaries = db.conversation_summaries().await.unwrap();
        assert!(summaries.is_empty());
    }

    #[tokio::test]
    async fn test_conversation_and_messages() {
        let db = Database::new_in_memory().unwrap();

        let id = db.insert_conversation("Test Chat").await.unwrap();

        db.insert_message(&id, &Message::user("Hello!")).await.unwrap();
        db.insert_message(&id, &Message::assistant("m2", "Hi there"))
            .await
            .unwrap();

        let messages = db.messages_for(&id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "Hello!");
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].content, "Hi there");
        assert_eq!(messages[1].role, Role::Assistant);

        let summaries = db.conversation_summaries().await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].title, "Test Chat");

        db.remove_conversation(&id).await.unwrap();
        assert!(db.conversation_summaries().await.unwrap().is_empty());

        // Messages should be cascade deleted
        let messages = db.messages_for(&id).await.unwrap();
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn test_messages_keep_arrival_order() {
        let db = Database::new_in_memory().unwrap();
        let id = db.insert_conversation("ordering").await.unwrap();

        for i in 0..20 {
            db.insert_message(&id, &Message::user(format!("msg {}", i)))
                .await
                .unwrap();
        }

        let messages = db.messages_for(&id).await.unwrap();
        let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        let expected: Vec<String> = (0..20).map(|i| format!("msg {}", i)).collect();
        assert_eq!(contents, expected);
    }

    #[tokio::test]
    async fn test_title_update() {
        let db = Database::new_in_memory().unwrap();
        let id = db.insert_conversation("before").await.unwrap();
        db.update_conversation_title(&id, "after").await.unwrap();

        let summaries = db.conversation_summaries().await.unwrap();
        assert_eq!(summaries[0].title, "after");
    }

    #[tokio::test]
    async fn constraint_failures_escalate_as_internal() {
        let db = Database::new_in_memory().unwrap();

        // foreign_keys=ON, so inserting into a missing conversation violates
        // the FK constraint; that is a logic error, not lost persistence
        let err = db
            .add_message("no-such-conversation", &Message::user("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Internal(_)));
    }

    #[tokio::test]
    async fn test_settings_round_trip() {
        let db = Database::new_in_memory().unwrap();
        assert!(db.get_setting("missing").await.unwrap().is_none());

        db.set_setting("k", "v1").await.unwrap();
        assert_eq!(db.get_setting("k").await.unwrap().as_deref(), Some("v1"));

        db.set_setting("k", "v2").await.unwrap();
        assert_eq!(db.get_setting("k").await.unwrap().as_deref(), Some("v2"));
    }
}
