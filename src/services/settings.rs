use std::sync::{Arc, RwLock};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::database::Database;
use crate::models::SystemPrompt;

const SETTINGS_KEY: &str = "app_settings";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default = "default_true")]
    pub system_prompt_enabled: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            system_prompt: None,
            system_prompt_enabled: true,
        }
    }
}

fn default_true() -> bool {
    true
}

pub struct SettingsService;

impl SettingsService {
    pub async fn load(db: &Database) -> AppSettings {
        match db.get_setting(SETTINGS_KEY).await {
            Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_default(),
            _ => AppSettings::default(),
        }
    }

    pub async fn save(db: &Database, settings: &AppSettings) -> Result<()> {
        let json = serde_json::to_string(settings)?;
        db.set_setting(SETTINGS_KEY, &json).await
    }
}

/// Read-only lookup of the active system prompt, injected into the turn
/// controller so it never touches ambient global state.
pub trait PromptSource: Send + Sync {
    fn active_prompt(&self) -> Option<SystemPrompt>;
}

/// Process-wide settings handle shared between the UI (writer) and the turn
/// controller (reader).
#[derive(Clone, Default)]
pub struct SharedSettings {
    inner: Arc<RwLock<AppSettings>>,
}

impl SharedSettings {
    pub fn new(settings: AppSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    pub fn snapshot(&self) -> AppSettings {
        self.inner.read().unwrap().clone()
    }

    pub fn set_system_prompt(&self, prompt: Option<String>) {
        let mut settings = self.inner.write().unwrap();
        settings.system_prompt = prompt;
    }
}

impl PromptSource for SharedSettings {
    fn active_prompt(&self) -> Option<SystemPrompt> {
        let settings = self.inner.read().unwrap();
        settings.system_prompt.as_ref().map(|value| SystemPrompt {
            value: value.clone(),
            enabled: settings.system_prompt_enabled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_defaults_when_unset() {
        let db = Database::new_in_memory().unwrap();
        let settings = SettingsService::load(&db).await;
        assert!(settings.system_prompt.is_none());
        assert!(settings.system_prompt_enabled);
    }

    #[tokio::test]
    async fn save_and_reload() {
        let db = Database::new_in_memory().unwrap();
        let settings = AppSettings {
            system_prompt: Some("be brief".to_string()),
            system_prompt_enabled: true,
        };
        SettingsService::save(&db, &settings).await.unwrap();

        let loaded = SettingsService::load(&db).await;
        assert_eq!(loaded.system_prompt.as_deref(), Some("be brief"));
    }

    #[test]
    fn active_prompt_absent_when_unconfigured() {
        let shared = SharedSettings::default();
        assert!(shared.active_prompt().is_none());

        shared.set_system_prompt(Some("act as a pirate".to_string()));
        let prompt = shared.active_prompt().unwrap();
        assert_eq!(prompt.value, "act as a pirate");
        assert!(prompt.enabled);
    }
}
