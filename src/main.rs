mod config;
mod models;
mod providers;
mod services;
mod ui;

use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use providers::AnthropicGenerator;
use services::chat::ChatController;
use services::{Database, SettingsService, SharedSettings};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let db = Database::new().await?;
    let settings = SharedSettings::new(SettingsService::load(&db).await);

    let api_key = std::env::var(config::API_KEY_ENV).unwrap_or_default();
    if api_key.is_empty() {
        eprintln!(
            "warning: {} is not set; responses will fail until it is",
            config::API_KEY_ENV
        );
    }
    let model =
        std::env::var(config::MODEL_ENV).unwrap_or_else(|_| config::DEFAULT_MODEL.to_string());
    let base_url = std::env::var(config::BASE_URL_ENV).ok();

    let generator = Arc::new(AnthropicGenerator::new(api_key, model, base_url));
    let (controller, events) =
        ChatController::new(Arc::new(db.clone()), generator, Arc::new(settings.clone()));

    ui::run(controller, events, settings, db).await
}
