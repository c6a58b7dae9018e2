pub const APP_NAME: &str = "banter";

pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
pub const BASE_URL_ENV: &str = "ANTHROPIC_BASE_URL";
pub const MODEL_ENV: &str = "BANTER_MODEL";

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";
