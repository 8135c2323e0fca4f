//! Runtime configuration: built-in defaults overlaid by `FORUM_*` environment
//! variables (a `.env` file is loaded first by `main`).

use chrono::Duration;
use config::{Config, ConfigError, Environment};
use rf_core::ForumSettings;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database_url: String,
    pub bind_host: String,
    pub bind_port: u16,
    pub session_ttl_hours: i64,
    pub edit_grace_minutes: i64,
    /// Secret mixed into stored token digests.
    pub auth_pepper: String,
}

/// Ten years.
const MAX_SESSION_TTL_HOURS: i64 = 24 * 365 * 10;
/// One day.
const MAX_EDIT_GRACE_MINUTES: i64 = 60 * 24;

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let settings: Self = Self::builder()?
            .add_source(Environment::with_prefix("FORUM").try_parsing(true))
            .build()?
            .try_deserialize()?;
        settings.forum_settings()?;
        Ok(settings)
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("database_url", "sqlite:rusty_forum.db")?
            .set_default("bind_host", "127.0.0.1")?
            .set_default("bind_port", 8080)?
            .set_default("session_ttl_hours", 24 * 14)?
            .set_default("edit_grace_minutes", 5)?
            .set_default("auth_pepper", "")
    }

    pub fn forum_settings(&self) -> Result<ForumSettings, ConfigError> {
        let session_ttl = Some(self.session_ttl_hours)
            .filter(|hours| (1..=MAX_SESSION_TTL_HOURS).contains(hours))
            .and_then(Duration::try_hours)
            .ok_or_else(|| out_of_range("session_ttl_hours", self.session_ttl_hours, 1, MAX_SESSION_TTL_HOURS))?;
        let edit_grace = Some(self.edit_grace_minutes)
            .filter(|minutes| (0..=MAX_EDIT_GRACE_MINUTES).contains(minutes))
            .and_then(Duration::try_minutes)
            .ok_or_else(|| out_of_range("edit_grace_minutes", self.edit_grace_minutes, 0, MAX_EDIT_GRACE_MINUTES))?;
        Ok(ForumSettings { session_ttl, edit_grace })
    }
}

fn out_of_range(key: &str, value: i64, min: i64, max: i64) -> ConfigError {
    ConfigError::Message(format!("{key} must be between {min} and {max}, got {value}"))
}
