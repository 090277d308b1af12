use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

use crate::llm::openai::{OpenAiSettings, DEFAULT_API_BASE, DEFAULT_MODEL};

#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JobsConfig {
    pub workers: usize,
    pub poll_interval_ms: u64,
    pub lease_ttl_secs: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub interval_hours: u64,
    pub system_author: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub web: WebConfig,
    pub jobs: JobsConfig,
    pub scheduler: SchedulerConfig,
    // Populated from the .env file.
    pub database_path: String,
    pub allowed_origins: String,
    pub log_level: String,
    pub session_secret_key: String,
    pub scheduler_token: String,
    pub use_secure_cookies: bool,
    pub openai_api_keys: Vec<String>,
    pub openai_models: Vec<String>,
    pub openai_api_base: String,
    pub openai_request_timeout: u64,
}

fn required_var(name: &str) -> Result<String, config::ConfigError> {
    env::var(name).map_err(|_| {
        config::ConfigError::Message(format!(
            "FATAL: Environment variable '{}' is not set in your .env file.",
            name
        ))
    })
}

/// Comma-separated list variable with a single-value fallback variable.
fn list_var(plural: &str, singular: &str) -> Vec<String> {
    let split = |raw: String| -> Vec<String> {
        raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
    };
    let list = env::var(plural).map(split).unwrap_or_default();
    if !list.is_empty() {
        return list;
    }
    env::var(singular).map(split).unwrap_or_default()
}

impl Config {
    pub fn from_env(env_path: &Path) -> Result<Self, config::ConfigError> {
        dotenvy::from_path(env_path).map_err(|e| {
            config::ConfigError::Message(format!(
                "FATAL: Failed to load .env file from '{}'. Error: {}",
                env_path.display(),
                e
            ))
        })?;

        let database_path = required_var("DATABASE_PATH")?;
        if Path::new(&database_path).is_relative() {
            return Err(config::ConfigError::Message(format!(
                "FATAL: The 'DATABASE_PATH' in your .env file is a relative path ('{}'). It MUST be an absolute path.",
                database_path
            )));
        }

        // 128 hex characters (64 bytes).
        let session_secret_key = required_var("SESSION_SECRET_KEY")?;
        if session_secret_key.len() != 128 || !session_secret_key.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(config::ConfigError::Message(
                "FATAL: 'SESSION_SECRET_KEY' must be 128 hexadecimal characters long (64 bytes).".to_string(),
            ));
        }

        let scheduler_token = required_var("SCHEDULER_TOKEN")?;
        if scheduler_token.trim().len() < 16 {
            return Err(config::ConfigError::Message(
                "FATAL: 'SCHEDULER_TOKEN' must be at least 16 characters long.".to_string(),
            ));
        }

        let allowed_origins = env::var("ALLOWED_ORIGINS").unwrap_or_default();
        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let use_secure_cookies = env::var("USE_SECURE_COOKIES")
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .unwrap_or(false);

        let openai_api_keys = list_var("OPENAI_API_KEYS", "OPENAI_API_KEY");
        if openai_api_keys.is_empty() {
            log::warn!("No OPENAI_API_KEY(S) configured; generation jobs will fail until one is set.");
        }
        let mut openai_models = list_var("OPENAI_MODELS", "OPENAI_MODEL");
        if openai_models.is_empty() {
            openai_models.push(DEFAULT_MODEL.to_string());
        }
        let openai_api_base = env::var("OPENAI_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        let openai_request_timeout = env::var("OPENAI_REQUEST_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(30);

        let builder = config::Config::builder()
            // Base settings (host/port, workers, scheduler) from the TOML file.
            .add_source(config::File::new("config/default.toml", config::FileFormat::Toml))
            .set_override("database_path", database_path)?
            .set_override("session_secret_key", session_secret_key)?
            .set_override("scheduler_token", scheduler_token)?
            .set_override("allowed_origins", allowed_origins)?
            .set_override("log_level", log_level)?
            .set_override("use_secure_cookies", use_secure_cookies)?
            .set_override("openai_api_keys", openai_api_keys)?
            .set_override("openai_models", openai_models)?
            .set_override("openai_api_base", openai_api_base)?
            .set_override("openai_request_timeout", openai_request_timeout as i64)?
            .build()?;

        builder.try_deserialize()
    }

    /// Relational store: users, posts, topics, schedule.
    pub fn blog_db_path(&self) -> PathBuf {
        PathBuf::from(&self.database_path).join("blog").join("blog.db")
    }

    /// Job queue and leases.
    pub fn jobs_db_path(&self) -> PathBuf {
        PathBuf::from(&self.database_path).join("jobs").join("jobs.redb")
    }

    pub fn openai_settings(&self) -> OpenAiSettings {
        OpenAiSettings {
            api_keys: self.openai_api_keys.clone(),
            models: self.openai_models.clone(),
            api_base: self.openai_api_base.clone(),
            request_timeout_secs: self.openai_request_timeout,
        }
    }
}
