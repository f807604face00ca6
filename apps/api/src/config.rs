use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};

use crate::context::ContextStrategy;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_model: String,
    pub llm_temperature: f32,
    pub rate_limit_backoff_ms: u64,
    pub port: u16,
    pub reports_dir: PathBuf,
    pub max_context_tokens: usize,
    pub context_strategy: ContextStrategy,
    pub tesseract_cmd: String,
    pub max_upload_mb: usize,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            openai_api_key: require_env("OPENAI_API_KEY")?,
            openai_base_url: env_or("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            openai_model: env_or("OPENAI_MODEL", "gpt-4"),
            llm_temperature: parse_env("LLM_TEMPERATURE", 0.7)?,
            rate_limit_backoff_ms: parse_env("LLM_RATE_LIMIT_BACKOFF_MS", 5000)?,
            port: parse_env("PORT", 5000)?,
            reports_dir: PathBuf::from(env_or("REPORTS_DIR", "static/reports")),
            max_context_tokens: parse_env("MAX_CONTEXT_TOKENS", 6000)?,
            context_strategy: parse_env("CONTEXT_STRATEGY", ContextStrategy::Trim)?,
            tesseract_cmd: env_or("TESSERACT_CMD", "tesseract"),
            max_upload_mb: parse_env("MAX_UPLOAD_MB", 25)?,
            rust_log: env_or("RUST_LOG", "info"),
        })
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb * 1024 * 1024
    }
}

impl FromStr for ContextStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trim" => Ok(ContextStrategy::Trim),
            "summarize" => Ok(ContextStrategy::Summarize),
            other => bail!("unknown context strategy '{other}' (expected 'trim' or 'summarize')"),
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("{key} has an invalid value: '{raw}'")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
impl Config {
    /// Config with defaults suitable for in-process tests; no network access implied.
    pub fn for_tests(reports_dir: PathBuf) -> Self {
        Config {
            openai_api_key: "test-key".to_string(),
            openai_base_url: "http://127.0.0.1:9".to_string(),
            openai_model: "gpt-4".to_string(),
            llm_temperature: 0.7,
            rate_limit_backoff_ms: 1,
            port: 0,
            reports_dir,
            max_context_tokens: 6000,
            context_strategy: ContextStrategy::Trim,
            tesseract_cmd: "tesseract".to_string(),
            max_upload_mb: 25,
            rust_log: "info".to_string(),
        }
    }
}
