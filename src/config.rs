use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;

pub const DEFAULT_CONFIG_FILE: &str = "article_tracker.toml";
const ENV_PREFIX: &str = "ARTICLE_TRACKER";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub history_capacity: usize,
    pub database_path: String,
    pub default_site: String,
    /// Whether opening an article from the saved list also counts as a visit.
    pub record_saved_opens: bool,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            history_capacity: 500,
            database_path: "article_tracker.db".to_string(),
            default_site: "en.wikipedia.org".to_string(),
            record_saved_opens: true,
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
        }
    }
}

impl Config {
    /// Loads `article_tracker.toml` from the working directory when present,
    /// then applies `ARTICLE_TRACKER__*` environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    pub fn load_from(path: &str) -> Result<Self> {
        let defaults = Config::default();

        let settings = config::Config::builder()
            .set_default("history_capacity", defaults.history_capacity as i64)?
            .set_default("database_path", defaults.database_path)?
            .set_default("default_site", defaults.default_site)?
            .set_default("record_saved_opens", defaults.record_saved_opens)?
            .set_default("retry.max_attempts", i64::from(defaults.retry.max_attempts))?
            .set_default("retry.base_delay_ms", defaults.retry.base_delay_ms as i64)?
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.history_capacity > 0, "history_capacity must be greater than zero");
        ensure!(self.retry.max_attempts > 0, "retry.max_attempts must be greater than zero");
        ensure!(!self.default_site.trim().is_empty(), "default_site must not be empty");
        Ok(())
    }

    pub fn history_capacity(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.history_capacity).unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load_from("/nonexistent/article_tracker").unwrap();
        assert_eq!(config.history_capacity, 500);
        assert!(config.record_saved_opens);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn file_values_override_defaults() {
        let path = std::env::temp_dir().join(format!("article-tracker-config-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "history_capacity = 25").unwrap();
        writeln!(file, "record_saved_opens = false").unwrap();
        writeln!(file, "[retry]").unwrap();
        writeln!(file, "base_delay_ms = 5").unwrap();
        drop(file);

        let config = Config::load_from(path.to_str().unwrap()).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.history_capacity, 25);
        assert!(!config.record_saved_opens);
        assert_eq!(config.retry.base_delay_ms, 5);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.database_path, "article_tracker.db");
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let config = Config {
            history_capacity: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
