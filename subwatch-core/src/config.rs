use crate::error::{ConfigError, CoreError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "SUBWATCH_CONFIG";
pub const DATABASE_URL_ENV: &str = "SUBWATCH_DATABASE_URL";

/// Largest page Reddit serves for a single listing request.
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Startup configuration. Immutable once the supervisor is running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sources: Vec<String>,
    pub keywords: Vec<String>,
    pub requests_per_minute: u32,
    pub poll_interval_secs: u64,
    pub page_limit: u32,
    pub database_url: String,
    pub user_agent: String,
    /// No per-request timeout unless set.
    pub request_timeout_secs: Option<u64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sources: vec!["golang".to_string(), "programming".to_string()],
            keywords: vec![
                "Goroutine".to_string(),
                "Channel".to_string(),
                "Concurrency".to_string(),
            ],
            requests_per_minute: 80,
            poll_interval_secs: 30,
            page_limit: MAX_PAGE_LIMIT,
            database_url: "sqlite://subwatch.db".to_string(),
            user_agent: concat!("subwatch/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout_secs: None,
        }
    }
}

impl AppConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, CoreError> {
        let config: AppConfig = toml::from_str(raw).map_err(ConfigError::from)?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, CoreError> {
        let raw = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CoreError::Config(ConfigError::FileNotFound {
                path: path.display().to_string(),
            }),
            _ => CoreError::Io(e),
        })?;
        Self::from_toml_str(&raw)
    }

    /// Resolves the configuration for process startup: an explicit path
    /// wins, then `SUBWATCH_CONFIG`, then built-in defaults. The database URL
    /// can be overridden through `SUBWATCH_DATABASE_URL`. The result is
    /// validated before it is returned.
    pub fn load(path: Option<&Path>) -> Result<Self, CoreError> {
        let env_path = std::env::var_os(CONFIG_PATH_ENV);
        let mut config = match path.or(env_path.as_deref().map(Path::new)) {
            Some(path) => {
                tracing::info!("Loading configuration from {}", path.display());
                Self::from_file(path)?
            }
            None => {
                tracing::info!("No configuration file given, using defaults");
                Self::default()
            }
        };

        if let Ok(url) = std::env::var(DATABASE_URL_ENV) {
            config.database_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.sources.is_empty() {
            return Err(ConfigError::MissingField {
                field: "sources".to_string(),
            }
            .into());
        }
        if let Some(blank) = self.sources.iter().find(|s| s.trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                field: "sources".to_string(),
                value: format!("{blank:?}"),
            }
            .into());
        }
        if self.keywords.is_empty() {
            return Err(ConfigError::MissingField {
                field: "keywords".to_string(),
            }
            .into());
        }
        // An empty keyword would match every text.
        if self.keywords.iter().any(|k| k.trim().is_empty()) {
            return Err(ConfigError::ValidationFailed {
                reason: "keywords must not be blank".to_string(),
            }
            .into());
        }
        if self.requests_per_minute == 0 {
            return Err(ConfigError::InvalidValue {
                field: "requests_per_minute".to_string(),
                value: "0".to_string(),
            }
            .into());
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "poll_interval_secs".to_string(),
                value: "0".to_string(),
            }
            .into());
        }
        if self.page_limit == 0 || self.page_limit > MAX_PAGE_LIMIT {
            return Err(ConfigError::InvalidValue {
                field: "page_limit".to_string(),
                value: self.page_limit.to_string(),
            }
            .into());
        }
        if self.request_timeout_secs == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_secs".to_string(),
                value: "0".to_string(),
            }
            .into());
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.requests_per_minute, 80);
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.page_limit, 100);
        assert!(config.request_timeout().is_none());
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            sources = ["rust"]
            keywords = ["tokio", "async"]
            poll_interval_secs = 60
            "#,
        )
        .unwrap();

        assert_eq!(config.sources, vec!["rust"]);
        assert_eq!(config.keywords, vec!["tokio", "async"]);
        assert_eq!(config.poll_interval_secs, 60);
        assert_eq!(config.requests_per_minute, 80);
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = AppConfig::from_toml_str("sources = [").unwrap_err();
        assert!(matches!(err, CoreError::Config(ConfigError::Parse(_))));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = AppConfig::from_file(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Config(ConfigError::FileNotFound { .. })
        ));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.keywords = vec!["ok".to_string(), "  ".to_string()];
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.sources.clear();
        assert!(matches!(
            config.validate(),
            Err(CoreError::Config(ConfigError::MissingField { .. }))
        ));

        let mut config = AppConfig::default();
        config.requests_per_minute = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.page_limit = 101;
        assert!(config.validate().is_err());
    }
}
