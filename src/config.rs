//! Engine configuration.
//!
//! Every field has a default, so an empty JSON object (or no file at all) is a
//! complete configuration. Environment overrides are applied on top of a
//! loaded file.

use crate::dom;
use crate::engine::chain::{BuildOptions, DEFAULT_MAX_DEPTH};
use crate::engine::payload::DEFAULT_PAYLOAD_ID;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Primary content container selector.
pub const DEFAULT_CONTAINER_SELECTOR: &str = ".entry-content";

/// Generic containers tried, in order, when the primary selector misses.
pub const DEFAULT_FALLBACK_SELECTORS: &[&str] =
    &[".entry-content", ".post-content", ".article-content", "article .content", "article", "main"];

pub const DEFAULT_START_DELAY_MS: u64 = 100;
pub const DEFAULT_WRAPPER_CLASS: &str = "cta-auto-insert";

pub const ENV_MAX_DEPTH: &str = "CTAFLOW_MAX_DEPTH";
pub const ENV_CONTAINER_SELECTOR: &str = "CTAFLOW_CONTAINER_SELECTOR";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Upper bound on fallback chain length.
    pub max_depth: usize,
    pub container_selector: String,
    pub fallback_selectors: Vec<String>,
    /// Delay before a deferred orchestrator run, in milliseconds.
    pub start_delay_ms: u64,
    pub wrapper_class: String,
    pub payload_id: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            container_selector: DEFAULT_CONTAINER_SELECTOR.to_string(),
            fallback_selectors: DEFAULT_FALLBACK_SELECTORS.iter().map(|s| s.to_string()).collect(),
            start_delay_ms: DEFAULT_START_DELAY_MS,
            wrapper_class: DEFAULT_WRAPPER_CLASS.to_string(),
            payload_id: DEFAULT_PAYLOAD_ID.to_string(),
        }
    }
}

impl EngineConfig {
    /// Load and validate a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse and validate a JSON config.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `CTAFLOW_*` environment overrides.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(raw) = var(ENV_MAX_DEPTH) {
            self.max_depth = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::Validation(format!("{ENV_MAX_DEPTH} must be a non-negative integer, got `{raw}`")))?;
        }
        if let Some(selector) = var(ENV_CONTAINER_SELECTOR) {
            self.container_selector = selector;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.container_selector.trim().is_empty() {
            return Err(ConfigError::Validation("container_selector must not be empty".to_string()));
        }
        for selector in std::iter::once(&self.container_selector).chain(&self.fallback_selectors) {
            dom::parse_selector(selector).map_err(|err| ConfigError::Validation(err.to_string()))?;
        }
        if self.payload_id.trim().is_empty() {
            return Err(ConfigError::Validation("payload_id must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }

    pub fn build_options(&self) -> BuildOptions {
        BuildOptions { max_depth: self.max_depth, container_selector: self.container_selector.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.max_depth, 10);
        assert_eq!(config.container_selector, ".entry-content");
        assert_eq!(config.fallback_selectors.last().map(String::as_str), Some("main"));
        assert_eq!(config.start_delay(), Duration::from_millis(100));
        assert_eq!(config.payload_id, "ctaflow-chain");
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r##"{{"max_depth": 3, "container_selector": "#content", "start_delay_ms": 0}}"##).unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_depth, 3);
        assert_eq!(config.container_selector, "#content");
        assert_eq!(config.build_options().max_depth, 3);
        assert_eq!(config.start_delay(), Duration::ZERO);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(EngineConfig::from_json(r#"{"container_selector": " "}"#), Err(ConfigError::Validation(_))));
        assert!(matches!(EngineConfig::from_json(r#"{"container_selector": "div >"}"#), Err(ConfigError::Validation(_))));
        assert!(EngineConfig::from_json(r#"{"container_selector": "article > .body"}"#).is_ok());
        assert!(matches!(EngineConfig::from_json(r#"{"fallback_selectors": ["main", "[x"]}"#), Err(ConfigError::Validation(_))));
        assert!(matches!(EngineConfig::from_json(r#"{"max_depth": "ten"}"#), Err(ConfigError::Parse(_))));
        assert!(matches!(EngineConfig::from_json(r#"{"unknown": 1}"#), Err(ConfigError::Parse(_))));
        assert!(matches!(
            EngineConfig::from_file(Path::new("/definitely/not/here.json")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn overrides() {
        let vars: HashMap<&str, &str> = [(ENV_MAX_DEPTH, " 4 "), (ENV_CONTAINER_SELECTOR, "main .body")].into();
        let config = EngineConfig::default().with_overrides(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.max_depth, 4);
        assert_eq!(config.container_selector, "main .body");

        let bad = EngineConfig::default().with_overrides(|k| (k == ENV_MAX_DEPTH).then(|| "-1".to_string()));
        assert!(matches!(bad, Err(ConfigError::Validation(_))));

        let untouched = EngineConfig::default().with_overrides(|_| None).unwrap();
        assert_eq!(untouched, EngineConfig::default());
    }
}
