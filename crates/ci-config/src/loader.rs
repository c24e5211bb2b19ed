//! Configuration loader with file and environment variable support

use crate::{AppConfig, ConfigError};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::info;

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &[
    "config.toml",
    "concept-ingester.toml",
    "./config/config.toml",
    "/etc/concept-ingester/config.toml",
];

/// Configuration loader
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Create a loader with a specific config file path
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Load configuration from file (if found) with environment variable overrides
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = AppConfig::default();

        if let Some(path) = self.find_config_file() {
            info!(?path, "Loading configuration from file");
            config = AppConfig::from_file(&path)?;
        }

        apply_overrides(&mut config, |key| env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
        }

        if let Ok(path) = env::var("CONCEPT_INGESTER_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_var<T: FromStr>(key: &str, val: &str) -> Result<T, ConfigError> {
    val.trim()
        .parse()
        .map_err(|_| ConfigError::EnvError(format!("{} has invalid value '{}'", key, val)))
}

/// Apply overrides from a variable lookup (the process environment in production)
pub(crate) fn apply_overrides<F>(config: &mut AppConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    // HTTP
    if let Some(val) = lookup("CONCEPT_INGESTER_PORT") {
        config.http.port = parse_var("CONCEPT_INGESTER_PORT", &val)?;
    }

    // Writers
    if let Some(val) = lookup("CONCEPT_INGESTER_SERVICES") {
        config.writers.services = val;
    }
    if let Some(val) = lookup("CONCEPT_INGESTER_VULCAN_ADDR") {
        config.writers.base_address = val;
    }
    if let Some(val) = lookup("CONCEPT_INGESTER_ELASTICSEARCH_WRITER_ADDRESS") {
        config.writers.elasticsearch_address = val;
    }
    if let Some(val) = lookup("CONCEPT_INGESTER_ELASTICSEARCH_CONCEPTS") {
        config.writers.elasticsearch_concepts = val
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }

    // Consumer
    if let Some(val) = lookup("CONCEPT_INGESTER_CONSUMER_PROXY_ADDR") {
        config.consumer.proxy_addresses = val;
    }
    if let Some(val) = lookup("CONCEPT_INGESTER_CONSUMER_GROUP_ID") {
        config.consumer.group_id = val;
    }
    if let Some(val) = lookup("CONCEPT_INGESTER_CONSUMER_QUEUE_ID") {
        config.consumer.queue = val;
    }
    if let Some(val) = lookup("CONCEPT_INGESTER_TOPIC") {
        config.consumer.topic = val;
    }
    if let Some(val) = lookup("CONCEPT_INGESTER_CONSUMER_OFFSET") {
        config.consumer.offset = val;
    }
    if let Some(val) = lookup("CONCEPT_INGESTER_CONSUMER_AUTOCOMMIT_ENABLE") {
        config.consumer.autocommit_enable =
            parse_var("CONCEPT_INGESTER_CONSUMER_AUTOCOMMIT_ENABLE", &val)?;
    }
    if let Some(val) = lookup("CONCEPT_INGESTER_CONSUMER_STREAM_COUNT") {
        config.consumer.stream_count = parse_var("CONCEPT_INGESTER_CONSUMER_STREAM_COUNT", &val)?;
    }

    // Throttle
    if let Some(val) = lookup("CONCEPT_INGESTER_THROTTLE") {
        config.throttle.messages_per_second = parse_var("CONCEPT_INGESTER_THROTTLE", &val)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_overrides_applied() {
        let mut config = AppConfig::default();
        let lookup = lookup_from(&[
            ("CONCEPT_INGESTER_SERVICES", "people-rw:8081,organisations-rw:8082"),
            ("CONCEPT_INGESTER_ELASTICSEARCH_CONCEPTS", "organisations, people"),
            ("CONCEPT_INGESTER_CONSUMER_STREAM_COUNT", "4"),
            ("CONCEPT_INGESTER_CONSUMER_AUTOCOMMIT_ENABLE", "false"),
            ("CONCEPT_INGESTER_THROTTLE", "50"),
        ]);

        apply_overrides(&mut config, lookup).unwrap();

        assert_eq!(config.writers.services, "people-rw:8081,organisations-rw:8082");
        assert_eq!(config.writers.elasticsearch_concepts, vec!["organisations", "people"]);
        assert_eq!(config.consumer.stream_count, 4);
        assert!(!config.consumer.autocommit_enable);
        assert_eq!(config.throttle.messages_per_second, 50);
    }

    #[test]
    fn test_invalid_numeric_override_is_an_error() {
        let mut config = AppConfig::default();
        let lookup = lookup_from(&[("CONCEPT_INGESTER_PORT", "eighty")]);

        let result = apply_overrides(&mut config, lookup);

        assert!(matches!(result, Err(ConfigError::EnvError(_))));
    }

    #[test]
    fn test_load_with_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ingester.toml");
        std::fs::write(&path, "[consumer]\ntopic = \"NativeConcept\"\n").unwrap();

        let config = ConfigLoader::with_path(&path).load().unwrap();

        assert_eq!(config.consumer.topic, "NativeConcept");
    }
}
