//! Concept Ingester Configuration
//!
//! TOML-based configuration with environment variable overrides. Everything is
//! resolved once at startup into the immutable structures the router consumes.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Environment variable error: {0}")]
    EnvError(String),
}

/// Root application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub writers: WritersConfig,
    pub consumer: ConsumerConfig,
    pub throttle: ThrottleConfig,
    pub client: ClientConfig,
}

/// HTTP server configuration (health, gtg, metrics)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
    pub host: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
        }
    }
}

/// Writer addressing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WritersConfig {
    /// Comma separated writer services (`name`, `name:port` or `http://host:port`)
    pub services: String,
    /// Base address for cluster-routed writers, e.g. `http://localhost:8080`
    pub base_address: String,
    /// Elasticsearch writer address; empty disables secondary indexing
    pub elasticsearch_address: String,
    /// Concept types duplicated to the elasticsearch writer
    pub elasticsearch_concepts: Vec<String>,
}

impl Default for WritersConfig {
    fn default() -> Self {
        Self {
            services: String::new(),
            base_address: "http://localhost:8080".to_string(),
            elasticsearch_address: String::new(),
            elasticsearch_concepts: vec!["organisations".to_string()],
        }
    }
}

/// Kafka REST proxy consumer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Comma separated kafka proxy addresses
    pub proxy_addresses: String,
    pub group_id: String,
    /// Value of the Host header sent to the proxy
    pub queue: String,
    pub topic: String,
    /// Offset reset policy: smallest or largest
    pub offset: String,
    pub autocommit_enable: bool,
    pub stream_count: usize,
    pub poll_interval_ms: u64,
    pub backoff_ms: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            proxy_addresses: "http://localhost:8080".to_string(),
            group_id: "idiConcept".to_string(),
            queue: "kafka".to_string(),
            topic: "Concept".to_string(),
            offset: "smallest".to_string(),
            autocommit_enable: true,
            stream_count: 10,
            poll_interval_ms: 1000,
            backoff_ms: 8000,
        }
    }
}

impl ConsumerConfig {
    pub fn proxy_address_list(&self) -> Vec<String> {
        self.proxy_addresses
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// Outbound rate limiting; 0 disables the throttle
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    pub messages_per_second: u32,
}

/// Shared writer HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub keep_alive_ms: u64,
    pub max_idle_per_host: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 30_000,
            request_timeout_ms: 60_000,
            keep_alive_ms: 30_000,
            max_idle_per_host: 100,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with environment variable override
    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load()
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.consumer.stream_count == 0 {
            return Err(ConfigError::ValidationError(
                "consumer.stream_count must be at least 1".to_string(),
            ));
        }
        if self.consumer.topic.trim().is_empty() {
            return Err(ConfigError::ValidationError("consumer.topic is required".to_string()));
        }
        if self.consumer.group_id.trim().is_empty() {
            return Err(ConfigError::ValidationError("consumer.group_id is required".to_string()));
        }
        if self.consumer.proxy_address_list().is_empty() {
            return Err(ConfigError::ValidationError(
                "consumer.proxy_addresses must name at least one proxy".to_string(),
            ));
        }
        if self.client.max_idle_per_host == 0 {
            return Err(ConfigError::ValidationError(
                "client.max_idle_per_host must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Generate an example TOML configuration
    pub fn example_toml() -> String {
        r#"# Concept Ingester Configuration
# Environment variables (CONCEPT_INGESTER_*) override these settings

[http]
port = 8080
host = "0.0.0.0"

[writers]
services = "people-rw-neo4j-blue,organisations-rw-neo4j-blue"
base_address = "http://localhost:8080"
elasticsearch_address = ""
elasticsearch_concepts = ["organisations"]

[consumer]
proxy_addresses = "http://localhost:8080"
group_id = "idiConcept"
queue = "kafka"
topic = "Concept"
offset = "smallest"
autocommit_enable = true
stream_count = 10
poll_interval_ms = 1000
backoff_ms = 8000

[throttle]
messages_per_second = 0

[client]
connect_timeout_ms = 30000
request_timeout_ms = 60000
keep_alive_ms = 30000
max_idle_per_host = 100
"#
        .to_string()
    }
}
