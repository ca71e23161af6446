use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ScyllaDbConfig {
    pub hosts: Vec<String>,
    pub keyspace: String,
    pub connection_timeout_ms: u64,
    pub replication_factor: u32,
    /// Run CREATE KEYSPACE / TABLE IF NOT EXISTS on connect
    pub create_schema: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Sled,
    Scylla,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub sled_path: String,
    pub scylla: ScyllaDbConfig,
}

/// Where committed posting events go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSinkKind {
    /// Logged inline by the posting task
    Log,
    /// Queued on a bounded channel and logged by a background task
    Channel,
}

/// Naming conventions used to find the securities of a split, in search order
#[derive(Debug, Clone, Deserialize)]
pub struct SplitNamingConfig {
    pub base_names: Vec<String>,
    pub class_a_names: Vec<String>,
    pub right_names: Vec<String>,
    pub warrant_names: Vec<String>,
}

impl Default for SplitNamingConfig {
    fn default() -> Self {
        Self {
            base_names: vec!["Units".to_string()],
            class_a_names: vec![
                "Class A Ordinary".to_string(),
                "Class A Common".to_string(),
                "Class A".to_string(),
            ],
            right_names: vec!["Right".to_string()],
            warrant_names: vec!["Warrant".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub log_level: String,
    pub log_to_file: bool,
    pub log_file: String,
    pub storage: StorageConfig,
    /// JSON registry of securities, shareholders and split rates
    pub registry_path: String,
    #[serde(default)]
    pub split_naming: SplitNamingConfig,
    pub event_sink: EventSinkKind,
    /// Only read by the channel sink
    pub event_channel_capacity: usize,
}

pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from("config/captable")
}

/// Defaults, then `<file>.{yaml,toml,json}` if present, then `CAPTABLE__*` env vars
pub fn load_config_from(file: &str) -> Result<AppConfig, ConfigError> {
    let naming = SplitNamingConfig::default();
    let s = Config::builder()
        // Set defaults
        .set_default("log_level", "info")?
        .set_default("log_to_file", false)?
        .set_default("log_file", "log/captable.log")?
        .set_default("storage.backend", "sled")?
        .set_default("storage.sled_path", "data/captable")?
        .set_default("storage.scylla.hosts", vec!["127.0.0.1:9042"])?
        .set_default("storage.scylla.keyspace", "captable")?
        .set_default("storage.scylla.connection_timeout_ms", 5000)?
        .set_default("storage.scylla.replication_factor", 1)?
        .set_default("storage.scylla.create_schema", true)?
        .set_default("registry_path", "config/registry.json")?
        .set_default("split_naming.base_names", naming.base_names)?
        .set_default("split_naming.class_a_names", naming.class_a_names)?
        .set_default("split_naming.right_names", naming.right_names)?
        .set_default("split_naming.warrant_names", naming.warrant_names)?
        .set_default("event_sink", "log")?
        .set_default("event_channel_capacity", 1024)?
        // Add configuration from a file
        .add_source(File::with_name(file).required(false))
        // Add configuration from environment variables
        .add_source(
            Environment::with_prefix("CAPTABLE")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("storage.scylla.hosts")
                .try_parsing(true),
        )
        .build()?;

    s.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let config = load_config_from("config/does-not-exist").unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.storage.backend, StorageBackend::Sled);
        assert_eq!(config.storage.scylla.hosts, vec!["127.0.0.1:9042".to_string()]);
        assert_eq!(config.split_naming.base_names, vec!["Units".to_string()]);
        assert_eq!(config.split_naming.class_a_names.len(), 3);
        assert_eq!(config.event_sink, EventSinkKind::Log);
        assert_eq!(config.event_channel_capacity, 1024);
    }
}
