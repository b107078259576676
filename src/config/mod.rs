use anyhow::{Context, Result};
use serde::Deserialize;

// Re-export component config types
pub use crate::broker::{BrokerConfig, NatsConfig};
pub use crate::datastore::DataStoreConfig;

/// Complete service configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EsrConfig {
    #[serde(default)]
    pub datastore: DataStoreConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8080
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

impl EsrConfig {
    /// Loads `ESR_CONFIG` if set (defaults otherwise), then applies env overrides.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("ESR_CONFIG") {
            Ok(path) => load_config(&path)?,
            Err(_) => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overrides fields from environment variables read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("ESR_DATASTORE_TYPE") {
            self.datastore.datastore_type = v;
        }
        if let Some(v) = lookup("ESR_DATABASE_NAME") {
            self.datastore.name = v;
        }
        if let Some(v) = lookup("ESR_BROKER_TYPE") {
            self.broker.broker_type = v;
        }
        if let Some(v) = lookup("ESR_BROKER_URL") {
            self.broker.nats.url = v;
        }
        if let Some(v) = lookup("ESR_BROKER_SUBJECT_PREFIX") {
            self.broker.nats.subject_prefix = v;
        }
        if let Some(v) = lookup("ESR_HTTP_PORT") {
            self.http.port = v
                .parse()
                .with_context(|| format!("ESR_HTTP_PORT must be a valid port number, got '{}'", v))?;
        }
        Ok(())
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<EsrConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let config: EsrConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = EsrConfig::default();
        assert_eq!(config.datastore.datastore_type, "sqlite");
        assert_eq!(config.datastore.name, "esrdb");
        assert_eq!(config.broker.broker_type, "nats");
        assert_eq!(config.broker.nats.subject_prefix, "esr");
        assert_eq!(config.http.port, 8080);
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [datastore]
            datastore_type = "sqlite"
            name = "/var/lib/esr/esr"

            [broker]
            broker_type = "memory"

            [broker.nats]
            url = "nats://example.com:4222"
            subject_prefix = "plant"

            [http]
            port = 9000
        "#;

        let config: EsrConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.datastore.path(), "/var/lib/esr/esr.db");
        assert_eq!(config.broker.broker_type, "memory");
        assert_eq!(config.broker.nats.url, "nats://example.com:4222");
        assert_eq!(config.broker.nats.subject_prefix, "plant");
        assert_eq!(config.http.port, 9000);
    }

    #[test]
    fn test_partial_config() {
        // Missing sections use defaults
        let toml = r#"
            [http]
            port = 3000
        "#;

        let config: EsrConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.http.port, 3000);
        assert_eq!(config.datastore.name, "esrdb");
        assert_eq!(config.broker.nats.stream_name, "ESR_COMMANDS");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("ESR_DATASTORE_TYPE", "sqlite"),
            ("ESR_DATABASE_NAME", ":memory:"),
            ("ESR_BROKER_TYPE", "memory"),
            ("ESR_BROKER_URL", "nats://broker:4222"),
            ("ESR_HTTP_PORT", "8181"),
        ]);

        let mut config = EsrConfig::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert!(config.datastore.is_in_memory());
        assert_eq!(config.broker.broker_type, "memory");
        assert_eq!(config.broker.nats.url, "nats://broker:4222");
        assert_eq!(config.http.port, 8181);
        assert_eq!(config.broker.nats.subject_prefix, "esr");
    }

    #[test]
    fn test_invalid_port_env() {
        let mut config = EsrConfig::default();
        let result = config.apply_env(|key| {
            (key == "ESR_HTTP_PORT").then(|| "not-a-port".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("esr.toml");
        std::fs::write(&path, "[datastore]\nname = \"custom\"\n").unwrap();

        let config = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config.datastore.path(), "custom.db");
    }
}
