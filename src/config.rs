use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::disclaimer::Disclaimers;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PingStatConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub disclaimer: Disclaimers,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    File,
    Postgres,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_dir: String,
    pub database_url: Option<String>,
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            data_dir: "./pingstat-data".to_string(),
            database_url: None,
            max_connections: 10,
        }
    }
}

impl PingStatConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PingStatConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from an optional file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Ok(host) = std::env::var("PINGSTAT_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("PINGSTAT_PORT") {
            config.server.port = port.parse()?;
        }
        if let Ok(data_dir) = std::env::var("PINGSTAT_DATA_DIR") {
            config.storage.data_dir = data_dir;
        }
        if let Ok(database_url) = std::env::var("DATABASE_URL") {
            config.storage.database_url = Some(database_url);
            config.storage.backend = StorageBackend::Postgres;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disclaimer::DisclaimerLookup;

    #[test]
    fn test_defaults() {
        let config = PingStatConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.backend, StorageBackend::File);
        assert_eq!(config.storage.data_dir, "./pingstat-data");
    }

    #[test]
    fn test_parse_full_file() -> anyhow::Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("pingstat.toml");
        std::fs::write(
            &path,
            r#"
[server]
host = "127.0.0.1"
port = 29316

[storage]
backend = "memory"

[disclaimer]
default = "Numbers are approximate."

[disclaimer.rooms]
"!ping:example.org" = "Only federated servers answer here."
"#,
        )?;

        let config = PingStatConfig::from_file(&path)?;
        assert_eq!(config.server.port, 29316);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.storage.max_connections, 10);
        assert_eq!(
            config.disclaimer.disclaimer_for("!ping:example.org"),
            "Only federated servers answer here."
        );
        assert_eq!(
            config.disclaimer.disclaimer_for("!elsewhere:example.org"),
            "Numbers are approximate."
        );
        Ok(())
    }
}
