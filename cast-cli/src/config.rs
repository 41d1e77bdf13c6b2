//! Configuration file support for castsync CLI tools

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;

/// One receiver to register with a master
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaveConfig {
    /// Name/label used in logs and error reasons
    pub name: String,
    /// Node server address
    pub address: SocketAddr,
}

/// Receiver node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Listen address for the node RPC server
    pub listen: SocketAddr,
    /// Stream buffer capacity in bytes
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Refill block size in bytes
    #[serde(default = "default_block_size")]
    pub block_size: usize,
}

fn default_capacity() -> usize {
    20 * 1024 * 1024
}

fn default_block_size() -> usize {
    200 * 1024
}

/// Master configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterConfig {
    /// Input source (file path)
    pub input: String,
    /// Receivers to synchronize
    pub slaves: Vec<SlaveConfig>,
    /// Size of each forwarded chunk in bytes
    #[serde(default = "default_block_size")]
    pub chunk_size: usize,
    /// Bytes to stream before scheduling the synchronized start
    #[serde(default = "default_prebuffer")]
    pub prebuffer: usize,
}

fn default_prebuffer() -> usize {
    1024 * 1024
}

/// Combined configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Node configuration
    pub node: Option<NodeConfig>,
    /// Master configuration
    pub master: Option<MasterConfig>,
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Create example node configuration
    pub fn example_node() -> Self {
        Config {
            node: Some(NodeConfig {
                listen: "0.0.0.0:4004".parse().unwrap(),
                capacity: default_capacity(),
                block_size: default_block_size(),
            }),
            master: None,
        }
    }

    /// Create example master configuration
    pub fn example_master() -> Self {
        Config {
            node: None,
            master: Some(MasterConfig {
                input: "track.mp3".to_string(),
                slaves: vec![
                    SlaveConfig {
                        name: "kitchen".to_string(),
                        address: "192.168.1.10:4004".parse().unwrap(),
                    },
                    SlaveConfig {
                        name: "living-room".to_string(),
                        address: "192.168.1.11:4004".parse().unwrap(),
                    },
                ],
                chunk_size: default_block_size(),
                prebuffer: default_prebuffer(),
            }),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_configs() {
        let node_config = Config::example_node();
        assert!(node_config.node.is_some());

        let master_config = Config::example_master();
        assert!(master_config.master.is_some());
    }

    #[test]
    fn test_serialize_deserialize() {
        let config = Config::example_master();
        let toml = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();

        let master = parsed.master.unwrap();
        assert_eq!(master.slaves.len(), 2);
        assert_eq!(master.chunk_size, 200 * 1024);
    }

    #[test]
    fn test_defaults_fill_omitted_fields() {
        let parsed: Config = toml::from_str(
            r#"
            [node]
            listen = "0.0.0.0:4004"
            "#,
        )
        .unwrap();

        let node = parsed.node.unwrap();
        assert_eq!(node.capacity, 20 * 1024 * 1024);
        assert_eq!(node.block_size, 200 * 1024);
    }
}
