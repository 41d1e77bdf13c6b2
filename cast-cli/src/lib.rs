//! Castsync CLI Library
//!
//! Shared functionality for castsync command-line tools.

pub mod config;
pub mod player;

pub use config::{Config, ConfigError, MasterConfig, NodeConfig, SlaveConfig};
pub use player::LogPlayer;
