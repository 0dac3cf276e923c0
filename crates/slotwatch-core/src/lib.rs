//! Shared domain types and configuration for the slot monitor.

pub mod app_config;
pub mod config;
pub mod slot;
pub mod state;

use thiserror::Error;

pub use app_config::{AppConfig, FetchMode};
pub use config::{load_app_config, load_app_config_from_env};
pub use slot::SlotRecord;
pub use state::{MonitorState, StateMap};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
