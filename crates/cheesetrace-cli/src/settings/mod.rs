mod atomic;
mod config;

pub use atomic::write_json_atomic;
pub use config::{DEFAULT_CONFIG_PATH, Settings, load_settings, save_settings};

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("toml decode error: {0}")]
    TomlDecode(#[from] toml::de::Error),
    #[error("toml encode error: {0}")]
    TomlEncode(#[from] toml::ser::Error),
    #[error("config file not found: {0}")]
    NotFound(std::path::PathBuf),
    #[error("invalid settings: {0}")]
    Invalid(String),
}

pub type SettingsResult<T> = Result<T, SettingsError>;
