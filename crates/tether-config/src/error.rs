use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Settings file not found: {0}")]
    SettingsFileNotFound(String),

    #[error("Invalid settings file {path}: {source}")]
    InvalidSettingsFile {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
