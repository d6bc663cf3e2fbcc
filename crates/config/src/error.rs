use thiserror::Error;

/// Everything that can go wrong while assembling a [`crate::Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io { path: String, #[source] source: std::io::Error },

    #[error("failed to parse config file {path}: {source}")]
    Parse { path: String, #[source] source: toml::de::Error },

    #[error("required environment variable {name} is not set")]
    MissingEnv { name: String },

    #[error("environment variable {name}={value:?} is invalid: {reason}")]
    InvalidEnv { name: String, value: String, reason: String },
}
